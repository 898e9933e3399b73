//! # Document Rendering
//!
//! This module turns the ordered, JSON-described receipt carried by a job
//! message into an ordered list of device operations.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────┐     ┌──────────────┐     ┌───────────┐     ┌──────────┐
//! │ JSON job │ ──► │ Element list │ ──► │ Renderer  │ ──► │ Vec<Op>  │
//! │ payload  │     │ (schema)     │     │ (+ state) │     │ (ops)    │
//! └──────────┘     └──────────────┘     └───────────┘     └──────────┘
//! ```
//!
//! - [`schema`]: serde types for the wire shapes of job messages
//! - [`format`]: persistent per-document text formatting state
//! - [`ops`]: the operation list executed by a printer session
//! - [`renderer`]: the element interpreter

pub mod format;
pub mod ops;
pub mod renderer;
pub mod schema;

pub use format::{FormatDelta, FormatState};
pub use ops::{LineKind, Op, QrPayload, QrSpec};
pub use renderer::DocumentRenderer;
pub use schema::{Element, JobMessage};
