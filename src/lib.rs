//! # Recibo - MQTT Thermal Receipt Printer Bridge
//!
//! Recibo bridges an MQTT job channel to an ESC/POS thermal receipt
//! printer. It receives structured print-job messages, translates them
//! into exact device byte sequences, and keeps both the broker connection
//! and the printer alive with heartbeats and bounded automatic recovery.
//!
//! ## Data Flow
//!
//! ```text
//! job message ──► ConnectionManager ──► DocumentRenderer ──► PrinterSession ──► device
//!                        │                                        │
//!                        └──◄── heartbeat / status / error / recovery records
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | ESC/POS command builders |
//! | [`bitmap`] | 1-bit raster packing and device conversion |
//! | [`qr`] | QR size tables, bitmap and native rendering |
//! | [`document`] | Job schema, format state, renderer |
//! | [`printer`] | Printer session and device backends |
//! | [`mqtt`] | Connection manager, heartbeat, records |
//! | [`recovery`] | Supervisory reconnect loop |
//! | [`template`] | `{{variable}}` substitution |
//! | [`config`] | CLI/env configuration |
//! | [`error`] | Error types |
//!
//! ## Delivery Semantics
//!
//! Jobs are fire-and-forget: there is no persistent queue, no automatic
//! retry of a failed document, and no exactly-once guarantee. A document
//! either fully prints or is abandoned with a `failed` status record.

pub mod bitmap;
pub mod config;
pub mod document;
pub mod error;
pub mod mqtt;
pub mod printer;
pub mod protocol;
pub mod qr;
pub mod recovery;
pub mod template;

// Re-exports for convenience
pub use config::Config;
pub use error::ReciboError;
pub use mqtt::ConnectionManager;
pub use printer::PrinterSession;
