//! # Error Types
//!
//! This module defines error types used throughout the recibo bridge.
//!
//! The taxonomy follows the two independently-failing resources the bridge
//! manages: the MQTT transport and the printer device. A `Transport` error
//! surfaces to the connection manager (state becomes disconnected, recovery
//! is driven externally); a `Device` error aborts the current document only;
//! a `Protocol` error skips a single element; a `Payload` error drops the
//! whole message.

use thiserror::Error;

/// Main error type for recibo operations
#[derive(Debug, Error)]
pub enum ReciboError {
    /// Transport-level errors (MQTT connect, publish, subscribe)
    #[error("transport error: {0}")]
    Transport(String),

    /// Printer device errors (open, write, unsupported capability)
    #[error("device error: {0}")]
    Device(String),

    /// Protocol-level errors (bitmap dimension/length mismatch, bad directive)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed inbound job payload
    #[error("payload error: {0}")]
    Payload(String),

    /// Invalid configuration value
    #[error("config error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ReciboError>;
