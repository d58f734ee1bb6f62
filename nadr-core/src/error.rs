//! Error types for nadr-core
//!
//! Only conditions that end an operation are errors. Underrun, overflow and
//! backpressure are ordinary return values of the hot-path APIs.

use std::time::Duration;
use thiserror::Error;

/// Main error type for nadr-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] nadr_common::Error),

    /// Format the engine cannot carry
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Decoder returned no data for too many cycles while the source was not
    /// exhausted
    #[error("Decoder stalled: no progress for {cycles} cycles below target")]
    DecodeStalled { cycles: u32 },

    /// A zero-copy handle or in-flight access outlived the rendezvous bound.
    /// Buffers are left untouched.
    #[error("Reconfiguration timed out after {0:?} (consumer still holds ring memory)")]
    ReconfigureTimeout(Duration),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transport thread errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using nadr-core Error
pub type Result<T> = std::result::Result<T, Error>;
