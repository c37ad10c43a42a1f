//! Error types for funsync
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for funsync
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Funscript loading or indexing errors
    #[error("Script error: {0}")]
    Script(String),

    /// Player process or IPC errors
    #[error("Player error: {0}")]
    Player(String),

    /// Device server connection or command errors
    #[error("Device error: {0}")]
    Device(String),

    /// Malformed or unexpected protocol traffic
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type using funsync Error
pub type Result<T> = std::result::Result<T, Error>;
