//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame carries a wire version this build does not speak
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Unknown message type
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Header type tag disagrees with the decoded message body
    #[error("Type tag mismatch: header {header:#04x}, body {body:#04x}")]
    TypeTagMismatch { header: u8, body: u8 },

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
