//! Message types for the Lucie RPC protocol
//!
//! This module defines the high-level protocol messages exchanged between
//! the bridge and the AI service. Messages are serialized into frames using
//! the codec defined in `codec.rs`.
//!
//! # Message Flow
//!
//! Typical sequences:
//!
//! 1. Discovery: bridge sends `ListServices`, service responds with
//!    `ServiceList`
//! 2. Health: bridge sends `Ping` periodically, service responds with `Pong`
//! 3. Unary call: bridge sends `Call`, service responds with a single
//!    `CallResult` (or `Error`)
//! 4. Streaming call: bridge sends `Call`, service responds with a sequence
//!    of `CallChunk` frames, the final one carrying `last: true`
//!
//! Call payloads and results cross the wire as JSON text. The protocol
//! layer treats them as opaque strings; decoding is the transport's job.

use serde::{Deserialize, Serialize};

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Invoke a method on a named service
    Call = 0x01,
    /// Result of a unary call
    CallResult = 0x02,
    /// One fragment of a streaming call
    CallChunk = 0x03,
    /// Request the current service advertisement
    ListServices = 0x04,
    /// Service advertisement
    ServiceList = 0x05,
    /// Liveness ping
    Ping = 0x06,
    /// Liveness acknowledgment
    Pong = 0x07,
    /// Error response
    Error = 0xFF,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Call),
            0x02 => Some(Self::CallResult),
            0x03 => Some(Self::CallChunk),
            0x04 => Some(Self::ListServices),
            0x05 => Some(Self::ServiceList),
            0x06 => Some(Self::Ping),
            0x07 => Some(Self::Pong),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// Error codes for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unknown error
    Unknown = 0,
    /// The named service is not advertised
    ServiceNotFound = 1,
    /// The service exists but the method does not
    MethodNotFound = 2,
    /// The call payload could not be interpreted
    InvalidPayload = 3,
    /// The remote operation itself failed
    InvocationFailed = 4,
}

/// One service as advertised on the wire.
///
/// `metadata` is JSON text; the transport decodes it into structured data
/// when building the registry view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name, unique within an advertisement
    pub name: String,
    /// Availability status reported by the service (e.g. "available")
    pub status: String,
    /// Names of the callable methods
    pub methods: Vec<String>,
    /// Free-form metadata as JSON text
    pub metadata: String,
}

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Invoke `service.method` with a JSON-encoded payload
    Call {
        /// Target service name
        service: String,
        /// Method name on the service
        method: String,
        /// Call arguments as JSON text
        payload: String,
    },

    /// Result of a unary call
    CallResult {
        /// Result as JSON text
        payload: String,
    },

    /// One fragment of a streaming call
    CallChunk {
        /// Fragment as JSON text
        payload: String,
        /// Whether this is the final fragment
        last: bool,
    },

    /// Request the current service advertisement
    ListServices,

    /// Service advertisement
    ServiceList {
        /// All services the remote currently exposes
        services: Vec<ServiceSpec>,
    },

    /// Liveness ping
    Ping {
        /// Timestamp for latency measurement
        timestamp: u64,
    },

    /// Liveness acknowledgment
    Pong {
        /// Echo of the original timestamp
        timestamp: u64,
    },

    /// Error response
    Error {
        /// Error code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Call { .. } => MessageType::Call,
            Message::CallResult { .. } => MessageType::CallResult,
            Message::CallChunk { .. } => MessageType::CallChunk,
            Message::ListServices => MessageType::ListServices,
            Message::ServiceList { .. } => MessageType::ServiceList,
            Message::Ping { .. } => MessageType::Ping,
            Message::Pong { .. } => MessageType::Pong,
            Message::Error { .. } => MessageType::Error,
        }
    }
}
