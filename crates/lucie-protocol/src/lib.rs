//! lucie-protocol: Wire protocol for the Lucie binary RPC transport
//!
//! This crate defines the binary protocol used for communication between
//! the orchestration bridge and the AI-processing service over TCP.

pub mod codec;
pub mod error;
pub mod message;
pub mod request;

pub use codec::{Frame, FrameCodec, HEADER_SIZE, MAX_PAYLOAD_SIZE, WIRE_VERSION};
pub use error::ProtocolError;
pub use message::{ErrorCode, Message, MessageType, ServiceSpec};
pub use request::RequestId;
