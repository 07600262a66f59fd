//! lucie-core: Core abstractions and configuration for the Lucie bridge
//!
//! This crate provides shared types, traits, and configuration structures
//! used by the bridge engine and its transports.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::BridgeError;
pub use types::{ConnectionState, ServiceDescriptor, TaskId, TransportKind};
