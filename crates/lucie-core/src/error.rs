//! Core error types for the Lucie bridge

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use lucie_protocol::ProtocolError;

/// Errors surfaced by the bridge to its callers.
///
/// Callers must be able to tell apart "this operation doesn't exist"
/// (`ServiceNotFound`/`MethodNotFound`), "the service is temporarily
/// unreachable" (`TransportUnreachable`/`RetryBudgetExhausted`), and "the
/// service returned an error" (`RemoteInvocation`). These classes are never
/// collapsed into one variant.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Neither connecting nor probing the transport succeeded
    #[error("Transport unreachable: {0}")]
    TransportUnreachable(String),

    /// The named service is not advertised, even after rediscovery
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// The service exists but does not expose the method
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A response crossed the wire but could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The remote service reported a failure
    #[error("Remote invocation failed: {message}")]
    RemoteInvocation {
        message: String,
        #[source]
        cause: Option<Box<BridgeError>>,
    },

    /// A bounded operation exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// All reconnection attempts were spent
    #[error("Retry budget exhausted after {0} attempts")]
    RetryBudgetExhausted(u32),

    /// Wire protocol error on the binary transport
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// Wrap a lower-level failure as a remote invocation error,
    /// keeping the cause attached.
    pub fn invocation(message: impl Into<String>, cause: BridgeError) -> Self {
        Self::RemoteInvocation {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// A remote invocation error with no structured cause
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteInvocation {
            message: message.into(),
            cause: None,
        }
    }

    /// Whether this error indicates the transport itself failed,
    /// as opposed to the call being rejected by the remote.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::TransportUnreachable(_) | BridgeError::Protocol(_)
        )
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
