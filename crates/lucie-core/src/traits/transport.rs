//! Transport abstraction

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::BridgeError;
use crate::types::{ServiceDescriptor, StreamEvent, TransportKind};

/// Abstraction over a channel to the remote AI service.
///
/// The two implementations (binary RPC and HTTP fallback) are
/// interchangeable behind this trait; nothing above it branches on which
/// one is active. Implementations must support concurrent outstanding
/// calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which transport this is
    fn kind(&self) -> TransportKind;

    /// Check liveness within a deadline, establishing the underlying
    /// link first if one is not already open.
    async fn probe(&self, deadline: Duration) -> Result<(), BridgeError>;

    /// Invoke `service.method` and return the decoded result
    async fn call(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError>;

    /// Invoke `service.method` with chunked delivery.
    ///
    /// The returned channel yields fragments and terminates with an
    /// explicit `End` or `Failed` event.
    async fn call_streaming(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
    ) -> Result<mpsc::Receiver<StreamEvent>, BridgeError>;

    /// Query the remote for its current service advertisement
    async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, BridgeError>;

    /// Close the underlying link; outstanding calls fail
    async fn close(&self);
}
