//! HTTP fallback transport
//!
//! Talks to the AI service's REST surface: `GET /health` for liveness,
//! `GET /services` for discovery, and `POST /services/{service}/{method}`
//! for invocation. Responses are already structured JSON; the remote
//! reports call failures through a non-null `error` field in the
//! `{result, error}` envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use lucie_core::error::BridgeError;
use lucie_core::traits::Transport;
use lucie_core::types::{MethodDescriptor, ServiceDescriptor, StreamEvent, TransportKind};

/// Deadline for the discovery request
const LIST_SERVICES_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the remote call behind a degraded streaming invocation
const STREAM_CALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Fallback transport over HTTP
pub struct RestTransport {
    base_url: String,
    client: reqwest::Client,
}

impl RestTransport {
    /// Create a transport for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a reqwest failure to the bridge taxonomy
    fn request_error(e: reqwest::Error, timeout: Duration) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(timeout)
        } else {
            BridgeError::TransportUnreachable(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }

    async fn probe(&self, deadline: Duration) -> Result<(), BridgeError> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| Self::request_error(e, deadline))?;

        if !response.status().is_success() {
            return Err(BridgeError::TransportUnreachable(format!(
                "health endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn call(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let url = self.url(&format!("/services/{}/{}", service, method));
        let response = self
            .client
            .post(url)
            .json(&json!({ "data": payload }))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::request_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::remote(format!(
                "{}.{} returned HTTP {}",
                service, method, status
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            BridgeError::MalformedResponse(format!("{}.{}: {}", service, method, e))
        })?;
        decode_envelope(body)
    }

    async fn call_streaming(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
    ) -> Result<mpsc::Receiver<StreamEvent>, BridgeError> {
        // The REST surface has no chunked delivery; degrade to one
        // fragment followed by end-of-stream.
        let result = self
            .call(service, method, payload, STREAM_CALL_TIMEOUT)
            .await?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx.try_send(StreamEvent::Fragment(result));
        let _ = tx.try_send(StreamEvent::End);
        Ok(rx)
    }

    async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, BridgeError> {
        let response = self
            .client
            .get(self.url("/services"))
            .timeout(LIST_SERVICES_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::request_error(e, LIST_SERVICES_TIMEOUT))?;

        if !response.status().is_success() {
            return Err(BridgeError::TransportUnreachable(format!(
                "services endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BridgeError::MalformedResponse(format!("service list: {}", e)))?;
        Ok(services_from_body(&body))
    }

    async fn close(&self) {
        // Stateless; nothing to tear down
    }
}

/// Unwrap the `{result, error}` call envelope
fn decode_envelope(body: Value) -> Result<Value, BridgeError> {
    if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
        return Err(BridgeError::remote(error.to_string()));
    }
    match body.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(BridgeError::MalformedResponse(
            "call envelope missing result field".to_string(),
        )),
    }
}

/// Build registry descriptors from the `GET /services` body.
///
/// Entries that don't carry a name are skipped; discovery never fails on
/// partial data.
fn services_from_body(body: &Value) -> Vec<ServiceDescriptor> {
    let Some(entries) = body.get("services").and_then(|s| s.as_array()) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.to_string();
            let status = entry
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown")
                .to_string();
            let methods = entry
                .get("methods")
                .and_then(|m| m.as_array())
                .map(|methods| {
                    methods
                        .iter()
                        .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                        .map(MethodDescriptor::new)
                        .collect()
                })
                .unwrap_or_default();
            let metadata = entry.get("metadata").cloned().unwrap_or(Value::Null);

            Some(ServiceDescriptor {
                name,
                status,
                methods,
                metadata,
            })
        })
        .collect()
}
