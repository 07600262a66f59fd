//! Method dispatch
//!
//! [`Bridge`] is the caller-facing surface: it resolves service and method
//! names against the registry, routes short calls over the active
//! transport with one opposite-transport retry on transport failure, and
//! delegates long-running calls to the task gateway.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lucie_core::config::BridgeConfig;
use lucie_core::error::BridgeError;
use lucie_core::time::current_time_millis;
use lucie_core::traits::{TaskGateway, TaskWork, Transport};
use lucie_core::types::{
    ChatReply, ConnectionState, ServiceDescriptor, StatusSnapshot, StreamEvent, TransportKind,
};

use crate::connection::ConnectionManager;
use crate::health::HealthMonitor;
use crate::registry::ServiceRegistry;
use crate::tasks::{run_task_sweep, TaskHandle, TaskManager};
use crate::transport::{RestTransport, RpcTransport};

/// What an invocation produced: a value now, or a task handle for later
pub enum InvokeOutcome {
    /// The call completed inline
    Value(Value),
    /// The call was delegated; poll or wait on the handle
    Task(TaskHandle),
}

impl std::fmt::Debug for InvokeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvokeOutcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            InvokeOutcome::Task(handle) => f.debug_tuple("Task").field(&handle.id()).finish(),
        }
    }
}

/// Caller-facing bridge to the remote AI service
pub struct Bridge {
    config: Arc<BridgeConfig>,
    manager: Arc<ConnectionManager>,
    registry: Arc<ServiceRegistry>,
    gateway: Arc<dyn TaskGateway>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Bridge {
    /// Build a bridge over the configured transports
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        let primary: Arc<dyn Transport> = Arc::new(RpcTransport::new(
            config.rpc_address.clone(),
            config.connect_timeout,
        ));
        let fallback: Arc<dyn Transport> = Arc::new(RestTransport::new(&config.rest_base_url));
        let gateway: Arc<dyn TaskGateway> = Arc::new(TaskManager::new());
        Self::with_parts(config, primary, fallback, gateway)
    }

    /// Build a bridge over caller-supplied transports and gateway
    pub fn with_parts(
        config: BridgeConfig,
        primary: Arc<dyn Transport>,
        fallback: Arc<dyn Transport>,
        gateway: Arc<dyn TaskGateway>,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(ServiceRegistry::new());
        let cancel = CancellationToken::new();
        let manager = ConnectionManager::new(
            Arc::clone(&config),
            primary,
            fallback,
            Arc::clone(&registry),
            cancel.child_token(),
        );

        let health_task = HealthMonitor::from_config(&config)
            .spawn(Arc::clone(&manager), cancel.child_token());
        let sweep_task = tokio::spawn(run_task_sweep(
            Arc::clone(&gateway),
            config.task_sweep_interval,
            config.task_retention,
            cancel.child_token(),
        ));

        Arc::new(Self {
            config,
            manager,
            registry,
            gateway,
            health_task: Mutex::new(Some(health_task)),
            sweep_task: Mutex::new(Some(sweep_task)),
            cancel,
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Discovered services, sorted by name
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.registry.list()
    }

    /// Connect to the remote service, reporting which transport won
    pub async fn connect(&self) -> Result<TransportKind, BridgeError> {
        self.manager.connect().await
    }

    /// Connect and report overall readiness as a boolean.
    ///
    /// Exhausting the retry budget yields `Ok(false)` rather than an
    /// error; the caller decides whether a degraded start is acceptable.
    pub async fn initialize(&self) -> Result<bool, BridgeError> {
        match self.manager.connect().await {
            Ok(kind) => {
                tracing::info!(transport = %kind, services = self.registry.len(), "bridge ready");
                Ok(true)
            }
            Err(BridgeError::RetryBudgetExhausted(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Invoke `service.method` with the given payload.
    ///
    /// Short methods return a value inline; configured long-running
    /// methods return a task handle immediately.
    pub async fn invoke(
        &self,
        service: &str,
        method: &str,
        payload: Value,
    ) -> Result<InvokeOutcome, BridgeError> {
        if service.is_empty() {
            return Err(BridgeError::ServiceNotFound("(empty)".to_string()));
        }
        if method.is_empty() {
            return Err(BridgeError::MethodNotFound(format!("{}.(empty)", service)));
        }

        let transport = self.manager.ensure_connected().await?;
        let descriptor = self.resolve(service, transport.as_ref()).await?;
        if !descriptor.has_method(method) {
            return Err(BridgeError::MethodNotFound(format!(
                "{}.{}",
                service, method
            )));
        }

        if self.config.is_long_running(service, method) {
            let handle = self.submit_long(service, method, payload).await?;
            Ok(InvokeOutcome::Task(handle))
        } else {
            let value = self.short_call(transport, service, method, &payload).await?;
            Ok(InvokeOutcome::Value(value))
        }
    }

    /// Look up a service, refreshing the registry once on a miss.
    ///
    /// A transport-level failure during that refresh gets the same
    /// treatment as a failed call: one attempt over the opposite
    /// transport before surfacing the failure with its cause.
    async fn resolve(
        &self,
        service: &str,
        transport: &dyn Transport,
    ) -> Result<ServiceDescriptor, BridgeError> {
        if let Some(descriptor) = self.registry.get(service) {
            return Ok(descriptor);
        }

        tracing::debug!(service, "service not in registry; rediscovering");
        if let Err(e) = self.registry.refresh(transport).await {
            if !e.is_transport_failure() {
                return Err(e);
            }
            let other = self.manager.other_transport(transport.kind());
            tracing::warn!(
                error = %e,
                from = %transport.kind(),
                to = %other.kind(),
                "discovery failed at transport level; retrying on other transport"
            );
            self.manager.force_reconnect();
            self.registry.refresh(other.as_ref()).await.map_err(|second| {
                BridgeError::invocation("service discovery failed over both transports", second)
            })?;
        }
        self.registry
            .get(service)
            .ok_or_else(|| BridgeError::ServiceNotFound(service.to_string()))
    }

    /// Execute a short call, retrying once over the opposite transport
    /// when the active one fails at the transport level.
    async fn short_call(
        &self,
        transport: Arc<dyn Transport>,
        service: &str,
        method: &str,
        payload: &Value,
    ) -> Result<Value, BridgeError> {
        let timeout = self.config.call_timeout;
        match transport.call(service, method, payload, timeout).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_transport_failure() => {
                let other = self.manager.other_transport(transport.kind());
                tracing::warn!(
                    error = %e,
                    from = %transport.kind(),
                    to = %other.kind(),
                    "call failed at transport level; retrying on other transport"
                );
                self.manager.force_reconnect();
                match other.call(service, method, payload, timeout).await {
                    Ok(value) => Ok(value),
                    Err(second) => Err(BridgeError::invocation(
                        format!("{}.{} failed over both transports", service, method),
                        second,
                    )),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Delegate a long-running call to the task gateway
    async fn submit_long(
        &self,
        service: &str,
        method: &str,
        payload: Value,
    ) -> Result<TaskHandle, BridgeError> {
        let kind = format!("{}.{}", service, method);
        let task_id = self.gateway.create_task(&kind, payload.clone()).await?;

        let manager = Arc::clone(&self.manager);
        let timeout = self.config.task_call_timeout;
        let service = service.to_string();
        let method = method.to_string();
        let work: TaskWork = Box::new(move |progress| {
            Box::pin(async move {
                progress(0.0);
                // The transport is resolved at execution time so a
                // reconnect between submission and execution is picked up
                let transport = manager.ensure_connected().await?;
                let result = transport.call(&service, &method, &payload, timeout).await?;
                progress(1.0);
                Ok(result)
            })
        });
        self.gateway.execute_task(&task_id, work).await?;

        tracing::debug!(task_id = %task_id, kind = %kind, "long-running call delegated");
        Ok(TaskHandle::new(task_id, Arc::clone(&self.gateway)))
    }

    /// Invoke a streaming method, receiving fragments over a channel
    pub async fn invoke_streaming(
        &self,
        service: &str,
        method: &str,
        payload: Value,
    ) -> Result<mpsc::Receiver<StreamEvent>, BridgeError> {
        let transport = self.manager.ensure_connected().await?;
        let descriptor = self.resolve(service, transport.as_ref()).await?;
        if !descriptor.has_method(method) {
            return Err(BridgeError::MethodNotFound(format!(
                "{}.{}",
                service, method
            )));
        }
        transport.call_streaming(service, method, &payload).await
    }

    /// Availability snapshot for a service.
    ///
    /// Never errors: an unknown service reports `not_found`, and a service
    /// known from a previous discovery reports `unreachable` while the
    /// connection is down.
    pub async fn check_status(&self, service: &str) -> StatusSnapshot {
        let transport = match self.manager.ensure_connected().await {
            Ok(t) => t,
            Err(_) => {
                return match self.registry.get(service) {
                    Some(_) => StatusSnapshot {
                        available: false,
                        status: "unreachable".to_string(),
                    },
                    None => StatusSnapshot::not_found(),
                };
            }
        };

        match self.resolve(service, transport.as_ref()).await {
            Ok(descriptor) => StatusSnapshot {
                available: descriptor.status == "available",
                status: descriptor.status,
            },
            Err(_) => StatusSnapshot::not_found(),
        }
    }

    /// Send a chat message through the configured conversation service
    pub async fn process_message(
        &self,
        message: &str,
        context: Value,
    ) -> Result<ChatReply, BridgeError> {
        let payload = json!({ "message": message, "context": context });
        let outcome = self
            .invoke(&self.config.chat_service, &self.config.chat_method, payload)
            .await?;

        match outcome {
            InvokeOutcome::Value(value) => chat_reply_from(value),
            InvokeOutcome::Task(_) => Err(BridgeError::MalformedResponse(
                "chat method configured as long-running".to_string(),
            )),
        }
    }

    /// Shut the bridge down: stop the health monitor, cancel reconnects,
    /// and close both transports.
    pub async fn close(&self) {
        self.cancel.cancel();
        let health = self
            .health_task
            .lock()
            .expect("health_task lock poisoned")
            .take();
        if let Some(task) = health {
            task.abort();
        }
        let sweep = self
            .sweep_task
            .lock()
            .expect("sweep_task lock poisoned")
            .take();
        if let Some(task) = sweep {
            task.abort();
        }
        self.manager.close().await;
        tracing::info!("bridge closed");
    }
}

/// Decode a chat reply, filling locally generated fallbacks for the
/// fields the service may omit.
fn chat_reply_from(value: Value) -> Result<ChatReply, BridgeError> {
    let response = value
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| {
            BridgeError::MalformedResponse("chat reply missing response field".to_string())
        })?
        .to_string();

    let now = current_time_millis();
    let timestamp = value
        .get("timestamp")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| now.to_string());
    let message_id = value
        .get("messageId")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("msg_{}", now));
    let context = value.get("context").cloned().unwrap_or(Value::Null);

    Ok(ChatReply {
        response,
        timestamp,
        message_id,
        context,
    })
}
