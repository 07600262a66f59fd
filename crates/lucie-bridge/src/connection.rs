//! Connection manager
//!
//! Owns the connection state machine, chooses which transport is active,
//! runs discovery after a successful connect, and schedules reconnection
//! with backoff on failure. All state transitions happen here; the
//! dispatcher and health monitor only read state and call the transition
//! methods.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lucie_core::config::BridgeConfig;
use lucie_core::error::BridgeError;
use lucie_core::traits::Transport;
use lucie_core::types::{ConnectionState, TransportKind};

use crate::backoff::RetrySchedule;
use crate::registry::ServiceRegistry;

/// Supervises the link to the remote service
pub struct ConnectionManager {
    primary: Arc<dyn Transport>,
    fallback: Arc<dyn Transport>,
    registry: Arc<ServiceRegistry>,
    config: Arc<BridgeConfig>,
    /// The single connection state value; mutated only through
    /// transition methods on this type
    state: RwLock<ConnectionState>,
    /// Collapses concurrent connection attempts into one in-flight attempt
    attempt_gate: Mutex<()>,
    /// Start of the most recent attempt, for minimum spacing
    last_attempt: StdMutex<Option<Instant>>,
    /// Backoff series for the current run of failures
    schedule: StdMutex<RetrySchedule>,
    /// Set when a series spends its budget; internal callers fail fast
    /// until an explicit connect or a health-triggered reset
    exhausted: AtomicBool,
    /// Background reconnect in flight, replaced rather than stacked
    reconnect_task: StdMutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Create a manager over the given transports
    pub fn new(
        config: Arc<BridgeConfig>,
        primary: Arc<dyn Transport>,
        fallback: Arc<dyn Transport>,
        registry: Arc<ServiceRegistry>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let schedule = RetrySchedule::from_config(&config);
        Arc::new(Self {
            primary,
            fallback,
            registry,
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            attempt_gate: Mutex::new(()),
            last_attempt: StdMutex::new(None),
            schedule: StdMutex::new(schedule),
            exhausted: AtomicBool::new(false),
            reconnect_task: StdMutex::new(None),
            cancel,
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.read().expect("state lock poisoned")
    }

    /// Whether the current backoff series has spent its budget
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Attempts spent in the current backoff series
    pub fn attempts(&self) -> u32 {
        self.schedule.lock().expect("schedule lock poisoned").attempt()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write().expect("state lock poisoned");
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "connection state transition");
            *state = next;
        }
    }

    fn connected_kind(&self) -> Option<TransportKind> {
        match self.state() {
            ConnectionState::ConnectedPrimary => Some(TransportKind::Rpc),
            ConnectionState::ConnectedFallback => Some(TransportKind::Rest),
            _ => None,
        }
    }

    /// The transport calls should currently route over, if connected
    pub fn active_transport(&self) -> Option<Arc<dyn Transport>> {
        self.connected_kind().map(|kind| self.transport_for(kind))
    }

    /// The transport of the given kind
    pub fn transport_for(&self, kind: TransportKind) -> Arc<dyn Transport> {
        match kind {
            TransportKind::Rpc => Arc::clone(&self.primary),
            TransportKind::Rest => Arc::clone(&self.fallback),
        }
    }

    /// The transport opposite to the given kind
    pub fn other_transport(&self, kind: TransportKind) -> Arc<dyn Transport> {
        match kind {
            TransportKind::Rpc => Arc::clone(&self.fallback),
            TransportKind::Rest => Arc::clone(&self.primary),
        }
    }

    /// Establish a connection, retrying with backoff until the budget is
    /// spent.
    ///
    /// Concurrent invocations collapse into the in-flight attempt: a
    /// caller blocked on the gate that wakes up connected returns without
    /// a second attempt. An explicit call after an exhausted series is
    /// accepted and starts a fresh counter. On success the counter is
    /// reset first, then discovery runs.
    pub async fn connect(self: &Arc<Self>) -> Result<TransportKind, BridgeError> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::TransportUnreachable("bridge closed".to_string()));
        }

        let _gate = self.attempt_gate.lock().await;
        if let Some(kind) = self.connected_kind() {
            return Ok(kind);
        }

        self.exhausted.store(false, Ordering::SeqCst);
        self.schedule.lock().expect("schedule lock poisoned").reset();

        loop {
            self.wait_spacing().await?;
            self.set_state(ConnectionState::Connecting);
            *self.last_attempt.lock().expect("last_attempt lock poisoned") = Some(Instant::now());
            let attempt = self
                .schedule
                .lock()
                .expect("schedule lock poisoned")
                .record_attempt();

            match self.try_transports().await {
                Ok(kind) => {
                    // Counter reset precedes discovery
                    self.schedule.lock().expect("schedule lock poisoned").reset();
                    self.exhausted.store(false, Ordering::SeqCst);
                    self.set_state(match kind {
                        TransportKind::Rpc => ConnectionState::ConnectedPrimary,
                        TransportKind::Rest => ConnectionState::ConnectedFallback,
                    });

                    let transport = self.transport_for(kind);
                    if let Err(e) = self.registry.refresh(transport.as_ref()).await {
                        tracing::warn!(error = %e, "discovery failed; keeping stale registry");
                    }

                    tracing::info!(transport = %kind, attempt, "connected");
                    return Ok(kind);
                }
                Err(cause) => {
                    let max = self.config.max_reconnect_attempts;
                    if attempt >= max {
                        self.exhausted.store(true, Ordering::SeqCst);
                        self.set_state(ConnectionState::Disconnected);
                        tracing::warn!(attempts = attempt, error = %cause, "retry budget exhausted");
                        return Err(BridgeError::RetryBudgetExhausted(max));
                    }

                    let delay = self
                        .schedule
                        .lock()
                        .expect("schedule lock poisoned")
                        .next_delay();
                    tracing::warn!(
                        error = %cause,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "connection attempt failed; backing off"
                    );
                    self.set_state(ConnectionState::Reconnecting);

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.set_state(ConnectionState::Disconnected);
                            return Err(BridgeError::TransportUnreachable(
                                "bridge closed".to_string(),
                            ));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Probe the primary within its deadline, then the fallback
    async fn try_transports(&self) -> Result<TransportKind, BridgeError> {
        match self.primary.probe(self.config.connect_timeout).await {
            Ok(()) => return Ok(TransportKind::Rpc),
            Err(e) => {
                tracing::warn!(error = %e, "primary transport probe failed; trying fallback");
            }
        }
        match self.fallback.probe(self.config.connect_timeout).await {
            Ok(()) => Ok(TransportKind::Rest),
            Err(e) => Err(e),
        }
    }

    /// Wait out the minimum spacing since the previous attempt
    async fn wait_spacing(&self) -> Result<(), BridgeError> {
        let spacing = self.config.connect_spacing;
        let elapsed = self
            .last_attempt
            .lock()
            .expect("last_attempt lock poisoned")
            .map(|t| t.elapsed());

        if let Some(elapsed) = elapsed {
            if elapsed < spacing {
                let wait = spacing - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "spacing connection attempt");
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(BridgeError::TransportUnreachable("bridge closed".to_string()));
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
        Ok(())
    }

    /// Get the active transport, connecting first if necessary.
    ///
    /// With an exhausted retry budget this fails fast instead of blocking
    /// on another attempt; only an explicit connect or a health-triggered
    /// reset clears that.
    pub async fn ensure_connected(self: &Arc<Self>) -> Result<Arc<dyn Transport>, BridgeError> {
        if let Some(transport) = self.active_transport() {
            return Ok(transport);
        }
        if self.is_exhausted() {
            return Err(BridgeError::RetryBudgetExhausted(
                self.config.max_reconnect_attempts,
            ));
        }
        self.connect().await?;
        self.active_transport()
            .ok_or_else(|| BridgeError::TransportUnreachable("no active transport".to_string()))
    }

    /// Force the manager back into a reconnecting state with a fresh
    /// backoff series.
    ///
    /// Used by the health monitor and by dispatched calls that observe a
    /// transport-level failure. The background reconnect replaces any
    /// already scheduled one.
    pub fn force_reconnect(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }

        self.schedule.lock().expect("schedule lock poisoned").reset();
        self.exhausted.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Reconnecting);

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            if let Err(e) = this.connect().await {
                tracing::warn!(error = %e, "forced reconnection failed");
            }
        });

        let mut slot = self
            .reconnect_task
            .lock()
            .expect("reconnect_task lock poisoned");
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Probe whichever transport is currently active
    pub async fn probe_active(&self, deadline: Duration) -> Result<(), BridgeError> {
        match self.state() {
            ConnectionState::ConnectedPrimary => self.primary.probe(deadline).await,
            ConnectionState::ConnectedFallback => self.fallback.probe(deadline).await,
            _ => Ok(()),
        }
    }

    /// Tear down: cancel pending reconnects, close both transports, and
    /// mark the state disconnected. No background activity remains after
    /// this returns.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self
            .reconnect_task
            .lock()
            .expect("reconnect_task lock poisoned")
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.primary.close().await;
        self.fallback.close().await;
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("connection manager closed");
    }
}
