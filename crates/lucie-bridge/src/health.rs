//! Background health monitoring
//!
//! Probes the active transport on a fixed interval. A failed probe hands
//! the connection back to the manager for reconnection with a fresh
//! backoff series; a manager left disconnected with an exhausted budget
//! gets a new connection attempt on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lucie_core::config::BridgeConfig;
use lucie_core::types::ConnectionState;

use crate::connection::ConnectionManager;

/// Periodic liveness checker for the active connection
pub struct HealthMonitor {
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            interval,
            probe_timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.health_interval, config.health_probe_timeout)
    }

    /// Start the monitor loop; it runs until the token is cancelled
    pub fn spawn(
        self,
        manager: Arc<ConnectionManager>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the monitor
            // waits a full interval before its first probe.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("health monitor stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                match manager.state() {
                    ConnectionState::ConnectedPrimary | ConnectionState::ConnectedFallback => {
                        if let Err(e) = manager.probe_active(self.probe_timeout).await {
                            tracing::warn!(error = %e, "health probe failed; reconnecting");
                            manager.force_reconnect();
                        } else {
                            tracing::trace!("health probe ok");
                        }
                    }
                    ConnectionState::Disconnected => {
                        // A spent budget does not strand the bridge; the
                        // monitor starts a fresh series.
                        if let Err(e) = manager.connect().await {
                            tracing::debug!(error = %e, "background reconnection failed");
                        }
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting => {
                        // An attempt is already in flight; leave it alone
                    }
                }
            }
        })
    }
}
