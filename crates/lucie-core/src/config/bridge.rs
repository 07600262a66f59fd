//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the bridge, read-only after construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address of the binary RPC endpoint (primary transport)
    pub rpc_address: String,

    /// Base URL of the HTTP endpoint (fallback transport)
    pub rest_base_url: String,

    /// Deadline for a transport probe during connection establishment
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Per-call deadline for short methods
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,

    /// Deadline for the remote call inside a delegated long-running task
    #[serde(with = "duration_secs")]
    pub task_call_timeout: Duration,

    /// Minimum spacing between connection attempts; an early caller waits
    /// out the remainder instead of storming a recovering service
    #[serde(with = "duration_secs")]
    pub connect_spacing: Duration,

    /// Interval between background health probes
    #[serde(with = "duration_secs")]
    pub health_interval: Duration,

    /// Deadline for a single health probe
    #[serde(with = "duration_secs")]
    pub health_probe_timeout: Duration,

    /// Maximum reconnection attempts per backoff series
    pub max_reconnect_attempts: u32,

    /// Interval between sweeps of finished delegated tasks
    #[serde(with = "duration_secs")]
    pub task_sweep_interval: Duration,

    /// How long finished tasks stay queryable before a sweep drops them
    #[serde(with = "duration_secs")]
    pub task_retention: Duration,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,

    /// Methods delegated to the task gateway, as `service.method`.
    ///
    /// Duration class is deploy-time configuration; the remote gives no
    /// runtime signal for it.
    pub long_running: Vec<String>,

    /// Service handling the process-message convenience call
    pub chat_service: String,

    /// Method handling the process-message convenience call
    pub chat_method: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            rpc_address: "localhost:50051".to_string(),
            rest_base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(30),
            task_call_timeout: Duration::from_secs(600),
            connect_spacing: Duration::from_secs(5),
            health_interval: Duration::from_secs(30),
            health_probe_timeout: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            task_sweep_interval: Duration::from_secs(60),
            task_retention: Duration::from_secs(300),
            backoff: BackoffConfig::default(),
            long_running: vec![
                "learning.learnFromUrl".to_string(),
                "learning.identifyKnowledgeGaps".to_string(),
                "multi_ai.evaluateResponses".to_string(),
            ],
            chat_service: "conversation".to_string(),
            chat_method: "process_message".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Whether `service.method` is configured as long-running
    pub fn is_long_running(&self, service: &str, method: &str) -> bool {
        self.long_running
            .iter()
            .any(|entry| entry == &format!("{}.{}", service, method))
    }
}

/// Exponential backoff configuration.
///
/// Delay for attempt n is `min(base * 2^(n-1), cap)`, plus optional jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base delay for the first retry
    #[serde(with = "duration_secs")]
    pub base: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub cap: Duration,

    /// Jitter factor (0.0 to 1.0); 0 keeps the schedule deterministic
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            jitter: 0.0,
        }
    }
}
