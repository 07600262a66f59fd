//! Core domain types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Connection state of the bridge.
///
/// Exactly one value at a time, owned by the connection manager. All other
/// components read it through accessors and never mutate it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link; either never connected or retry budget exhausted
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Connected over the binary RPC transport
    ConnectedPrimary,
    /// Connected over the REST fallback transport
    ConnectedFallback,
    /// Waiting out a backoff delay before the next attempt
    Reconnecting,
}

impl ConnectionState {
    /// Whether calls can currently be routed over a transport
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectedPrimary | ConnectionState::ConnectedFallback
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::ConnectedPrimary => write!(f, "connected_primary"),
            ConnectionState::ConnectedFallback => write!(f, "connected_fallback"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Which transport a connection or call went over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// Binary RPC channel, preferred when reachable
    Rpc,
    /// HTTP channel, used when the primary is unreachable
    Rest,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Rpc => write!(f, "rpc"),
            TransportKind::Rest => write!(f, "rest"),
        }
    }
}

/// How long a method is expected to run, decided by deploy-time
/// configuration rather than runtime timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationClass {
    /// Returns promptly; callers block on the result
    Short,
    /// Delegated to the task gateway; callers get a handle
    Long,
}

/// One method on an advertised service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name
    pub name: String,
}

impl MethodDescriptor {
    /// Create a descriptor for a named method
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One service as held in the registry.
///
/// Rebuilt wholesale on every successful discovery. Stale entries are
/// acceptable after a disconnect; a lookup miss triggers rediscovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name, unique within the registry
    pub name: String,
    /// Availability status reported by the service
    pub status: String,
    /// Callable methods
    pub methods: Vec<MethodDescriptor>,
    /// Free-form metadata
    pub metadata: Value,
}

impl ServiceDescriptor {
    /// Whether the service exposes a method with the given name
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.name == method)
    }
}

/// Caller-facing availability snapshot for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Whether the service can currently take calls
    pub available: bool,
    /// Status string, "not_found" when the service is unknown
    pub status: String,
}

impl StatusSnapshot {
    /// Snapshot for a service that is not in the registry
    pub fn not_found() -> Self {
        Self {
            available: false,
            status: "not_found".to_string(),
        }
    }
}

/// Reply from the well-known chat service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    /// Generated response text
    pub response: String,
    /// Timestamp reported by the service
    pub timestamp: String,
    /// Message id, generated locally when the service omits one
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Conversation context carried across turns
    pub context: Value,
}

/// Unique identifier for a delegated long-running task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh random task ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a delegated task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Created but not yet executing
    Pending,
    /// Work future is running
    Running,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl TaskState {
    /// Whether the task has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Point-in-time view of a delegated task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task identifier
    pub task_id: TaskId,
    /// What the task does, as `service.method`
    pub kind: String,
    /// Current lifecycle state
    pub state: TaskState,
    /// Progress in [0.0, 1.0], best-effort
    pub progress: f32,
    /// Error message when `state` is `Failed`
    pub error: Option<String>,
}

/// One fragment of a streaming response.
///
/// Chunked delivery is modeled as a bounded channel of these events with
/// explicit end-of-stream and error terminals.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// One decoded response fragment
    Fragment(Value),
    /// The stream completed normally
    End,
    /// The stream terminated with an error
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Disconnected), "disconnected");
        assert_eq!(
            format!("{}", ConnectionState::ConnectedFallback),
            "connected_fallback"
        );
    }

    #[test]
    fn test_is_connected() {
        assert!(ConnectionState::ConnectedPrimary.is_connected());
        assert!(ConnectionState::ConnectedFallback.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
    }

    #[test]
    fn test_service_has_method() {
        let svc = ServiceDescriptor {
            name: "learning".into(),
            status: "available".into(),
            methods: vec![
                MethodDescriptor::new("learnFromUrl"),
                MethodDescriptor::new("getStats"),
            ],
            metadata: Value::Null,
        };
        assert!(svc.has_method("getStats"));
        assert!(!svc.has_method("unknown"));
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }
}
