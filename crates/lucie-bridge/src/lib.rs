//! Connection and dispatch engine for the Lucie AI service.
//!
//! The bridge keeps a supervised connection to the remote service over
//! two transports, a binary RPC channel and an HTTP fallback, discovers
//! the services it advertises, and dispatches method calls: short methods
//! inline, configured long-running methods through an in-process task
//! gateway. A background health monitor keeps the connection honest.

pub mod backoff;
pub mod connection;
pub mod dispatcher;
pub mod health;
pub mod registry;
pub mod tasks;
pub mod transport;

pub use backoff::RetrySchedule;
pub use connection::ConnectionManager;
pub use dispatcher::{Bridge, InvokeOutcome};
pub use health::HealthMonitor;
pub use registry::ServiceRegistry;
pub use tasks::{run_task_sweep, TaskHandle, TaskManager};
pub use transport::{RestTransport, RpcTransport};
