//! Task gateway abstraction

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BridgeError;
use crate::types::{TaskId, TaskSnapshot};

/// Progress-reporting callback handed to a task's work future
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// A unit of work submitted to the gateway.
///
/// The closure receives a progress callback and produces the future that
/// performs the actual remote call. Transport resolution happens inside
/// the future, at execution time, not at submission time.
pub type TaskWork =
    Box<dyn FnOnce(ProgressFn) -> BoxFuture<'static, Result<Value, BridgeError>> + Send>;

/// Executor boundary for long-running methods.
///
/// The bridge creates a task, submits the work, and returns a handle to
/// the caller; everything after submission (progress, terminal state,
/// cancellation) is owned by the gateway.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Register a new task and return its identifier
    async fn create_task(&self, kind: &str, params: Value) -> Result<TaskId, BridgeError>;

    /// Start executing a previously created task.
    ///
    /// Failures inside the work future surface through the task's terminal
    /// state, never through this method.
    async fn execute_task(&self, task_id: &TaskId, work: TaskWork) -> Result<(), BridgeError>;

    /// Wait for the task's result, up to `timeout`
    async fn get_task_result(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Value, BridgeError>;

    /// Current snapshot of the task, if it exists
    async fn get_task(&self, task_id: &TaskId) -> Option<TaskSnapshot>;

    /// Cancel the task; returns whether a non-terminal task was cancelled
    async fn cancel_task(&self, task_id: &TaskId) -> bool;

    /// Drop tasks that reached a terminal state longer than `retention`
    /// ago, returning how many were removed
    async fn prune_terminal(&self, retention: Duration) -> usize;
}
