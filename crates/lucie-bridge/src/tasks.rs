//! In-process task gateway
//!
//! Long-running methods are handed to a [`TaskManager`] instead of being
//! awaited inline. Each task carries a watch channel of snapshots so
//! waiters observe progress and terminal state without polling shared
//! locks, plus a slot for the result value.
//!
//! Finished tasks stay queryable for a retention window so a caller can
//! still read a result or status after completion, then a periodic sweep
//! drops them. Without the sweep a long-lived bridge would accumulate
//! terminal entries forever.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lucie_core::error::BridgeError;
use lucie_core::traits::{ProgressFn, TaskGateway, TaskWork};
use lucie_core::types::{TaskId, TaskSnapshot, TaskState};

struct TaskEntry {
    snapshot: watch::Sender<TaskSnapshot>,
    result: Mutex<Option<Value>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// When the task reached a terminal state; drives retention sweeps
    finished_at: Mutex<Option<Instant>>,
}

impl TaskEntry {
    fn mark_finished(&self) {
        let mut finished = self.finished_at.lock().expect("finished_at lock poisoned");
        if finished.is_none() {
            *finished = Some(Instant::now());
        }
    }
}

/// Tracks and executes delegated tasks
pub struct TaskManager {
    tasks: DashMap<TaskId, Arc<TaskEntry>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Number of tracked tasks, terminal ones included
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Run the periodic sweep of finished tasks.
///
/// Ticks until the token is cancelled; each tick drops terminal tasks
/// whose retention window has expired.
pub async fn run_task_sweep(
    gateway: Arc<dyn TaskGateway>,
    interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("task sweep stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let removed = gateway.prune_terminal(retention).await;
        if removed > 0 {
            tracing::debug!(removed, "swept finished tasks");
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskGateway for TaskManager {
    async fn create_task(&self, kind: &str, _params: Value) -> Result<TaskId, BridgeError> {
        let task_id = TaskId::generate();
        let snapshot = TaskSnapshot {
            task_id: task_id.clone(),
            kind: kind.to_string(),
            state: TaskState::Pending,
            progress: 0.0,
            error: None,
        };
        let (tx, _rx) = watch::channel(snapshot);
        let entry = Arc::new(TaskEntry {
            snapshot: tx,
            result: Mutex::new(None),
            handle: Mutex::new(None),
            finished_at: Mutex::new(None),
        });
        self.tasks.insert(task_id.clone(), entry);
        tracing::debug!(task_id = %task_id, kind, "task created");
        Ok(task_id)
    }

    async fn execute_task(&self, task_id: &TaskId, work: TaskWork) -> Result<(), BridgeError> {
        let entry = self
            .tasks
            .get(task_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| BridgeError::remote(format!("unknown task {}", task_id)))?;

        entry.snapshot.send_modify(|s| {
            s.state = TaskState::Running;
        });

        let progress_entry = Arc::clone(&entry);
        let progress: ProgressFn = Arc::new(move |value: f32| {
            let clamped = value.clamp(0.0, 1.0);
            progress_entry.snapshot.send_modify(|s| {
                if !s.state.is_terminal() {
                    s.progress = clamped;
                }
            });
        });

        let future = work(progress);
        let run_entry = Arc::clone(&entry);
        let id = task_id.clone();
        let handle = tokio::spawn(async move {
            match future.await {
                Ok(value) => {
                    *run_entry.result.lock().expect("result lock poisoned") = Some(value);
                    run_entry.snapshot.send_modify(|s| {
                        if !s.state.is_terminal() {
                            s.state = TaskState::Completed;
                            s.progress = 1.0;
                        }
                    });
                    run_entry.mark_finished();
                    tracing::debug!(task_id = %id, "task completed");
                }
                Err(e) => {
                    run_entry.snapshot.send_modify(|s| {
                        if !s.state.is_terminal() {
                            s.state = TaskState::Failed;
                            s.error = Some(e.to_string());
                        }
                    });
                    run_entry.mark_finished();
                    tracing::warn!(task_id = %id, error = %e, "task failed");
                }
            }
        });
        *entry.handle.lock().expect("handle lock poisoned") = Some(handle);
        Ok(())
    }

    async fn get_task_result(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let entry = self
            .tasks
            .get(task_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| BridgeError::remote(format!("unknown task {}", task_id)))?;

        let mut rx = entry.snapshot.subscribe();
        let wait = async {
            loop {
                let state = rx.borrow_and_update().state;
                match state {
                    TaskState::Completed => {
                        let result = entry
                            .result
                            .lock()
                            .expect("result lock poisoned")
                            .clone()
                            .unwrap_or(Value::Null);
                        return Ok(result);
                    }
                    TaskState::Failed => {
                        let error = rx
                            .borrow()
                            .error
                            .clone()
                            .unwrap_or_else(|| "task failed".to_string());
                        return Err(BridgeError::remote(error));
                    }
                    TaskState::Cancelled => {
                        return Err(BridgeError::remote(format!("task {} cancelled", task_id)));
                    }
                    TaskState::Pending | TaskState::Running => {}
                }
                if rx.changed().await.is_err() {
                    return Err(BridgeError::remote(format!("task {} dropped", task_id)));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(timeout)),
        }
    }

    async fn get_task(&self, task_id: &TaskId) -> Option<TaskSnapshot> {
        self.tasks
            .get(task_id)
            .map(|entry| entry.snapshot.borrow().clone())
    }

    async fn cancel_task(&self, task_id: &TaskId) -> bool {
        let Some(entry) = self.tasks.get(task_id).map(|e| Arc::clone(e.value())) else {
            return false;
        };

        let cancelled = entry.snapshot.send_if_modified(|s| {
            if s.state.is_terminal() {
                false
            } else {
                s.state = TaskState::Cancelled;
                true
            }
        });

        if cancelled {
            let handle = entry.handle.lock().expect("handle lock poisoned").take();
            if let Some(handle) = handle {
                handle.abort();
            }
            entry.mark_finished();
            tracing::debug!(task_id = %task_id, "task cancelled");
        }
        cancelled
    }

    async fn prune_terminal(&self, retention: Duration) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, entry| {
            if !entry.snapshot.borrow().state.is_terminal() {
                return true;
            }
            match *entry.finished_at.lock().expect("finished_at lock poisoned") {
                Some(at) => at.elapsed() < retention,
                None => true,
            }
        });
        before.saturating_sub(self.tasks.len())
    }
}

/// Caller-facing handle to a delegated task
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    gateway: Arc<dyn TaskGateway>,
}

impl TaskHandle {
    pub fn new(id: TaskId, gateway: Arc<dyn TaskGateway>) -> Self {
        Self { id, gateway }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Wait for the task's result, up to `timeout`
    pub async fn get_result(&self, timeout: Duration) -> Result<Value, BridgeError> {
        self.gateway.get_task_result(&self.id, timeout).await
    }

    /// Current snapshot, if the task is still tracked
    pub async fn check_status(&self) -> Option<TaskSnapshot> {
        self.gateway.get_task(&self.id).await
    }

    /// Cancel the task; returns whether a non-terminal task was cancelled
    pub async fn cancel(&self) -> bool {
        self.gateway.cancel_task(&self.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn work_returning(value: Value) -> TaskWork {
        Box::new(move |progress: ProgressFn| {
            Box::pin(async move {
                progress(0.5);
                Ok(value)
            })
        })
    }

    #[tokio::test]
    async fn test_task_completes_with_result() {
        let manager = TaskManager::new();
        let id = manager.create_task("learning.learnFromUrl", json!({})).await.unwrap();
        manager
            .execute_task(&id, work_returning(json!({"learned": true})))
            .await
            .unwrap();

        let result = manager
            .get_task_result(&id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result["learned"], true);

        let snapshot = manager.get_task(&id).await.unwrap();
        assert_eq!(snapshot.state, TaskState::Completed);
        assert_eq!(snapshot.progress, 1.0);
    }

    #[tokio::test]
    async fn test_task_failure_surfaces_through_status() {
        let manager = TaskManager::new();
        let id = manager.create_task("multi_ai.evaluateResponses", json!({})).await.unwrap();
        let work: TaskWork = Box::new(|_progress| {
            Box::pin(async { Err(BridgeError::remote("provider exploded")) })
        });
        manager.execute_task(&id, work).await.unwrap();

        let err = manager
            .get_task_result(&id, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("provider exploded"));

        let snapshot = manager.get_task(&id).await.unwrap();
        assert_eq!(snapshot.state, TaskState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_wait_times_out() {
        let manager = TaskManager::new();
        let id = manager.create_task("slow", json!({})).await.unwrap();
        let work: TaskWork = Box::new(|_progress| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            })
        });
        manager.execute_task(&id, work).await.unwrap();

        let err = manager
            .get_task_result(&id, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let manager = TaskManager::new();
        let id = manager.create_task("slow", json!({})).await.unwrap();
        let work: TaskWork = Box::new(|_progress| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            })
        });
        manager.execute_task(&id, work).await.unwrap();

        assert!(manager.cancel_task(&id).await);
        let snapshot = manager.get_task(&id).await.unwrap();
        assert_eq!(snapshot.state, TaskState::Cancelled);

        // Cancelling a terminal task reports false
        assert!(!manager.cancel_task(&id).await);
    }

    #[tokio::test]
    async fn test_prune_drops_expired_terminal_tasks() {
        let manager = TaskManager::new();
        let done = manager.create_task("a", json!({})).await.unwrap();
        manager
            .execute_task(&done, work_returning(Value::Null))
            .await
            .unwrap();
        manager
            .get_task_result(&done, Duration::from_secs(1))
            .await
            .unwrap();
        let pending = manager.create_task("b", json!({})).await.unwrap();

        // Within the retention window everything stays queryable
        assert_eq!(manager.prune_terminal(Duration::from_secs(300)).await, 0);
        assert!(manager.get_task(&done).await.is_some());

        // An expired window drops terminal tasks only
        assert_eq!(manager.prune_terminal(Duration::ZERO).await, 1);
        assert!(manager.get_task(&done).await.is_none());
        assert!(manager.get_task(&pending).await.is_some());
    }
}
