use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use super::handler::{HandlerRegistry, TaskContext};
use super::store::SqliteTaskStore;
use super::types::{RunStatus, ScheduledTask, TaskRun, TaskStoreError};

/// Seam to the engine that actually invokes task handlers. Retries and
/// concurrency limits live on the other side of this trait; this crate
/// only hands a started run over and records what comes back.
pub trait RunDispatcher: Send + Sync {
    fn dispatch(&self, task: &ScheduledTask, run: &TaskRun) -> Result<(), TaskStoreError>;
}

/// In-process dispatcher: invokes the registered handler on a worker
/// thread and finalizes the run record when it returns. The wait on the
/// worker is bounded by the task's `timeout_ms`, so a wedged handler
/// leaves a `timed_out` row instead of a run stuck in `running`.
pub struct ThreadDispatcher {
    store: SqliteTaskStore,
    registry: Arc<HandlerRegistry>,
}

impl ThreadDispatcher {
    pub fn new(store: SqliteTaskStore, registry: Arc<HandlerRegistry>) -> Self {
        Self { store, registry }
    }
}

impl RunDispatcher for ThreadDispatcher {
    fn dispatch(&self, task: &ScheduledTask, run: &TaskRun) -> Result<(), TaskStoreError> {
        let handler = self.registry.get(&task.function_id).ok_or_else(|| {
            TaskStoreError::Dispatch(format!(
                "no handler registered for {}",
                task.function_id
            ))
        })?;
        let ctx = TaskContext {
            task_id: task.function_id.clone(),
            run_id: run.id,
            triggered_by: run.triggered_by.clone(),
        };
        let store = self.store.clone();
        let run_id = run.id;
        let timeout = Duration::from_millis(task.timeout_ms);
        let task_label = task.function_id.clone();

        thread::spawn(move || {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let _ = tx.send(handler.invoke(&ctx));
            });
            let finalize = match rx.recv_timeout(timeout) {
                Ok(Ok(output)) => {
                    info!("run {} of {} succeeded", run_id, task_label);
                    store.complete_run(run_id, RunStatus::Succeeded, Some(output), None)
                }
                Ok(Err(err)) => {
                    warn!("run {} of {} failed: {}", run_id, task_label, err);
                    store.complete_run(run_id, RunStatus::Failed, None, Some(err.to_string()))
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "run {} of {} exceeded {} ms",
                        run_id,
                        task_label,
                        timeout.as_millis()
                    );
                    store.complete_run(
                        run_id,
                        RunStatus::TimedOut,
                        None,
                        Some(format!("run exceeded {} ms", timeout.as_millis())),
                    )
                }
                Err(RecvTimeoutError::Disconnected) => store.complete_run(
                    run_id,
                    RunStatus::Failed,
                    None,
                    Some("handler panicked before reporting a result".to_string()),
                ),
            };
            if let Err(err) = finalize {
                error!("failed to finalize run {} of {}: {}", run_id, task_label, err);
            }
        });
        Ok(())
    }
}

/// Start a run on behalf of an operator and hand it to the dispatcher.
///
/// A disabled task is rejected before any row is written. If dispatch
/// itself fails, the already-created run is finalized as failed so nothing
/// is left in `running`.
pub fn trigger_manually(
    store: &SqliteTaskStore,
    dispatcher: &dyn RunDispatcher,
    task_id: &str,
    initiating_user: &str,
) -> Result<TaskRun, TaskStoreError> {
    let task = store
        .get_task(task_id)?
        .ok_or_else(|| TaskStoreError::NotFound(format!("task {}", task_id)))?;
    if !task.is_enabled {
        return Err(TaskStoreError::Disabled(task_id.to_string()));
    }
    let run = store.start_run(task_id, Some(initiating_user))?;
    info!(
        "manual trigger of {} by {} started run {}",
        task_id, initiating_user, run.id
    );
    if let Err(err) = dispatcher.dispatch(&task, &run) {
        let message = err.to_string();
        let _ = store.complete_run(run.id, RunStatus::Failed, None, Some(message.clone()));
        return Err(TaskStoreError::Dispatch(message));
    }
    Ok(run)
}
