use std::collections::HashMap;
use std::sync::Arc;

use super::types::TaskStoreError;

/// What a handler gets to know about the run it is serving.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub run_id: uuid::Uuid,
    pub triggered_by: Option<String>,
}

/// Executable side of a task definition. The definition describes when a
/// task should run; the handler is the capability that runs it, returning
/// a JSON summary stored as the run output.
pub trait TaskHandler: Send + Sync {
    fn invoke(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskStoreError>;
}

impl<F> TaskHandler for F
where
    F: Fn(&TaskContext) -> Result<serde_json::Value, TaskStoreError> + Send + Sync,
{
    fn invoke(&self, ctx: &TaskContext) -> Result<serde_json::Value, TaskStoreError> {
        self(ctx)
    }
}

/// Lookup from definition id to handler. This is the single adapter
/// boundary the job engine integration goes through.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_id: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_id.into(), handler);
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_id).cloned()
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}
