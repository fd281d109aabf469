use std::sync::Arc;

use crate::registry::TaskDefinition;
use crate::tasks::{RunDispatcher, SqliteTaskStore};

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) store: SqliteTaskStore,
    pub(super) dispatcher: Arc<dyn RunDispatcher>,
    pub(super) definitions: Arc<Vec<TaskDefinition>>,
    pub(super) code_version: String,
}
