mod dispatch;
mod handler;
mod store;
mod sync;
mod types;
mod utils;

pub use dispatch::{trigger_manually, RunDispatcher, ThreadDispatcher};
pub use handler::{HandlerRegistry, TaskContext, TaskHandler};
pub use store::SqliteTaskStore;
pub use sync::{merge_fields, sync_definitions};
pub use types::{
    RunStats, RunStatus, ScheduleType, ScheduledTask, SyncReport, TaskCategory, TaskFilter,
    TaskRun, TaskStoreError, TaskUpdate,
};

pub(crate) use utils::{parse_category, parse_run_status, parse_schedule_type};

#[cfg(test)]
mod tests;
