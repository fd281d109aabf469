pub mod registry;
pub mod service;

mod tasks;

pub use tasks::{
    merge_fields, sync_definitions, trigger_manually, HandlerRegistry, RunDispatcher, RunStats,
    RunStatus, ScheduleType, ScheduledTask, SqliteTaskStore, SyncReport, TaskCategory,
    TaskContext, TaskFilter, TaskHandler, TaskRun, TaskStoreError, TaskUpdate, ThreadDispatcher,
};
