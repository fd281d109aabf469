use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a task gets triggered: a cron expression, a dashboard event, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Cron,
    Event,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Maintenance,
    Billing,
    Notifications,
}

/// Lifecycle of a single run: `running` is the only initial state, the
/// other three are terminal with no outbound transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Persisted task configuration row: a mirror of a code-defined task
/// definition plus operator overrides.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub function_id: String,
    pub function_name: String,
    pub description: String,
    pub schedule_type: ScheduleType,
    pub cron_schedule: Option<String>,
    pub event_name: Option<String>,
    pub category: TaskCategory,
    pub is_enabled: bool,
    pub retries: u32,
    pub concurrency_limit: u32,
    pub timeout_ms: u64,
    pub metadata: serde_json::Value,
    pub code_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One invocation attempt of a task. Created once when the run starts,
/// finalized at most once when it completes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub id: Uuid,
    pub task_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub triggered_by: Option<String>,
}

/// Listing filters; absent fields apply no constraint, present ones AND.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub category: Option<TaskCategory>,
    pub is_enabled: Option<bool>,
    pub schedule_type: Option<ScheduleType>,
}

/// Operator-editable fields of a task row. Identity and definition-derived
/// fields are deliberately absent, so a partial update can never touch them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub is_enabled: Option<bool>,
    pub cron_schedule: Option<String>,
    pub retries: Option<u32>,
    pub concurrency_limit: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub created: usize,
    pub updated: usize,
}

/// Aggregated run history for one task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub total_runs: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Percentage of all recorded runs that succeeded.
    pub success_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("uuid parse error: {0}")]
    UuidParse(#[from] uuid::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cron parse error: {0}")]
    Cron(#[from] cron::error::Error),
    #[error("invalid task definition: {0}")]
    InvalidDefinition(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("task {0} is disabled")]
    Disabled(String),
    #[error("{0}")]
    Conflict(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("storage error: {0}")]
    Storage(String),
}
