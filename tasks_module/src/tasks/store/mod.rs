use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use super::types::{
    RunStats, RunStatus, ScheduledTask, TaskFilter, TaskRun, TaskStoreError, TaskUpdate,
};
use super::utils::{
    bool_to_int, category_label, format_datetime, parse_category, parse_datetime,
    parse_json_column, parse_optional_datetime, parse_run_status, parse_schedule_type,
    run_status_label, schedule_type_label,
};

mod migrations;
mod schema;

use migrations::ensure_task_runs_columns;
use schema::TASKS_SCHEMA;

const TASK_COLUMNS: &str = "function_id, function_name, description, schedule_type, \
     cron_schedule, event_name, category, is_enabled, retries, concurrency_limit, \
     timeout_ms, metadata, code_version, created_at, updated_at";

const RUN_COLUMNS: &str =
    "id, task_id, status, started_at, completed_at, output, error, triggered_by";

/// SQLite-backed store for task configuration rows and execution runs.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    path: PathBuf,
}

impl SqliteTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, TaskStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, TaskStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(TASKS_SCHEMA)?;
        ensure_task_runs_columns(&conn)?;
        Ok(conn)
    }

    pub fn get_task(&self, function_id: &str) -> Result<Option<ScheduledTask>, TaskStoreError> {
        let conn = self.open()?;
        self.get_task_with_conn(&conn, function_id)
    }

    fn get_task_with_conn(
        &self,
        conn: &Connection,
        function_id: &str,
    ) -> Result<Option<ScheduledTask>, TaskStoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM scheduled_tasks WHERE function_id = ?1", TASK_COLUMNS),
                params![function_id],
                task_row_tuple,
            )
            .optional()?;
        row.map(task_from_tuple).transpose()
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<ScheduledTask>, TaskStoreError> {
        let conn = self.open()?;
        let mut clauses: Vec<&str> = Vec::new();
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(category) = filter.category {
            clauses.push("category = ?");
            bind.push(category_label(category).to_string().into());
        }
        if let Some(is_enabled) = filter.is_enabled {
            clauses.push("is_enabled = ?");
            bind.push(bool_to_int(is_enabled).into());
        }
        if let Some(schedule_type) = filter.schedule_type {
            clauses.push("schedule_type = ?");
            bind.push(schedule_type_label(schedule_type).to_string().into());
        }
        let mut sql = format!("SELECT {} FROM scheduled_tasks", TASK_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY function_id");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), task_row_tuple)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_tuple(row?)?);
        }
        Ok(tasks)
    }

    pub(crate) fn insert_task(&self, task: &ScheduledTask) -> Result<(), TaskStoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO scheduled_tasks (function_id, function_name, description, schedule_type,
                 cron_schedule, event_name, category, is_enabled, retries, concurrency_limit,
                 timeout_ms, metadata, code_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                task.function_id,
                task.function_name,
                task.description,
                schedule_type_label(task.schedule_type),
                task.cron_schedule,
                task.event_name,
                category_label(task.category),
                bool_to_int(task.is_enabled),
                task.retries,
                task.concurrency_limit,
                task.timeout_ms,
                task.metadata.to_string(),
                task.code_version,
                format_datetime(task.created_at),
                format_datetime(task.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Overwrite a task row with a freshly merged state (sync path).
    pub(crate) fn update_task_row(&self, task: &ScheduledTask) -> Result<(), TaskStoreError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE scheduled_tasks
             SET function_name = ?2,
                 description = ?3,
                 schedule_type = ?4,
                 cron_schedule = ?5,
                 event_name = ?6,
                 category = ?7,
                 is_enabled = ?8,
                 retries = ?9,
                 concurrency_limit = ?10,
                 timeout_ms = ?11,
                 metadata = ?12,
                 code_version = ?13,
                 updated_at = ?14
             WHERE function_id = ?1",
            params![
                task.function_id,
                task.function_name,
                task.description,
                schedule_type_label(task.schedule_type),
                task.cron_schedule,
                task.event_name,
                category_label(task.category),
                bool_to_int(task.is_enabled),
                task.retries,
                task.concurrency_limit,
                task.timeout_ms,
                task.metadata.to_string(),
                task.code_version,
                format_datetime(task.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(TaskStoreError::NotFound(format!(
                "task {}",
                task.function_id
            )));
        }
        Ok(())
    }

    /// Apply an operator update to the mutable fields of a task row.
    ///
    /// The update struct only carries operator-controlled fields, so identity
    /// and definition-derived columns cannot be reached from here.
    pub fn apply_update(
        &self,
        function_id: &str,
        update: &TaskUpdate,
    ) -> Result<ScheduledTask, TaskStoreError> {
        let conn = self.open()?;
        let mut task = self
            .get_task_with_conn(&conn, function_id)?
            .ok_or_else(|| TaskStoreError::NotFound(format!("task {}", function_id)))?;

        if let Some(is_enabled) = update.is_enabled {
            task.is_enabled = is_enabled;
        }
        if let Some(cron_schedule) = &update.cron_schedule {
            crate::registry::validate_cron(cron_schedule)?;
            task.cron_schedule = Some(cron_schedule.clone());
        }
        if let Some(retries) = update.retries {
            task.retries = retries;
        }
        if let Some(concurrency_limit) = update.concurrency_limit {
            task.concurrency_limit = concurrency_limit;
        }
        if let Some(timeout_ms) = update.timeout_ms {
            task.timeout_ms = timeout_ms;
        }
        if let Some(metadata) = &update.metadata {
            task.metadata = metadata.clone();
        }
        task.updated_at = Utc::now();

        conn.execute(
            "UPDATE scheduled_tasks
             SET is_enabled = ?2,
                 cron_schedule = ?3,
                 retries = ?4,
                 concurrency_limit = ?5,
                 timeout_ms = ?6,
                 metadata = ?7,
                 updated_at = ?8
             WHERE function_id = ?1",
            params![
                function_id,
                bool_to_int(task.is_enabled),
                task.cron_schedule,
                task.retries,
                task.concurrency_limit,
                task.timeout_ms,
                task.metadata.to_string(),
                format_datetime(task.updated_at),
            ],
        )?;
        Ok(task)
    }

    /// Record the start of a run: `running`, no completion timestamp yet.
    pub fn start_run(
        &self,
        task_id: &str,
        triggered_by: Option<&str>,
    ) -> Result<TaskRun, TaskStoreError> {
        let conn = self.open()?;
        let run = TaskRun {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
            triggered_by: triggered_by.map(|value| value.to_string()),
        };
        conn.execute(
            "INSERT INTO task_runs (id, task_id, status, started_at, triggered_by)
             VALUES (?1, ?2, 'running', ?3, ?4)",
            params![
                run.id.to_string(),
                run.task_id,
                format_datetime(run.started_at),
                run.triggered_by,
            ],
        )?;
        Ok(run)
    }

    /// Finalize a run. The update is conditional on the row still being
    /// `running`, so two racing completion callbacks cannot both win; the
    /// loser gets a Conflict.
    pub fn complete_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<TaskRun, TaskStoreError> {
        if !status.is_terminal() {
            return Err(TaskStoreError::Conflict(format!(
                "run {} cannot be completed back into running",
                run_id
            )));
        }
        let conn = self.open()?;
        let completed_at = Utc::now();
        let changed = conn.execute(
            "UPDATE task_runs
             SET status = ?2,
                 completed_at = ?3,
                 output = ?4,
                 error = ?5
             WHERE id = ?1 AND status = 'running'",
            params![
                run_id.to_string(),
                run_status_label(status),
                format_datetime(completed_at),
                output.as_ref().map(|value| value.to_string()),
                error,
            ],
        )?;
        if changed == 0 {
            return match self.get_run_with_conn(&conn, run_id)? {
                Some(_) => Err(TaskStoreError::Conflict(format!(
                    "run {} is already completed",
                    run_id
                ))),
                None => Err(TaskStoreError::NotFound(format!("run {}", run_id))),
            };
        }
        self.get_run_with_conn(&conn, run_id)?
            .ok_or_else(|| TaskStoreError::NotFound(format!("run {}", run_id)))
    }

    pub fn get_run(&self, run_id: Uuid) -> Result<Option<TaskRun>, TaskStoreError> {
        let conn = self.open()?;
        self.get_run_with_conn(&conn, run_id)
    }

    fn get_run_with_conn(
        &self,
        conn: &Connection,
        run_id: Uuid,
    ) -> Result<Option<TaskRun>, TaskStoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM task_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id.to_string()],
                run_row_tuple,
            )
            .optional()?;
        row.map(run_from_tuple).transpose()
    }

    /// Run history for a task, newest first.
    pub fn list_runs(
        &self,
        task_id: &str,
        limit: usize,
        offset: usize,
        status: Option<RunStatus>,
    ) -> Result<Vec<TaskRun>, TaskStoreError> {
        let conn = self.open()?;
        let mut sql = format!("SELECT {} FROM task_runs WHERE task_id = ?", RUN_COLUMNS);
        let mut bind: Vec<rusqlite::types::Value> = vec![task_id.to_string().into()];
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            bind.push(run_status_label(status).to_string().into());
        }
        sql.push_str(" ORDER BY started_at DESC, id DESC LIMIT ? OFFSET ?");
        bind.push((limit as i64).into());
        bind.push((offset as i64).into());

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), run_row_tuple)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(run_from_tuple(row?)?);
        }
        Ok(runs)
    }

    /// Aggregate run history for a task.
    pub fn run_stats(&self, task_id: &str) -> Result<RunStats, TaskStoreError> {
        let conn = self.open()?;
        let (total, success, failure, last_run_raw): (i64, i64, i64, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*),
                        SUM(CASE WHEN status = 'succeeded' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN status IN ('failed', 'timed_out') THEN 1 ELSE 0 END),
                        MAX(started_at)
                 FROM task_runs WHERE task_id = ?1",
                params![task_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )?;
        let avg_duration_ms: Option<f64> = conn.query_row(
            "SELECT AVG((julianday(completed_at) - julianday(started_at)) * 86400000.0)
             FROM task_runs WHERE task_id = ?1 AND completed_at IS NOT NULL",
            params![task_id],
            |row| row.get(0),
        )?;
        let success_rate = if total > 0 {
            (success as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Ok(RunStats {
            total_runs: total as usize,
            success_count: success as usize,
            failure_count: failure as usize,
            success_rate,
            avg_duration_ms,
            last_run_at: parse_optional_datetime(last_run_raw.as_deref())?,
        })
    }
}

type TaskRowTuple = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    i64,
    u32,
    u32,
    u64,
    Option<String>,
    String,
    String,
    String,
);

fn task_row_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRowTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
    ))
}

fn task_from_tuple(tuple: TaskRowTuple) -> Result<ScheduledTask, TaskStoreError> {
    let (
        function_id,
        function_name,
        description,
        schedule_type_raw,
        cron_schedule,
        event_name,
        category_raw,
        is_enabled_raw,
        retries,
        concurrency_limit,
        timeout_ms,
        metadata_raw,
        code_version,
        created_at_raw,
        updated_at_raw,
    ) = tuple;
    Ok(ScheduledTask {
        function_id,
        function_name,
        description,
        schedule_type: parse_schedule_type(&schedule_type_raw)?,
        cron_schedule,
        event_name,
        category: parse_category(&category_raw)?,
        is_enabled: is_enabled_raw != 0,
        retries,
        concurrency_limit,
        timeout_ms,
        metadata: parse_json_column(metadata_raw)
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
        code_version,
        created_at: parse_datetime(&created_at_raw)?,
        updated_at: parse_datetime(&updated_at_raw)?,
    })
}

type RunRowTuple = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn run_row_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRowTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn run_from_tuple(tuple: RunRowTuple) -> Result<TaskRun, TaskStoreError> {
    let (id_raw, task_id, status_raw, started_at_raw, completed_at_raw, output_raw, error, triggered_by) =
        tuple;
    Ok(TaskRun {
        id: Uuid::parse_str(&id_raw)?,
        task_id,
        status: parse_run_status(&status_raw)?,
        started_at: parse_datetime(&started_at_raw)?,
        completed_at: parse_optional_datetime(completed_at_raw.as_deref())?,
        output: parse_json_column(output_raw),
        error,
        triggered_by,
    })
}
