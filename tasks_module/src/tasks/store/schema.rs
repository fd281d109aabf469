pub(super) const TASKS_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS scheduled_tasks (
    function_id TEXT PRIMARY KEY,
    function_name TEXT NOT NULL,
    description TEXT NOT NULL,
    schedule_type TEXT NOT NULL,
    cron_schedule TEXT,
    event_name TEXT,
    category TEXT NOT NULL,
    is_enabled INTEGER NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0,
    concurrency_limit INTEGER NOT NULL DEFAULT 1,
    timeout_ms INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    code_version TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_runs (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL REFERENCES scheduled_tasks(function_id) ON DELETE CASCADE,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    output TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_task_runs_task_started
    ON task_runs (task_id, started_at);
"#;
