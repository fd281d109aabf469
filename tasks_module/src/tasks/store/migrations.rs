use rusqlite::Connection;
use std::collections::HashSet;

use super::super::types::TaskStoreError;

pub(super) fn ensure_task_runs_columns(conn: &Connection) -> Result<(), TaskStoreError> {
    let mut stmt = conn.prepare("PRAGMA table_info(task_runs)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }

    // Audit column for manual triggers; added after the table first shipped.
    if !columns.contains("triggered_by") {
        conn.execute("ALTER TABLE task_runs ADD COLUMN triggered_by TEXT", [])?;
    }
    Ok(())
}
