use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::JobError;

const BUSINESS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    revoked INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS invoices (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    due_date TEXT NOT NULL,
    total_cents INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS quotes (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    valid_until TEXT NOT NULL
);
"#;

/// Handle to the business database the maintenance jobs sweep over.
///
/// Opens a fresh connection per call, same as the other stores in this
/// workspace; the busy timeout covers concurrent job runs.
#[derive(Debug, Clone)]
pub struct BusinessDb {
    path: PathBuf,
}

impl BusinessDb {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, JobError> {
        let db = Self { path: path.into() };
        let _ = db.open()?;
        Ok(db)
    }

    pub(crate) fn open(&self) -> Result<Connection, JobError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(BUSINESS_SCHEMA)?;
        Ok(conn)
    }
}
