use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use tracing::info;

use crate::store::BusinessDb;
use crate::JobError;

/// Summary of a session cleanup sweep, stored as the run output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCleanup {
    pub deleted: usize,
}

/// Delete sessions that have expired or were revoked.
pub fn cleanup_expired_sessions(
    db: &BusinessDb,
    now: DateTime<Utc>,
) -> Result<SessionCleanup, JobError> {
    let conn = db.open()?;
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1 OR revoked = 1",
        params![now.to_rfc3339()],
    )?;
    if deleted > 0 {
        info!("session cleanup removed {} session(s)", deleted);
    }
    Ok(SessionCleanup { deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn seed_session(db: &BusinessDb, id: &str, expires_at: DateTime<Utc>, revoked: bool) {
        let conn = db.open().expect("open");
        conn.execute(
            "INSERT INTO sessions (id, user_id, expires_at, revoked) VALUES (?1, ?2, ?3, ?4)",
            params![id, "user-1", expires_at.to_rfc3339(), revoked as i64],
        )
        .expect("insert session");
    }

    #[test]
    fn removes_expired_and_revoked_sessions_only() {
        let temp = TempDir::new().expect("tempdir");
        let db = BusinessDb::new(temp.path().join("business.db")).expect("db");
        let now = Utc::now();

        seed_session(&db, "expired", now - Duration::hours(1), false);
        seed_session(&db, "revoked", now + Duration::hours(1), true);
        seed_session(&db, "live", now + Duration::hours(1), false);

        let outcome = cleanup_expired_sessions(&db, now).expect("cleanup");
        assert_eq!(outcome.deleted, 2);

        let conn = db.open().expect("open");
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(remaining, 1);
    }
}
