use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::store::BusinessDb;
use crate::JobError;

/// Daily activity snapshot assembled for administrators.
#[derive(Debug, Clone, Serialize)]
pub struct AdminDigest {
    pub active_sessions: usize,
    pub overdue_invoices: usize,
    pub open_quotes: usize,
}

/// Count the rows an administrator cares about at a glance.
pub fn build_admin_digest(db: &BusinessDb, now: DateTime<Utc>) -> Result<AdminDigest, JobError> {
    let conn = db.open()?;
    let active_sessions: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE expires_at > ?1 AND revoked = 0",
        params![now.to_rfc3339()],
        |row| row.get(0),
    )?;
    let overdue_invoices: i64 = conn.query_row(
        "SELECT COUNT(*) FROM invoices WHERE status = 'overdue'",
        [],
        |row| row.get(0),
    )?;
    let open_quotes: i64 = conn.query_row(
        "SELECT COUNT(*) FROM quotes WHERE status = 'open'",
        [],
        |row| row.get(0),
    )?;
    Ok(AdminDigest {
        active_sessions: active_sessions as usize,
        overdue_invoices: overdue_invoices as usize,
        open_quotes: open_quotes as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn digest_counts_match_seeded_rows() {
        let temp = TempDir::new().expect("tempdir");
        let db = BusinessDb::new(temp.path().join("business.db")).expect("db");
        let now = Utc::now();
        let conn = db.open().expect("open");
        conn.execute(
            "INSERT INTO sessions (id, user_id, expires_at, revoked) VALUES ('s1', 'u1', ?1, 0)",
            params![(now + Duration::hours(1)).to_rfc3339()],
        )
        .expect("session");
        conn.execute(
            "INSERT INTO invoices (id, status, due_date, total_cents)
             VALUES ('i1', 'overdue', ?1, 500)",
            params![(now - Duration::days(1)).to_rfc3339()],
        )
        .expect("invoice");
        conn.execute(
            "INSERT INTO quotes (id, status, valid_until) VALUES ('q1', 'open', ?1)",
            params![(now + Duration::days(1)).to_rfc3339()],
        )
        .expect("quote");

        let digest = build_admin_digest(&db, now).expect("digest");
        assert_eq!(digest.active_sessions, 1);
        assert_eq!(digest.overdue_invoices, 1);
        assert_eq!(digest.open_quotes, 1);
    }
}
