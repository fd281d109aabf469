use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use tracing::info;

use crate::store::BusinessDb;
use crate::JobError;

/// Summary of a quote expiry sweep.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteSweep {
    pub expired: usize,
}

/// Flip open quotes past their validity window to expired.
pub fn expire_stale_quotes(db: &BusinessDb, now: DateTime<Utc>) -> Result<QuoteSweep, JobError> {
    let conn = db.open()?;
    let expired = conn.execute(
        "UPDATE quotes SET status = 'expired' WHERE status = 'open' AND valid_until < ?1",
        params![now.to_rfc3339()],
    )?;
    if expired > 0 {
        info!("quote sweep expired {} quote(s)", expired);
    }
    Ok(QuoteSweep { expired })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn seed_quote(db: &BusinessDb, id: &str, status: &str, valid_until: DateTime<Utc>) {
        let conn = db.open().expect("open");
        conn.execute(
            "INSERT INTO quotes (id, status, valid_until) VALUES (?1, ?2, ?3)",
            params![id, status, valid_until.to_rfc3339()],
        )
        .expect("insert quote");
    }

    #[test]
    fn expires_only_open_quotes_past_validity() {
        let temp = TempDir::new().expect("tempdir");
        let db = BusinessDb::new(temp.path().join("business.db")).expect("db");
        let now = Utc::now();

        seed_quote(&db, "stale", "open", now - Duration::days(1));
        seed_quote(&db, "accepted", "accepted", now - Duration::days(1));
        seed_quote(&db, "fresh", "open", now + Duration::days(1));

        let outcome = expire_stale_quotes(&db, now).expect("sweep");
        assert_eq!(outcome.expired, 1);

        let conn = db.open().expect("open");
        let status: String = conn
            .query_row("SELECT status FROM quotes WHERE id = 'stale'", [], |row| {
                row.get(0)
            })
            .expect("status");
        assert_eq!(status, "expired");
    }
}
