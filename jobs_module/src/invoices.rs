use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use tracing::info;

use crate::store::BusinessDb;
use crate::JobError;

/// Summary of an overdue-invoice sweep.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceSweep {
    pub marked: usize,
}

/// Flip sent invoices past their due date to overdue.
///
/// Draft and paid invoices are never touched; only `sent` is eligible.
pub fn mark_overdue_invoices(
    db: &BusinessDb,
    now: DateTime<Utc>,
) -> Result<InvoiceSweep, JobError> {
    let conn = db.open()?;
    let marked = conn.execute(
        "UPDATE invoices SET status = 'overdue' WHERE status = 'sent' AND due_date < ?1",
        params![now.to_rfc3339()],
    )?;
    if marked > 0 {
        info!("invoice sweep marked {} invoice(s) overdue", marked);
    }
    Ok(InvoiceSweep { marked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn seed_invoice(db: &BusinessDb, id: &str, status: &str, due_date: DateTime<Utc>) {
        let conn = db.open().expect("open");
        conn.execute(
            "INSERT INTO invoices (id, status, due_date, total_cents) VALUES (?1, ?2, ?3, 1000)",
            params![id, status, due_date.to_rfc3339()],
        )
        .expect("insert invoice");
    }

    #[test]
    fn marks_only_sent_invoices_past_due() {
        let temp = TempDir::new().expect("tempdir");
        let db = BusinessDb::new(temp.path().join("business.db")).expect("db");
        let now = Utc::now();

        seed_invoice(&db, "late", "sent", now - Duration::days(3));
        seed_invoice(&db, "paid", "paid", now - Duration::days(3));
        seed_invoice(&db, "future", "sent", now + Duration::days(3));

        let outcome = mark_overdue_invoices(&db, now).expect("sweep");
        assert_eq!(outcome.marked, 1);

        let conn = db.open().expect("open");
        let status: String = conn
            .query_row(
                "SELECT status FROM invoices WHERE id = 'late'",
                [],
                |row| row.get(0),
            )
            .expect("status");
        assert_eq!(status, "overdue");
        let untouched: String = conn
            .query_row(
                "SELECT status FROM invoices WHERE id = 'paid'",
                [],
                |row| row.get(0),
            )
            .expect("status");
        assert_eq!(untouched, "paid");
    }
}
