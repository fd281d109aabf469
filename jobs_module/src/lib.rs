//! Built-in background jobs for the admin dashboard.
//!
//! Each job is a plain function over the business database: the scheduler
//! crate decides when to call it and records the outcome; this crate only
//! applies the row changes and reports what it touched.

mod digest;
mod invoices;
mod quotes;
mod sessions;
mod store;

pub use digest::{build_admin_digest, AdminDigest};
pub use invoices::{mark_overdue_invoices, InvoiceSweep};
pub use quotes::{expire_stale_quotes, QuoteSweep};
pub use sessions::{cleanup_expired_sessions, SessionCleanup};
pub use store::BusinessDb;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
