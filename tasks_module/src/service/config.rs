use std::env;
use std::path::PathBuf;

use super::BoxError;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Task configuration + run history database.
    pub tasks_db_path: PathBuf,
    /// Business database the built-in jobs sweep over.
    pub business_db_path: PathBuf,
    /// Provenance string stamped onto synced rows.
    pub code_version: String,
    /// Reconcile the definition catalogue into the store on startup.
    pub sync_on_start: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("TASKS_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("TASKS_SERVICE_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(9020);
        let tasks_db_path = env::var("TASKS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data").join("tasks.db"));
        let business_db_path = env::var("BUSINESS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data").join("business.db"));
        let code_version = env::var("CODE_VERSION")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
        let sync_on_start = env::var("SYNC_ON_START")
            .ok()
            .and_then(|value| value.parse::<bool>().ok())
            .unwrap_or(true);

        Ok(Self {
            host,
            port,
            tasks_db_path,
            business_db_path,
            code_version,
            sync_on_start,
        })
    }
}
