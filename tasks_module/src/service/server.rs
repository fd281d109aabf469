use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::registry::{builtin_definitions, validate_definitions};
use crate::tasks::{
    sync_definitions, HandlerRegistry, SqliteTaskStore, TaskContext, TaskStoreError,
    ThreadDispatcher,
};

use super::config::ServiceConfig;
use super::state::AppState;
use super::tasks::{
    execute_task, get_execution, get_task, health, list_executions, list_tasks, sync_tasks,
    update_task,
};
use super::BoxError;

/// Bind each built-in definition id to the job code that serves it.
fn builtin_handler_registry(business_db: jobs_module::BusinessDb) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    {
        let db = business_db.clone();
        registry.register(
            "cleanup-sessions",
            Arc::new(move |_ctx: &TaskContext| -> Result<serde_json::Value, TaskStoreError> {
                let summary = jobs_module::cleanup_expired_sessions(&db, Utc::now())
                    .map_err(|err| TaskStoreError::Storage(err.to_string()))?;
                Ok(serde_json::to_value(summary)?)
            }),
        );
    }
    {
        let db = business_db.clone();
        registry.register(
            "invoice-overdue-check",
            Arc::new(move |_ctx: &TaskContext| -> Result<serde_json::Value, TaskStoreError> {
                let summary = jobs_module::mark_overdue_invoices(&db, Utc::now())
                    .map_err(|err| TaskStoreError::Storage(err.to_string()))?;
                Ok(serde_json::to_value(summary)?)
            }),
        );
    }
    {
        let db = business_db.clone();
        registry.register(
            "quote-expiry-check",
            Arc::new(move |_ctx: &TaskContext| -> Result<serde_json::Value, TaskStoreError> {
                let summary = jobs_module::expire_stale_quotes(&db, Utc::now())
                    .map_err(|err| TaskStoreError::Storage(err.to_string()))?;
                Ok(serde_json::to_value(summary)?)
            }),
        );
    }
    registry.register(
        "daily-admin-digest",
        Arc::new(move |_ctx: &TaskContext| -> Result<serde_json::Value, TaskStoreError> {
            let digest = jobs_module::build_admin_digest(&business_db, Utc::now())
                .map_err(|err| TaskStoreError::Storage(err.to_string()))?;
            Ok(serde_json::to_value(digest)?)
        }),
    );
    registry
}

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let definitions = builtin_definitions();
    validate_definitions(&definitions)?;

    let store = SqliteTaskStore::new(&config.tasks_db_path)?;
    let business_db = jobs_module::BusinessDb::new(&config.business_db_path)?;
    let registry = Arc::new(builtin_handler_registry(business_db));
    let dispatcher = Arc::new(ThreadDispatcher::new(store.clone(), registry));

    if config.sync_on_start {
        match sync_definitions(&store, &definitions, &config.code_version) {
            Ok(report) => info!(
                "startup sync: {} task(s) ({} created, {} updated)",
                report.synced, report.created, report.updated
            ),
            // Sync is idempotent; a partial failure here is reconciled by
            // the next POST /tasks/sync.
            Err(err) => warn!("startup sync failed: {}", err),
        }
    }

    let state = AppState {
        store,
        dispatcher,
        definitions: Arc::new(definitions),
        code_version: config.code_version.clone(),
    };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("task service listening on {}", addr);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/tasks", get(list_tasks))
        .route("/tasks/sync", post(sync_tasks).get(sync_tasks))
        .route("/tasks/:id", get(get_task).put(update_task))
        .route("/tasks/:id/execute", post(execute_task))
        .route("/tasks/:id/executions", get(list_executions))
        .route("/tasks/:id/executions/:execution_id", get(get_execution))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
