use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::task;
use tracing::error;
use uuid::Uuid;

use crate::tasks::{
    parse_category, parse_run_status, parse_schedule_type, sync_definitions, trigger_manually,
    TaskFilter, TaskStoreError, TaskUpdate,
};

use super::state::AppState;

const RECENT_RUNS: usize = 10;
const DEFAULT_PAGE_LIMIT: usize = 20;

pub(super) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListTasksParams {
    category: Option<String>,
    is_enabled: Option<bool>,
    schedule_type: Option<String>,
}

/// GET /tasks?category=&isEnabled=&scheduleType=
pub(super) async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListTasksParams>,
) -> Response {
    let mut filter = TaskFilter {
        is_enabled: params.is_enabled,
        ..TaskFilter::default()
    };
    if let Some(raw) = params.category.as_deref() {
        match parse_category(raw) {
            Ok(category) => filter.category = Some(category),
            Err(_) => return bad_request(&format!("unknown category {}", raw)),
        }
    }
    if let Some(raw) = params.schedule_type.as_deref() {
        match parse_schedule_type(raw) {
            Ok(schedule_type) => filter.schedule_type = Some(schedule_type),
            Err(_) => return bad_request(&format!("unknown schedule type {}", raw)),
        }
    }

    let store = state.store.clone();
    match task::spawn_blocking(move || store.list_tasks(&filter)).await {
        Ok(Ok(tasks)) => {
            let count = tasks.len();
            (
                StatusCode::OK,
                Json(json!({ "success": true, "data": tasks, "count": count })),
            )
                .into_response()
        }
        Ok(Err(err)) => error_response(&err),
        Err(err) => join_failure(err),
    }
}

/// GET /tasks/{id}: task detail plus recent runs and aggregate stats.
pub(super) async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    let store = state.store.clone();
    let outcome = task::spawn_blocking(move || -> Result<_, TaskStoreError> {
        let task = store.get_task(&task_id)?;
        match task {
            Some(task) => {
                let recent = store.list_runs(&task.function_id, RECENT_RUNS, 0, None)?;
                let stats = store.run_stats(&task.function_id)?;
                Ok(Some((task, recent, stats)))
            }
            None => Ok(None),
        }
    })
    .await;
    match outcome {
        Ok(Ok(Some((task, recent, stats)))) => {
            let mut data = match serde_json::to_value(&task) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            };
            data.insert("recentRuns".to_string(), json!(recent));
            data.insert("successRate".to_string(), json!(stats.success_rate));
            data.insert("avgDurationMs".to_string(), json!(stats.avg_duration_ms));
            data.insert("stats".to_string(), json!(stats));
            (
                StatusCode::OK,
                Json(json!({ "success": true, "data": data })),
            )
                .into_response()
        }
        Ok(Ok(None)) => not_found("Task not found"),
        Ok(Err(err)) => error_response(&err),
        Err(err) => join_failure(err),
    }
}

/// PUT /tasks/{id}: partial update of operator-controlled fields. Fields
/// outside `TaskUpdate` are dropped during deserialization, never applied.
pub(super) async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Result<Json<TaskUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let store = state.store.clone();
    match task::spawn_blocking(move || store.apply_update(&task_id, &update)).await {
        Ok(Ok(task)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": task })),
        )
            .into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(err) => join_failure(err),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExecuteBody {
    user_id: Option<String>,
}

/// POST /tasks/{id}/execute: manual trigger, audit-tagged with the user.
pub(super) async fn execute_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Result<Json<ExecuteBody>, JsonRejection>,
) -> Response {
    // The body is optional, but a body that fails to parse is a client
    // error, not an anonymous trigger.
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => ExecuteBody::default(),
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let user_id = body.user_id.unwrap_or_else(|| "unknown".to_string());
    let store = state.store.clone();
    let dispatcher = state.dispatcher.clone();
    let outcome =
        task::spawn_blocking(move || trigger_manually(&store, dispatcher.as_ref(), &task_id, &user_id))
            .await;
    match outcome {
        Ok(Ok(run)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": run,
                "message": "Task execution started"
            })),
        )
            .into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(err) => join_failure(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListRunsParams {
    limit: Option<usize>,
    offset: Option<usize>,
    status: Option<String>,
}

/// GET /tasks/{id}/executions?limit=&offset=&status=
pub(super) async fn list_executions(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(params): Query<ListRunsParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let status = match params.status.as_deref() {
        Some(raw) => match parse_run_status(raw) {
            Ok(status) => Some(status),
            Err(_) => return bad_request(&format!("unknown run status {}", raw)),
        },
        None => None,
    };

    let store = state.store.clone();
    let outcome = task::spawn_blocking(move || -> Result<_, TaskStoreError> {
        if store.get_task(&task_id)?.is_none() {
            return Err(TaskStoreError::NotFound(format!("task {}", task_id)));
        }
        let runs = store.list_runs(&task_id, limit, offset, status)?;
        let stats = store.run_stats(&task_id)?;
        Ok((runs, stats))
    })
    .await;
    match outcome {
        Ok(Ok((runs, stats))) => {
            let count = runs.len();
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "data": runs,
                    "stats": stats,
                    "pagination": { "limit": limit, "offset": offset, "count": count }
                })),
            )
                .into_response()
        }
        Ok(Err(err)) => error_response(&err),
        Err(err) => join_failure(err),
    }
}

/// GET /tasks/{id}/executions/{executionId}
pub(super) async fn get_execution(
    State(state): State<AppState>,
    Path((task_id, execution_id)): Path<(String, String)>,
) -> Response {
    let run_id = match Uuid::parse_str(&execution_id) {
        Ok(id) => id,
        Err(_) => return not_found("Execution not found"),
    };
    let store = state.store.clone();
    match task::spawn_blocking(move || store.get_run(run_id)).await {
        Ok(Ok(Some(run))) if run.task_id == task_id => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": run })),
        )
            .into_response(),
        Ok(Ok(_)) => not_found("Execution not found"),
        Ok(Err(err)) => error_response(&err),
        Err(err) => join_failure(err),
    }
}

/// POST /tasks/sync (and GET alias): reconcile the in-code catalogue
/// into the store.
pub(super) async fn sync_tasks(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    let definitions = state.definitions.clone();
    let code_version = state.code_version.clone();
    let outcome =
        task::spawn_blocking(move || sync_definitions(&store, &definitions, &code_version)).await;
    match outcome {
        Ok(Ok(report)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!(
                    "Synced {} task(s): {} created, {} updated",
                    report.synced, report.created, report.updated
                ),
                "data": report
            })),
        )
            .into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(err) => join_failure(err),
    }
}

fn error_response(err: &TaskStoreError) -> Response {
    let status = match err {
        TaskStoreError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskStoreError::Disabled(_) | TaskStoreError::Conflict(_) => StatusCode::CONFLICT,
        TaskStoreError::InvalidDefinition(_) | TaskStoreError::Cron(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {}", err);
    }
    (
        status,
        Json(json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

fn join_failure(err: task::JoinError) -> Response {
    error!("blocking task failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "internal error" })),
    )
        .into_response()
}
