use std::thread;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use crate::registry::{ScheduleSpec, TaskDefinition};

use super::{
    merge_fields, sync_definitions, trigger_manually, RunDispatcher, RunStatus, ScheduleType,
    ScheduledTask, SqliteTaskStore, TaskCategory, TaskFilter, TaskRun, TaskStoreError, TaskUpdate,
};

struct NoopDispatcher;

impl RunDispatcher for NoopDispatcher {
    fn dispatch(&self, _task: &ScheduledTask, _run: &TaskRun) -> Result<(), TaskStoreError> {
        Ok(())
    }
}

struct FailingDispatcher;

impl RunDispatcher for FailingDispatcher {
    fn dispatch(&self, _task: &ScheduledTask, _run: &TaskRun) -> Result<(), TaskStoreError> {
        Err(TaskStoreError::Dispatch("engine unreachable".to_string()))
    }
}

fn cron_definition(id: &str) -> TaskDefinition {
    TaskDefinition {
        id: id.to_string(),
        name: format!("{} task", id),
        description: "test definition".to_string(),
        category: TaskCategory::Maintenance,
        schedule: ScheduleSpec {
            cron: Some("0 0 * * *".to_string()),
            event: None,
            timezone: "UTC".to_string(),
            enabled: true,
        },
        timeout_secs: 30,
        retries: 2,
        concurrency_limit: 1,
        metadata: serde_json::Map::new(),
    }
}

fn store_with_task(temp: &TempDir, id: &str) -> SqliteTaskStore {
    let store = SqliteTaskStore::new(temp.path().join("tasks.db")).expect("store");
    sync_definitions(&store, &[cron_definition(id)], "test-1").expect("sync");
    store
}

#[test]
fn first_sync_creates_row_with_derived_schedule_type() {
    let temp = TempDir::new().expect("tempdir");
    let store = SqliteTaskStore::new(temp.path().join("tasks.db")).expect("store");

    let report =
        sync_definitions(&store, &[cron_definition("cleanup-sessions")], "v1").expect("sync");
    assert_eq!(report.synced, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 0);

    let task = store
        .get_task("cleanup-sessions")
        .expect("get")
        .expect("row exists");
    assert_eq!(task.schedule_type, ScheduleType::Cron);
    assert_eq!(task.cron_schedule.as_deref(), Some("0 0 * * *"));
    assert_eq!(task.event_name, None);
    assert_eq!(task.timeout_ms, 30_000);
    assert_eq!(task.code_version, "v1");
    assert!(task.is_enabled);
}

#[test]
fn hybrid_schedule_type_requires_both_cron_and_event() {
    let temp = TempDir::new().expect("tempdir");
    let store = SqliteTaskStore::new(temp.path().join("tasks.db")).expect("store");

    let mut definition = cron_definition("hybrid-task");
    definition.schedule.event = Some("billing/invoice.due".to_string());
    sync_definitions(&store, &[definition], "v1").expect("sync");

    let task = store.get_task("hybrid-task").expect("get").expect("row");
    assert_eq!(task.schedule_type, ScheduleType::Hybrid);

    let mut definition = cron_definition("event-task");
    definition.schedule.cron = None;
    definition.schedule.event = Some("admin/digest.requested".to_string());
    sync_definitions(&store, &[definition], "v1").expect("sync");

    let task = store.get_task("event-task").expect("get").expect("row");
    assert_eq!(task.schedule_type, ScheduleType::Event);
    assert_eq!(task.cron_schedule, None);
}

#[test]
fn resync_preserves_operator_enabled_override() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    store
        .apply_update(
            "cleanup-sessions",
            &TaskUpdate {
                is_enabled: Some(false),
                ..TaskUpdate::default()
            },
        )
        .expect("disable");

    let report =
        sync_definitions(&store, &[cron_definition("cleanup-sessions")], "v2").expect("resync");
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 1);

    let task = store.get_task("cleanup-sessions").expect("get").expect("row");
    assert!(!task.is_enabled, "sync must never re-enable a task");
    assert_eq!(task.code_version, "v2");
}

#[test]
fn merge_fields_keeps_created_at_and_enabled_from_existing_row() {
    let definition = cron_definition("cleanup-sessions");
    let initial = merge_fields(None, &definition, "v1");
    assert!(initial.is_enabled);

    let mut disabled = initial.clone();
    disabled.is_enabled = false;
    let merged = merge_fields(Some(&disabled), &definition, "v2");
    assert!(!merged.is_enabled);
    assert_eq!(merged.created_at, disabled.created_at);
    assert_eq!(merged.code_version, "v2");
}

#[test]
fn update_body_with_identity_fields_only_applies_operator_fields() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    // scheduleType and functionId are not part of TaskUpdate, so serde
    // drops them; only isEnabled survives deserialization.
    let update: TaskUpdate = serde_json::from_value(json!({
        "scheduleType": "event",
        "functionId": "something-else",
        "isEnabled": false
    }))
    .expect("deserialize update");
    assert!(update.cron_schedule.is_none());

    let task = store.apply_update("cleanup-sessions", &update).expect("update");
    assert!(!task.is_enabled);
    assert_eq!(task.schedule_type, ScheduleType::Cron);
    assert_eq!(task.function_id, "cleanup-sessions");
}

#[test]
fn update_with_invalid_cron_is_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let result = store.apply_update(
        "cleanup-sessions",
        &TaskUpdate {
            cron_schedule: Some("not a cron".to_string()),
            ..TaskUpdate::default()
        },
    );
    assert!(matches!(result, Err(TaskStoreError::Cron(_))));

    // The row keeps its previous schedule.
    let task = store.get_task("cleanup-sessions").expect("get").expect("row");
    assert_eq!(task.cron_schedule.as_deref(), Some("0 0 * * *"));

    let task = store
        .apply_update(
            "cleanup-sessions",
            &TaskUpdate {
                cron_schedule: Some("30 6 * * *".to_string()),
                ..TaskUpdate::default()
            },
        )
        .expect("valid five-field cron");
    assert_eq!(task.cron_schedule.as_deref(), Some("30 6 * * *"));
}

#[test]
fn update_unknown_task_is_not_found() {
    let temp = TempDir::new().expect("tempdir");
    let store = SqliteTaskStore::new(temp.path().join("tasks.db")).expect("store");

    let result = store.apply_update("missing", &TaskUpdate::default());
    assert!(matches!(result, Err(TaskStoreError::NotFound(_))));
}

#[test]
fn list_tasks_ands_filters_together() {
    let temp = TempDir::new().expect("tempdir");
    let store = SqliteTaskStore::new(temp.path().join("tasks.db")).expect("store");

    let mut billing = cron_definition("invoice-overdue-check");
    billing.category = TaskCategory::Billing;
    sync_definitions(
        &store,
        &[cron_definition("cleanup-sessions"), billing],
        "v1",
    )
    .expect("sync");
    store
        .apply_update(
            "invoice-overdue-check",
            &TaskUpdate {
                is_enabled: Some(false),
                ..TaskUpdate::default()
            },
        )
        .expect("disable");

    let all = store.list_tasks(&TaskFilter::default()).expect("list");
    assert_eq!(all.len(), 2);

    let filter = TaskFilter {
        category: Some(TaskCategory::Billing),
        is_enabled: Some(false),
        schedule_type: None,
    };
    let filtered = store.list_tasks(&filter).expect("list filtered");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].function_id, "invoice-overdue-check");

    let filter = TaskFilter {
        category: Some(TaskCategory::Billing),
        is_enabled: Some(true),
        schedule_type: None,
    };
    assert!(store.list_tasks(&filter).expect("list empty").is_empty());
}

#[test]
fn complete_run_twice_rejects_the_second_caller() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let run = store.start_run("cleanup-sessions", None).expect("start");
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.completed_at.is_none());

    let completed = store
        .complete_run(run.id, RunStatus::Succeeded, Some(json!({"deleted": 3})), None)
        .expect("first completion");
    assert_eq!(completed.status, RunStatus::Succeeded);
    let first_completed_at = completed.completed_at.expect("completed_at set");

    let second = store.complete_run(run.id, RunStatus::Failed, None, Some("late".to_string()));
    assert!(matches!(second, Err(TaskStoreError::Conflict(_))));

    let stored = store.get_run(run.id).expect("get").expect("row");
    assert_eq!(stored.status, RunStatus::Succeeded);
    assert_eq!(stored.completed_at, Some(first_completed_at));
}

#[test]
fn complete_run_rejects_running_as_target_status() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");
    let run = store.start_run("cleanup-sessions", None).expect("start");

    let result = store.complete_run(run.id, RunStatus::Running, None, None);
    assert!(matches!(result, Err(TaskStoreError::Conflict(_))));
}

#[test]
fn complete_unknown_run_is_not_found() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let result = store.complete_run(uuid::Uuid::new_v4(), RunStatus::Succeeded, None, None);
    assert!(matches!(result, Err(TaskStoreError::NotFound(_))));
}

#[test]
fn list_runs_pages_newest_first() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let mut run_ids = Vec::new();
    for _ in 0..3 {
        run_ids.push(store.start_run("cleanup-sessions", None).expect("start").id);
        // Distinct started_at timestamps for a deterministic order.
        thread::sleep(Duration::from_millis(5));
    }

    let page = store
        .list_runs("cleanup-sessions", 2, 0, None)
        .expect("first page");
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, run_ids[2]);
    assert_eq!(page[1].id, run_ids[1]);

    let rest = store
        .list_runs("cleanup-sessions", 2, 2, None)
        .expect("second page");
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, run_ids[0]);
}

#[test]
fn list_runs_filters_by_status() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let ok_run = store.start_run("cleanup-sessions", None).expect("start");
    store
        .complete_run(ok_run.id, RunStatus::Succeeded, None, None)
        .expect("complete");
    let failed_run = store.start_run("cleanup-sessions", None).expect("start");
    store
        .complete_run(failed_run.id, RunStatus::Failed, None, Some("boom".to_string()))
        .expect("complete");

    let failed = store
        .list_runs("cleanup-sessions", 10, 0, Some(RunStatus::Failed))
        .expect("list failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, failed_run.id);
    assert_eq!(failed[0].error.as_deref(), Some("boom"));
}

#[test]
fn run_stats_aggregates_success_rate() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    for status in [RunStatus::Succeeded, RunStatus::Succeeded, RunStatus::Failed] {
        let run = store.start_run("cleanup-sessions", None).expect("start");
        store
            .complete_run(run.id, status, None, None)
            .expect("complete");
        thread::sleep(Duration::from_millis(5));
    }

    let stats = store.run_stats("cleanup-sessions").expect("stats");
    assert_eq!(stats.total_runs, 3);
    assert_eq!(stats.success_count, 2);
    assert_eq!(stats.failure_count, 1);
    assert!((stats.success_rate - 66.666).abs() < 0.1);
    assert!(stats.last_run_at.is_some());
    assert!(stats.avg_duration_ms.is_some());
}

#[test]
fn run_stats_on_empty_history_is_zeroed() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let stats = store.run_stats("cleanup-sessions").expect("stats");
    assert_eq!(stats.total_runs, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.last_run_at, None);
    assert_eq!(stats.avg_duration_ms, None);
}

#[test]
fn manual_trigger_records_initiating_user() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let run = trigger_manually(&store, &NoopDispatcher, "cleanup-sessions", "admin-1")
        .expect("trigger");
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.triggered_by.as_deref(), Some("admin-1"));

    let stored = store.get_run(run.id).expect("get").expect("row");
    assert_eq!(stored.triggered_by.as_deref(), Some("admin-1"));
}

#[test]
fn manual_trigger_of_disabled_task_creates_no_run() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");
    store
        .apply_update(
            "cleanup-sessions",
            &TaskUpdate {
                is_enabled: Some(false),
                ..TaskUpdate::default()
            },
        )
        .expect("disable");

    let result = trigger_manually(&store, &NoopDispatcher, "cleanup-sessions", "admin-1");
    assert!(matches!(result, Err(TaskStoreError::Disabled(_))));

    let runs = store
        .list_runs("cleanup-sessions", 10, 0, None)
        .expect("list");
    assert!(runs.is_empty());
}

#[test]
fn manual_trigger_of_unknown_task_is_not_found() {
    let temp = TempDir::new().expect("tempdir");
    let store = SqliteTaskStore::new(temp.path().join("tasks.db")).expect("store");

    let result = trigger_manually(&store, &NoopDispatcher, "missing", "admin-1");
    assert!(matches!(result, Err(TaskStoreError::NotFound(_))));
}

#[test]
fn failed_dispatch_finalizes_the_run_as_failed() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let result = trigger_manually(&store, &FailingDispatcher, "cleanup-sessions", "admin-1");
    assert!(matches!(result, Err(TaskStoreError::Dispatch(_))));

    let runs = store
        .list_runs("cleanup-sessions", 10, 0, None)
        .expect("list");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error.as_deref().unwrap_or("").contains("engine unreachable"));
}

#[test]
fn thread_dispatcher_invokes_handler_and_records_output() {
    use super::{HandlerRegistry, TaskContext, ThreadDispatcher};
    use std::sync::Arc;

    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");

    let mut registry = HandlerRegistry::new();
    registry.register(
        "cleanup-sessions",
        Arc::new(|_ctx: &TaskContext| -> Result<serde_json::Value, TaskStoreError> {
            Ok(json!({ "deleted": 7 }))
        }),
    );
    let dispatcher = ThreadDispatcher::new(store.clone(), Arc::new(registry));

    let run = trigger_manually(&store, &dispatcher, "cleanup-sessions", "admin-1")
        .expect("trigger");

    // The dispatcher finalizes on a worker thread; poll until it lands.
    let mut stored = store.get_run(run.id).expect("get").expect("row");
    for _ in 0..100 {
        if stored.status.is_terminal() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
        stored = store.get_run(run.id).expect("get").expect("row");
    }
    assert_eq!(stored.status, RunStatus::Succeeded);
    assert_eq!(stored.output, Some(json!({ "deleted": 7 })));
    assert!(stored.completed_at.is_some());
}

#[test]
fn thread_dispatcher_times_out_a_slow_handler() {
    use super::{HandlerRegistry, TaskContext, ThreadDispatcher};
    use std::sync::Arc;

    let temp = TempDir::new().expect("tempdir");
    let store = SqliteTaskStore::new(temp.path().join("tasks.db")).expect("store");
    let mut definition = cron_definition("cleanup-sessions");
    definition.timeout_secs = 0;
    sync_definitions(&store, &[definition], "test-1").expect("sync");

    let mut registry = HandlerRegistry::new();
    registry.register(
        "cleanup-sessions",
        Arc::new(|_ctx: &TaskContext| -> Result<serde_json::Value, TaskStoreError> {
            thread::sleep(Duration::from_millis(300));
            Ok(json!({ "deleted": 0 }))
        }),
    );
    let dispatcher = ThreadDispatcher::new(store.clone(), Arc::new(registry));

    let run = trigger_manually(&store, &dispatcher, "cleanup-sessions", "admin-1")
        .expect("trigger");

    let mut stored = store.get_run(run.id).expect("get").expect("row");
    for _ in 0..100 {
        if stored.status.is_terminal() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
        stored = store.get_run(run.id).expect("get").expect("row");
    }
    assert_eq!(stored.status, RunStatus::TimedOut);
    assert!(stored.completed_at.is_some());
    assert!(stored.error.as_deref().unwrap_or("").contains("exceeded"));
    assert_eq!(stored.output, None);
}

#[test]
fn thread_dispatcher_without_handler_is_a_dispatch_error() {
    use super::{HandlerRegistry, ThreadDispatcher};
    use std::sync::Arc;

    let temp = TempDir::new().expect("tempdir");
    let store = store_with_task(&temp, "cleanup-sessions");
    let dispatcher = ThreadDispatcher::new(store.clone(), Arc::new(HandlerRegistry::new()));

    let result = trigger_manually(&store, &dispatcher, "cleanup-sessions", "admin-1");
    assert!(matches!(result, Err(TaskStoreError::Dispatch(_))));
}
