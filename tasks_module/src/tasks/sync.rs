use chrono::Utc;
use tracing::info;

use crate::registry::TaskDefinition;

use super::store::SqliteTaskStore;
use super::types::{ScheduledTask, SyncReport, TaskStoreError};

/// Build the row a definition should persist as, against an optional
/// existing row. Every field names its source explicitly: everything
/// definition-derived comes from the definition; `is_enabled` and
/// `created_at` survive from the existing row, so an operator disabling a
/// task keeps it disabled across redeploys.
pub fn merge_fields(
    existing: Option<&ScheduledTask>,
    definition: &TaskDefinition,
    code_version: &str,
) -> ScheduledTask {
    let now = Utc::now();
    ScheduledTask {
        function_id: definition.id.clone(),
        function_name: definition.name.clone(),
        description: definition.description.clone(),
        schedule_type: definition.schedule.schedule_type(),
        cron_schedule: definition.schedule.cron.clone(),
        event_name: definition.schedule.event.clone(),
        category: definition.category,
        is_enabled: existing
            .map(|row| row.is_enabled)
            .unwrap_or(definition.schedule.enabled),
        retries: definition.retries,
        concurrency_limit: definition.concurrency_limit,
        timeout_ms: u64::from(definition.timeout_secs) * 1000,
        metadata: serde_json::Value::Object(definition.metadata.clone()),
        code_version: code_version.to_string(),
        created_at: existing.map(|row| row.created_at).unwrap_or(now),
        updated_at: now,
    }
}

/// Reconcile the persisted rows with the in-code definition catalogue.
///
/// Each definition is an independent upsert; there is no enclosing
/// transaction, so a failure partway leaves the rows persisted so far
/// committed. Sync is idempotent; re-invoking it reconciles the rest.
pub fn sync_definitions(
    store: &SqliteTaskStore,
    definitions: &[TaskDefinition],
    code_version: &str,
) -> Result<SyncReport, TaskStoreError> {
    let mut report = SyncReport::default();
    for definition in definitions {
        let existing = store.get_task(&definition.id)?;
        let merged = merge_fields(existing.as_ref(), definition, code_version);
        match existing {
            Some(_) => {
                store.update_task_row(&merged)?;
                report.updated += 1;
            }
            None => {
                store.insert_task(&merged)?;
                report.created += 1;
            }
        }
        report.synced += 1;
    }
    info!(
        "task sync finished: {} synced ({} created, {} updated)",
        report.synced, report.created, report.updated
    );
    Ok(report)
}
