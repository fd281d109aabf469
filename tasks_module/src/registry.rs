//! Compile-time catalogue of schedulable tasks.
//!
//! Definitions are read-only at runtime; they change only with a deploy.
//! The sync service mirrors them into the persistence store, and the
//! handler registry binds each id to the code that actually runs.

use cron::Schedule as CronSchedule;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::str::FromStr;

use crate::tasks::{ScheduleType, TaskCategory, TaskStoreError};

/// Static declaration of a schedulable unit of work.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: TaskCategory,
    pub schedule: ScheduleSpec,
    pub timeout_secs: u32,
    pub retries: u32,
    pub concurrency_limit: u32,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub cron: Option<String>,
    pub event: Option<String>,
    pub timezone: String,
    pub enabled: bool,
}

impl ScheduleSpec {
    pub fn schedule_type(&self) -> ScheduleType {
        match (&self.cron, &self.event) {
            (Some(_), Some(_)) => ScheduleType::Hybrid,
            (Some(_), None) => ScheduleType::Cron,
            _ => ScheduleType::Event,
        }
    }
}

/// The complete set of tasks this deploy knows about.
pub fn builtin_definitions() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition {
            id: "cleanup-sessions".to_string(),
            name: "Session cleanup".to_string(),
            description: "Delete expired and revoked dashboard sessions".to_string(),
            category: TaskCategory::Maintenance,
            schedule: ScheduleSpec {
                cron: Some("0 0 * * *".to_string()),
                event: None,
                timezone: "UTC".to_string(),
                enabled: true,
            },
            timeout_secs: 120,
            retries: 2,
            concurrency_limit: 1,
            metadata: metadata_map(json!({ "table": "sessions" })),
        },
        TaskDefinition {
            id: "invoice-overdue-check".to_string(),
            name: "Invoice overdue check".to_string(),
            description: "Mark sent invoices past their due date as overdue".to_string(),
            category: TaskCategory::Billing,
            schedule: ScheduleSpec {
                cron: Some("0 6 * * *".to_string()),
                event: Some("billing/invoice.due".to_string()),
                timezone: "UTC".to_string(),
                enabled: true,
            },
            timeout_secs: 300,
            retries: 3,
            concurrency_limit: 1,
            metadata: metadata_map(json!({ "table": "invoices" })),
        },
        TaskDefinition {
            id: "quote-expiry-check".to_string(),
            name: "Quote expiry check".to_string(),
            description: "Expire open quotes past their validity window".to_string(),
            category: TaskCategory::Billing,
            schedule: ScheduleSpec {
                cron: Some("0 7 * * *".to_string()),
                event: None,
                timezone: "UTC".to_string(),
                enabled: true,
            },
            timeout_secs: 300,
            retries: 3,
            concurrency_limit: 1,
            metadata: metadata_map(json!({ "table": "quotes" })),
        },
        TaskDefinition {
            id: "daily-admin-digest".to_string(),
            name: "Admin digest".to_string(),
            description: "Assemble the daily activity digest for administrators".to_string(),
            category: TaskCategory::Notifications,
            schedule: ScheduleSpec {
                cron: None,
                event: Some("admin/digest.requested".to_string()),
                timezone: "UTC".to_string(),
                enabled: true,
            },
            timeout_secs: 60,
            retries: 1,
            concurrency_limit: 2,
            metadata: Map::new(),
        },
    ]
}

/// Sanity-check a definition set: unique ids, parseable cron expressions.
///
/// Definitions are static, so a failure here is a programming mistake; the
/// binary runs this once at startup and tests run it over the built-ins.
pub fn validate_definitions(definitions: &[TaskDefinition]) -> Result<(), TaskStoreError> {
    let mut seen = HashSet::new();
    for definition in definitions {
        if !seen.insert(definition.id.as_str()) {
            return Err(TaskStoreError::InvalidDefinition(format!(
                "duplicate task id {}",
                definition.id
            )));
        }
        if let Some(expression) = &definition.schedule.cron {
            validate_cron(expression)?;
        }
    }
    Ok(())
}

/// Check a single cron expression the same way definition validation does.
/// Also guards operator-supplied schedules on the update path.
pub(crate) fn validate_cron(expression: &str) -> Result<(), TaskStoreError> {
    CronSchedule::from_str(&normalize_cron(expression))?;
    Ok(())
}

/// The `cron` crate wants a seconds field; dashboard schedules use the
/// five-field form, so prepend a zero-seconds field before parsing.
fn normalize_cron(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    }
}

fn metadata_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_definitions_are_valid() {
        let definitions = builtin_definitions();
        assert!(!definitions.is_empty());
        validate_definitions(&definitions).expect("valid built-ins");
    }

    #[test]
    fn schedule_type_derivation_follows_cron_event_rule() {
        let mut spec = ScheduleSpec {
            cron: Some("0 0 * * *".to_string()),
            event: None,
            timezone: "UTC".to_string(),
            enabled: true,
        };
        assert_eq!(spec.schedule_type(), ScheduleType::Cron);

        spec.event = Some("billing/invoice.due".to_string());
        assert_eq!(spec.schedule_type(), ScheduleType::Hybrid);

        spec.cron = None;
        assert_eq!(spec.schedule_type(), ScheduleType::Event);

        spec.event = None;
        assert_eq!(spec.schedule_type(), ScheduleType::Event);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut definitions = builtin_definitions();
        definitions.push(definitions[0].clone());
        assert!(validate_definitions(&definitions).is_err());
    }
}
