use chrono::{DateTime, Utc};

use super::types::{RunStatus, ScheduleType, TaskCategory, TaskStoreError};

pub(crate) fn schedule_type_label(value: ScheduleType) -> &'static str {
    match value {
        ScheduleType::Cron => "cron",
        ScheduleType::Event => "event",
        ScheduleType::Hybrid => "hybrid",
    }
}

pub(crate) fn parse_schedule_type(raw: &str) -> Result<ScheduleType, TaskStoreError> {
    match raw {
        "cron" => Ok(ScheduleType::Cron),
        "event" => Ok(ScheduleType::Event),
        "hybrid" => Ok(ScheduleType::Hybrid),
        other => Err(TaskStoreError::Storage(format!(
            "unknown schedule type {}",
            other
        ))),
    }
}

pub(crate) fn category_label(value: TaskCategory) -> &'static str {
    match value {
        TaskCategory::Maintenance => "maintenance",
        TaskCategory::Billing => "billing",
        TaskCategory::Notifications => "notifications",
    }
}

pub(crate) fn parse_category(raw: &str) -> Result<TaskCategory, TaskStoreError> {
    match raw {
        "maintenance" => Ok(TaskCategory::Maintenance),
        "billing" => Ok(TaskCategory::Billing),
        "notifications" => Ok(TaskCategory::Notifications),
        other => Err(TaskStoreError::Storage(format!(
            "unknown task category {}",
            other
        ))),
    }
}

pub(crate) fn run_status_label(value: RunStatus) -> &'static str {
    match value {
        RunStatus::Running => "running",
        RunStatus::Succeeded => "succeeded",
        RunStatus::Failed => "failed",
        RunStatus::TimedOut => "timed_out",
    }
}

pub(crate) fn parse_run_status(raw: &str) -> Result<RunStatus, TaskStoreError> {
    match raw {
        "running" => Ok(RunStatus::Running),
        "succeeded" => Ok(RunStatus::Succeeded),
        "failed" => Ok(RunStatus::Failed),
        "timed_out" => Ok(RunStatus::TimedOut),
        other => Err(TaskStoreError::Storage(format!(
            "unknown run status {}",
            other
        ))),
    }
}

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, TaskStoreError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub(crate) fn parse_optional_datetime(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, TaskStoreError> {
    match value {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn parse_json_column(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
}
