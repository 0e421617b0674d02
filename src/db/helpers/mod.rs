use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{AttendanceStatus, SessionStatus};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_session_status(value: &str) -> Result<SessionStatus> {
    match value {
        "Open" => Ok(SessionStatus::Open),
        "Completed" => Ok(SessionStatus::Completed),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

pub fn parse_attendance_status(value: &str) -> Result<AttendanceStatus> {
    match value {
        "Present" => Ok(AttendanceStatus::Present),
        "Absent" => Ok(AttendanceStatus::Absent),
        other => Err(anyhow!("unknown attendance status {other}")),
    }
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}
