//! Attendance session models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Open,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "Open",
            SessionStatus::Completed => "Completed",
        }
    }
}

/// The bounded recognition window for one schedule. At most one exists per
/// schedule, and once `Completed` it is never touched again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSession {
    pub id: String,
    pub schedule_id: String,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceSession {
    pub fn deadline(&self, duration: Duration) -> DateTime<Utc> {
        self.started_at + duration
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}
