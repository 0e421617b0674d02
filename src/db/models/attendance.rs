//! Attendance record models and the read-side views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

/// One row per (schedule, subject).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: i64,
    pub session_id: Option<String>,
    pub schedule_id: String,
    pub subject_id: String,
    pub recorded_at: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub image_path: Option<String>,
}

/// Insert payload; the row id is assigned by SQLite.
#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub session_id: Option<String>,
    pub schedule_id: String,
    pub subject_id: String,
    pub recorded_at: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub image_path: Option<String>,
}

/// A roster line in a schedule report; `status` is `None` for subjects with
/// no record yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub subject_id: String,
    pub subject_name: String,
    pub status: Option<AttendanceStatus>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub expected: u64,
    pub present: u64,
    pub absent: u64,
    /// Present over expected, as a percentage rounded to one decimal.
    pub rate: f64,
}

impl SubjectStats {
    pub fn new(expected: u64, present: u64, absent: u64) -> Self {
        let rate = if expected > 0 {
            (present as f64 / expected as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Self {
            expected,
            present,
            absent,
            rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOutcome {
    Updated,
    /// No record existed, so an Absent row carrying the note was created.
    InsertedAbsent,
}
