use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db::{AttendanceSession, AttendanceStatus, Database, NewAttendanceRecord},
    error::AttendanceResult,
    utils::Clock,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Recorded,
    /// Storage already held a record for the subject; nothing was written.
    AlreadyRecorded,
}

/// Result of the end-of-session absence pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceReport {
    pub recorded: Vec<String>,
    /// Expected subjects that turned out to have a record already.
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Writes Present rows during the loop and Absent rows after it. Storage is
/// the source of truth: a subject never gets a second row for a schedule.
#[derive(Clone)]
pub struct AttendanceRecorder {
    db: Database,
    clock: Arc<dyn Clock>,
    absence_note: String,
}

impl AttendanceRecorder {
    pub fn new(db: Database, clock: Arc<dyn Clock>, absence_note: impl Into<String>) -> Self {
        Self {
            db,
            clock,
            absence_note: absence_note.into(),
        }
    }

    pub async fn record_present(
        &self,
        session: &AttendanceSession,
        subject_id: &str,
        recorded_at: DateTime<Utc>,
        image_path: Option<String>,
    ) -> Result<PresentOutcome> {
        let record = NewAttendanceRecord {
            session_id: Some(session.id.clone()),
            schedule_id: session.schedule_id.clone(),
            subject_id: subject_id.to_string(),
            recorded_at,
            status: AttendanceStatus::Present,
            note: None,
            image_path,
        };

        if self.db.insert_attendance_if_absent(&record).await? {
            Ok(PresentOutcome::Recorded)
        } else {
            Ok(PresentOutcome::AlreadyRecorded)
        }
    }

    /// Mark every expected attendee outside `processed` Absent. Each row is
    /// written on its own; a failed write is logged and the pass moves on.
    /// Only loading the roster can fail the whole pass.
    pub async fn record_absentees(
        &self,
        session: &AttendanceSession,
        processed: &HashSet<String>,
    ) -> AttendanceResult<AbsenceReport> {
        let expected = self.db.expected_subject_ids(&session.schedule_id).await?;
        let recorded_at = self.clock.now();
        let mut report = AbsenceReport::default();

        for subject_id in expected
            .into_iter()
            .filter(|subject_id| !processed.contains(subject_id))
        {
            let record = NewAttendanceRecord {
                session_id: Some(session.id.clone()),
                schedule_id: session.schedule_id.clone(),
                subject_id: subject_id.clone(),
                recorded_at,
                status: AttendanceStatus::Absent,
                note: Some(self.absence_note.clone()),
                image_path: None,
            };

            match self.db.insert_attendance_if_absent(&record).await {
                Ok(true) => report.recorded.push(subject_id),
                Ok(false) => report.skipped.push(subject_id),
                Err(err) => {
                    log_error!("Failed to record {subject_id} absent: {err:#}");
                    report.failed.push(subject_id);
                }
            }
        }

        log_info!(
            "Absence pass for schedule {}: {} absent, {} already recorded, {} failed",
            session.schedule_id,
            report.recorded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
