use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{AttendanceSession, Database},
    error::AttendanceResult,
    recognition::{recognition_loop, LoopParams, LoopSummary, RecognitionRig, StopReason},
    utils::Clock,
};

use super::{
    finalizer::SessionFinalizer,
    manager::SessionManager,
    recorder::{AbsenceReport, AttendanceRecorder},
    roster::{RosterOutcome, RosterResolver},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Tunables for one attendance run.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Exclusive upper bound on an accepted classifier score.
    pub confidence_threshold: f64,
    pub session_duration: chrono::Duration,
    pub frame_wait: Duration,
    pub captured_dir: PathBuf,
    pub absence_note: String,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: AttendanceSession,
    pub deadline: DateTime<Utc>,
    pub resumed: bool,
    pub roster: RosterOutcome,
    /// `None` when the loop was skipped because the deadline had passed.
    pub loop_summary: Option<LoopSummary>,
    /// `None` when the roster could not be read for the absence pass.
    pub absences: Option<AbsenceReport>,
    pub finalized: bool,
}

impl SessionReport {
    pub fn source_failed(&self) -> bool {
        matches!(
            self.loop_summary.as_ref().map(|summary| &summary.stop_reason),
            Some(StopReason::SourceFailed(_))
        )
    }
}

/// Drives a schedule from roster resolution to a completed session.
pub struct AttendanceController {
    db: Database,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    roster: RosterResolver,
    sessions: SessionManager,
    recorder: AttendanceRecorder,
    finalizer: SessionFinalizer,
}

impl AttendanceController {
    pub fn new(db: Database, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            roster: RosterResolver::new(db.clone(), clock.clone()),
            sessions: SessionManager::new(db.clone(), clock.clone(), policy.session_duration),
            recorder: AttendanceRecorder::new(db.clone(), clock.clone(), policy.absence_note.clone()),
            finalizer: SessionFinalizer::new(db.clone(), clock.clone()),
            db,
            clock,
            policy,
        }
    }

    /// Open sessions whose deadline passed, typically left behind by a crash.
    /// Running their schedule again finalizes them.
    pub async fn stale_sessions(&self) -> AttendanceResult<Vec<AttendanceSession>> {
        let now = self.clock.now();
        let stale: Vec<AttendanceSession> = self
            .db
            .list_open_sessions()
            .await?
            .into_iter()
            .filter(|session| self.sessions.deadline(session) <= now)
            .collect();

        for session in &stale {
            log_warn!(
                "Session {} for schedule {} is still open past its deadline {}",
                session.id,
                session.schedule_id,
                self.sessions.deadline(session).to_rfc3339()
            );
        }
        Ok(stale)
    }

    /// Roster, session, recognition, absence pass, finalize. Setup failures
    /// return an error before any frame is read. Once the loop has run, write
    /// failures are logged and reflected in the report instead.
    pub async fn run_session(
        &self,
        schedule_id: &str,
        rig: &mut RecognitionRig<'_>,
        cancel_token: &CancellationToken,
    ) -> AttendanceResult<SessionReport> {
        let roster = self.roster.ensure_roster(schedule_id).await?;
        let (session, created) = self.sessions.start_or_resume(schedule_id).await?;
        let deadline = self.sessions.deadline(&session);

        let processed: HashSet<String> = self
            .db
            .present_subject_ids(schedule_id)
            .await?
            .into_iter()
            .collect();

        let (loop_summary, processed) = if !created && self.clock.now() >= deadline {
            log_info!(
                "Session {} for schedule {} passed its deadline {}; finalizing without recognition",
                session.id,
                schedule_id,
                deadline.to_rfc3339()
            );
            (None, processed)
        } else {
            let expected: HashSet<String> = self
                .db
                .expected_subject_ids(schedule_id)
                .await?
                .into_iter()
                .collect();

            let params = LoopParams {
                session: &session,
                deadline,
                threshold: self.policy.confidence_threshold,
                frame_wait: self.policy.frame_wait,
                captured_dir: &self.policy.captured_dir,
                expected,
                processed,
            };
            let outcome =
                recognition_loop(params, rig, &self.recorder, self.clock.as_ref(), cancel_token)
                    .await;
            (Some(outcome.summary), outcome.processed)
        };

        let absences = match self.recorder.record_absentees(&session, &processed).await {
            Ok(report) => Some(report),
            Err(err) => {
                log_error!("Absence pass failed for schedule {schedule_id}: {err}");
                None
            }
        };

        // Without a completed absence pass the session stays Open so a later
        // run can finish it.
        let finalized = match absences {
            Some(_) => match self.finalizer.complete(schedule_id).await {
                Ok(_) => true,
                Err(err) => {
                    log_error!("Failed to complete session for schedule {schedule_id}: {err}");
                    false
                }
            },
            None => false,
        };

        Ok(SessionReport {
            session,
            deadline,
            resumed: !created,
            roster,
            loop_summary,
            absences,
            finalized,
        })
    }
}
