use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    db::{AttendanceSession, Database, SessionStatus},
    error::{AttendanceError, AttendanceResult},
    utils::Clock,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Owns the one-session-per-schedule rule and the session deadline.
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    clock: Arc<dyn Clock>,
    duration: Duration,
}

impl SessionManager {
    pub fn new(db: Database, clock: Arc<dyn Clock>, duration: Duration) -> Self {
        Self {
            db,
            clock,
            duration,
        }
    }

    pub fn deadline(&self, session: &AttendanceSession) -> DateTime<Utc> {
        session.deadline(self.duration)
    }

    /// Return the schedule's Open session, or open a new one. The flag is
    /// true when the session was created by this call.
    pub async fn start_or_resume(
        &self,
        schedule_id: &str,
    ) -> AttendanceResult<(AttendanceSession, bool)> {
        if let Some(session) = self.db.get_session_for_schedule(schedule_id).await? {
            if !session.is_open() {
                return Err(AttendanceError::SessionClosed(schedule_id.to_string()));
            }
            log_info!(
                "Resuming session {} for schedule {} started at {}",
                session.id,
                schedule_id,
                session.started_at.to_rfc3339()
            );
            return Ok((session, false));
        }

        if self.db.get_schedule(schedule_id).await?.is_none() {
            return Err(AttendanceError::NotFound(format!("schedule {schedule_id}")));
        }

        let started_at = self.clock.now();
        let session = AttendanceSession {
            id: Uuid::new_v4().to_string(),
            schedule_id: schedule_id.to_string(),
            started_at,
            status: SessionStatus::Open,
            completed_at: None,
            created_at: started_at,
            updated_at: started_at,
        };
        self.db.insert_session(&session).await?;

        log_info!(
            "Opened session {} for schedule {}, closes at {}",
            session.id,
            schedule_id,
            self.deadline(&session).to_rfc3339()
        );
        Ok((session, true))
    }
}
