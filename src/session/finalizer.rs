use std::sync::Arc;

use crate::{
    db::{AttendanceSession, Database},
    error::{AttendanceError, AttendanceResult},
    utils::Clock,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Clone)]
pub struct SessionFinalizer {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SessionFinalizer {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Open -> Completed. Fails with `SessionClosed` when the session was
    /// already completed and `NotFound` when the schedule has no session.
    pub async fn complete(&self, schedule_id: &str) -> AttendanceResult<AttendanceSession> {
        let moved = self
            .db
            .mark_session_completed(schedule_id, self.clock.now())
            .await?;

        let session = self
            .db
            .get_session_for_schedule(schedule_id)
            .await?
            .ok_or_else(|| {
                AttendanceError::NotFound(format!("attendance session for schedule {schedule_id}"))
            })?;

        if moved == 0 {
            return Err(AttendanceError::SessionClosed(schedule_id.to_string()));
        }

        log_info!("Session {} for schedule {} completed", session.id, schedule_id);
        Ok(session)
    }
}
