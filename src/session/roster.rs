use std::sync::Arc;

use crate::{
    db::{Database, RosterPopulation},
    error::{AttendanceError, AttendanceResult},
    utils::Clock,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterOutcome {
    /// The schedule already had a roster; it was left as is.
    Existing(u64),
    /// The whole registry was enrolled as expected attendees.
    Populated(u64),
}

impl RosterOutcome {
    pub fn expected(&self) -> u64 {
        match self {
            RosterOutcome::Existing(count) | RosterOutcome::Populated(count) => *count,
        }
    }
}

/// Makes sure a schedule has expected attendees before recognition starts.
#[derive(Clone)]
pub struct RosterResolver {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RosterResolver {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Enroll every registered subject when the schedule has no roster yet.
    /// An existing roster is never re-synced or pruned.
    pub async fn ensure_roster(&self, schedule_id: &str) -> AttendanceResult<RosterOutcome> {
        let population = self
            .db
            .populate_roster_if_empty(schedule_id, self.clock.now())
            .await?;

        match population {
            RosterPopulation::Existing(count) => Ok(RosterOutcome::Existing(count)),
            RosterPopulation::Populated(count) => {
                log_info!(
                    "Enrolled {} registered subjects as expected attendees of {}",
                    count,
                    schedule_id
                );
                Ok(RosterOutcome::Populated(count))
            }
            RosterPopulation::ScheduleMissing => Err(AttendanceError::NotFound(format!(
                "schedule {schedule_id}"
            ))),
            RosterPopulation::RegistryEmpty => Err(AttendanceError::EmptyRegistry),
        }
    }
}
