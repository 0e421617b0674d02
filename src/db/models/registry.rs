//! Registry rows owned by upstream scheduling: subjects, schedules and the
//! expected-attendee membership between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A single class meeting that requires attendance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of lazily enrolling the registry into a schedule's roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterPopulation {
    /// The schedule already had expected attendees; nothing was written.
    Existing(u64),
    /// Every registered subject was inserted in one transaction.
    Populated(u64),
    ScheduleMissing,
    RegistryEmpty,
}
