//! Failure taxonomy for attendance sessions.
//!
//! Repository code works in `anyhow::Result`; anything that reaches the
//! operator is folded into [`AttendanceError`] so the binary can decide
//! between aborting startup and carrying on.

use thiserror::Error;

pub type AttendanceResult<T> = std::result::Result<T, AttendanceError>;

#[derive(Debug, Error)]
pub enum AttendanceError {
    /// Missing schedule, subject or trained-model artifact.
    #[error("not found: {0}")]
    NotFound(String),

    /// The schedule's attendance session was already completed.
    #[error("attendance session for schedule {0} is already completed")]
    SessionClosed(String),

    /// The camera or frame spool cannot deliver frames.
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// A read or write against the attendance store failed.
    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),

    /// Roster resolution found no subjects to enroll.
    #[error("no subjects are registered; cannot build a roster")]
    EmptyRegistry,

    #[error("configuration error: {0}")]
    Config(String),
}

impl AttendanceError {
    /// Whether the error should stop the process before any recognition runs.
    pub fn is_fatal_setup(&self) -> bool {
        !matches!(self, AttendanceError::Persistence(_))
    }
}
