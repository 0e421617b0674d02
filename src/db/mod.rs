mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{
    AttendanceRecord, AttendanceSession, AttendanceStatus, NewAttendanceRecord, NoteOutcome,
    ReportRow, RosterPopulation, Schedule, SessionStatus, Subject, SubjectStats,
};
