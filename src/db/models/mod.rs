pub mod attendance;
pub mod registry;
pub mod session;

pub use attendance::{
    AttendanceRecord, AttendanceStatus, NewAttendanceRecord, NoteOutcome, ReportRow, SubjectStats,
};
pub use registry::{RosterPopulation, Schedule, Subject};
pub use session::{AttendanceSession, SessionStatus};
