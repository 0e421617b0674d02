pub mod controller;
pub mod finalizer;
pub mod manager;
pub mod recorder;
pub mod roster;

pub use controller::{AttendanceController, SessionPolicy, SessionReport};
pub use finalizer::SessionFinalizer;
pub use manager::SessionManager;
pub use recorder::{AbsenceReport, AttendanceRecorder, PresentOutcome};
pub use roster::{RosterOutcome, RosterResolver};
