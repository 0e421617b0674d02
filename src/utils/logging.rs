//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("subject {} recorded present", subject_id);
//! ```
//!
//! The recognition loop and the recorder print a line per decision, so muting
//! a single module is easier than fighting `RUST_LOG` filters.

/// Info-level log line, emitted only when the calling module sets
/// `ENABLE_LOGS = true`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
