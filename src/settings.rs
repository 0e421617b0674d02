use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::error::{AttendanceError, AttendanceResult};

pub const DEFAULT_SETTINGS_FILE: &str = "rollcall.json";

/// Longest accepted session, one week.
pub const MAX_SESSION_MINUTES: i64 = 7 * 24 * 60;

/// Operator settings, read from a JSON file. Missing keys take defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Gallery of enrollment hashes written by the training job.
    pub model_path: PathBuf,
    /// `subject id -> numeric label` map written alongside the gallery.
    pub labels_path: PathBuf,
    pub captured_dir: PathBuf,
    /// Spool directory the camera software drops frames into.
    pub frames_dir: PathBuf,
    pub confidence_threshold: f64,
    pub session_minutes: i64,
    pub frame_wait_ms: u64,
    pub min_face_fraction: f64,
    pub absence_note: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: "rollcall.sqlite3".into(),
            model_path: "trainer/gallery.json".into(),
            labels_path: "trainer/labels.json".into(),
            captured_dir: "Captured".into(),
            frames_dir: "frames".into(),
            confidence_threshold: 75.0,
            session_minutes: 15,
            frame_wait_ms: 200,
            min_face_fraction: 0.1,
            absence_note: "Unexcused absence".into(),
        }
    }
}

impl Settings {
    /// A missing file means defaults; a file that exists must parse.
    pub fn load(path: &Path) -> AttendanceResult<Self> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|err| {
                AttendanceError::Config(format!(
                    "failed to read settings from {}: {err}",
                    path.display()
                ))
            })?;
            serde_json::from_str(&contents).map_err(|err| {
                AttendanceError::Config(format!("invalid settings in {}: {err}", path.display()))
            })?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AttendanceResult<()> {
        if !(self.confidence_threshold > 0.0) {
            return Err(AttendanceError::Config(format!(
                "confidence_threshold must be positive, got {}",
                self.confidence_threshold
            )));
        }
        if !(1..=MAX_SESSION_MINUTES).contains(&self.session_minutes) {
            return Err(AttendanceError::Config(format!(
                "session_minutes must be in 1..={MAX_SESSION_MINUTES}, got {}",
                self.session_minutes
            )));
        }
        if !(self.min_face_fraction > 0.0 && self.min_face_fraction <= 1.0) {
            return Err(AttendanceError::Config(format!(
                "min_face_fraction must be in (0, 1], got {}",
                self.min_face_fraction
            )));
        }
        Ok(())
    }

    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_minutes)
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }
}
