use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use log::warn;

use crate::error::{AttendanceError, AttendanceResult};

use super::frame::Frame;

const SPOOL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Blocking supplier of camera frames.
pub trait FrameSource {
    /// Block for up to `wait` for the next frame. `Ok(None)` means nothing
    /// arrived in time; an error means the source is gone for good.
    fn next_frame(&mut self, wait: Duration) -> AttendanceResult<Option<Frame>>;
}

/// Reads frames that capture software drops into a spool directory.
///
/// Frames are consumed oldest-name-first and deleted once decoded, so camera
/// software should write each file under a temporary name and rename it into
/// place.
pub struct SpoolFrameSource {
    dir: PathBuf,
}

impl SpoolFrameSource {
    pub fn open(dir: impl Into<PathBuf>) -> AttendanceResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(AttendanceError::SourceUnavailable(format!(
                "frame spool directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    fn pending_frames(&self) -> AttendanceResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|err| {
            AttendanceError::SourceUnavailable(format!(
                "cannot read frame spool {}: {err}",
                self.dir.display()
            ))
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        frames.sort();
        Ok(frames)
    }

    fn take_oldest(&mut self) -> AttendanceResult<Option<Frame>> {
        for path in self.pending_frames()? {
            let decoded = image::open(&path);
            fs::remove_file(&path).map_err(|err| {
                AttendanceError::SourceUnavailable(format!(
                    "cannot consume frame {}: {err}",
                    path.display()
                ))
            })?;

            match decoded {
                Ok(image) => {
                    let origin = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    return Ok(Some(Frame::with_origin(image, origin)));
                }
                Err(err) => warn!("Discarding undecodable frame {}: {err}", path.display()),
            }
        }
        Ok(None)
    }
}

impl FrameSource for SpoolFrameSource {
    fn next_frame(&mut self, wait: Duration) -> AttendanceResult<Option<Frame>> {
        let started = Instant::now();
        loop {
            if let Some(frame) = self.take_oldest()? {
                return Ok(Some(frame));
            }

            let elapsed = started.elapsed();
            if elapsed >= wait {
                return Ok(None);
            }
            thread::sleep(SPOOL_POLL_INTERVAL.min(wait - elapsed));
        }
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
