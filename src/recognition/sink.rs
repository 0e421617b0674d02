use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::DynamicImage;

/// Label used in capture file names when the face was not identified.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Best-effort writer for captured face crops.
pub trait ImageSink {
    fn save(&self, image: &DynamicImage, path: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageSink;

impl ImageSink for FsImageSink {
    fn save(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        // JPEG has no alpha channel.
        image
            .to_rgb8()
            .save(path)
            .with_context(|| format!("failed to write captured face {}", path.display()))
    }
}

/// `{label}_attendance_{YYYYmmdd_HHMMSS}_{frame}_{region}.jpg` under `dir`.
/// The frame number keeps two sightings within one second apart.
pub fn capture_path(
    dir: &Path,
    label: Option<&str>,
    captured_at: DateTime<Utc>,
    frame_number: u64,
    region_index: usize,
) -> PathBuf {
    let label = label.unwrap_or(UNKNOWN_LABEL);
    dir.join(format!(
        "{}_attendance_{}_{}_{}.jpg",
        sanitize_label(label),
        captured_at.format("%Y%m%d_%H%M%S"),
        frame_number,
        region_index
    ))
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
