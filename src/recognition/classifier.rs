use std::{collections::HashMap, fs, path::Path};

use image::DynamicImage;
use image_hasher::{Hasher, ImageHash};
use serde::{Deserialize, Serialize};

use crate::error::{AttendanceError, AttendanceResult};

use super::phash::{compute_phash, decode_phash, distance_percent, face_hasher, hash_bits};

/// Classifier output for one face region. The score is a distance: lower
/// means a closer match.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Identified { subject_id: String, confidence: f64 },
    /// The closest model label maps to no known subject.
    Unidentified { confidence: f64 },
}

impl Classification {
    pub fn confidence(&self) -> f64 {
        match self {
            Classification::Identified { confidence, .. } => *confidence,
            Classification::Unidentified { confidence } => *confidence,
        }
    }

    pub fn subject_id(&self) -> Option<&str> {
        match self {
            Classification::Identified { subject_id, .. } => Some(subject_id),
            Classification::Unidentified { .. } => None,
        }
    }
}

/// Pre-trained face classifier. Loaded once at startup and never retrained
/// while a session runs.
pub trait Classifier {
    fn classify(&self, face: &DynamicImage) -> Classification;
}

/// On-disk gallery written by the offline training job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryFile {
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,
    pub entries: Vec<GalleryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub label: u32,
    /// Base64 perceptual hash of one enrollment image.
    pub hash: String,
}

const MAX_HASH_SIZE: u32 = 64;

fn default_hash_size() -> u32 {
    8
}

/// Nearest-neighbour classifier over perceptual hashes of enrollment images.
pub struct GalleryClassifier {
    hasher: Hasher,
    samples: Vec<(u32, ImageHash)>,
    subjects_by_label: HashMap<u32, String>,
}

impl std::fmt::Debug for GalleryClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryClassifier")
            .field("samples", &self.samples.len())
            .field("subjects", &self.subjects_by_label.len())
            .finish()
    }
}

impl GalleryClassifier {
    /// Load the gallery and the `subject id -> numeric label` map. Either
    /// file missing or unusable is a `NotFound`: recognition cannot start
    /// without a trained model.
    pub fn load(model_path: &Path, labels_path: &Path) -> AttendanceResult<Self> {
        let labels: HashMap<String, u32> = read_json(labels_path, "label map")?;
        let gallery: GalleryFile = read_json(model_path, "trained model")?;

        if gallery.entries.is_empty() {
            return Err(AttendanceError::NotFound(format!(
                "trained model {} contains no samples",
                model_path.display()
            )));
        }

        let subjects_by_label = labels
            .into_iter()
            .map(|(subject_id, label)| (label, subject_id))
            .collect();

        Self::from_gallery(gallery, subjects_by_label).map_err(|err| {
            AttendanceError::NotFound(format!(
                "trained model {} is unusable: {err}",
                model_path.display()
            ))
        })
    }

    pub fn from_gallery(
        gallery: GalleryFile,
        subjects_by_label: HashMap<u32, String>,
    ) -> anyhow::Result<Self> {
        let hash_size = gallery.hash_size;
        if !(1..=MAX_HASH_SIZE).contains(&hash_size) {
            anyhow::bail!("hash size must be in 1..={MAX_HASH_SIZE}, got {hash_size}");
        }
        let hasher = face_hasher(hash_size);
        let probe = compute_phash(&hasher, &DynamicImage::new_luma8(hash_size * 2, hash_size * 2));
        let expected_bits = hash_bits(&probe);

        let mut samples = Vec::with_capacity(gallery.entries.len());
        for entry in gallery.entries {
            let hash = decode_phash(&entry.hash)?;
            if hash_bits(&hash) != expected_bits {
                anyhow::bail!(
                    "sample for label {} has {} bits, expected {expected_bits}",
                    entry.label,
                    hash_bits(&hash)
                );
            }
            samples.push((entry.label, hash));
        }

        Ok(Self {
            hasher,
            samples,
            subjects_by_label,
        })
    }

    pub fn subject_count(&self) -> usize {
        self.subjects_by_label.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Classifier for GalleryClassifier {
    fn classify(&self, face: &DynamicImage) -> Classification {
        let probe = compute_phash(&self.hasher, face);

        let nearest = self
            .samples
            .iter()
            .map(|(label, hash)| (*label, distance_percent(&probe, hash)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((label, confidence)) => match self.subjects_by_label.get(&label) {
                Some(subject_id) => Classification::Identified {
                    subject_id: subject_id.clone(),
                    confidence,
                },
                None => Classification::Unidentified { confidence },
            },
            None => Classification::Unidentified { confidence: 100.0 },
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> AttendanceResult<T> {
    let contents = fs::read_to_string(path).map_err(|err| {
        AttendanceError::NotFound(format!("{what} {} could not be read: {err}", path.display()))
    })?;
    serde_json::from_str(&contents).map_err(|err| {
        AttendanceError::NotFound(format!("{what} {} is not valid: {err}", path.display()))
    })
}
