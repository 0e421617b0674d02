use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    db::AttendanceSession,
    error::{AttendanceError, AttendanceResult},
    session::{AttendanceRecorder, PresentOutcome},
    utils::Clock,
};

use super::{
    classifier::{Classification, Classifier},
    detector::FaceDetector,
    frame::{BoundingBox, Frame},
    sink::{capture_path, ImageSink},
    source::FrameSource,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_error, log_info, log_warn};

/// What happened to one evaluated face region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    /// First accepted sighting of an expected subject; a Present row was written.
    Recorded,
    /// Accepted, but the subject already has a record for this schedule.
    AlreadyRecorded,
    /// Accepted, but the subject is not on the schedule's roster.
    NotExpected,
    /// Score at or above the threshold.
    BelowConfidence,
    Unidentified,
    /// Accepted, but the Present write failed. The subject stays eligible.
    PersistFailed,
}

/// One detected region and the classifier's verdict on it. Handed to the
/// observer and then dropped.
#[derive(Debug, Clone)]
pub struct RecognitionEvent {
    pub region: BoundingBox,
    pub classification: Classification,
    pub captured_at: DateTime<Utc>,
    pub image_path: Option<String>,
}

/// Optional hook for displaying live recognition results.
pub trait RecognitionObserver {
    fn on_event(&mut self, event: &RecognitionEvent, decision: Decision);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    DeadlineReached,
    Cancelled,
    SourceFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSummary {
    pub frames: u64,
    pub regions: u64,
    pub recorded: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub unidentified: u64,
    pub unexpected: u64,
    pub persist_failures: u64,
    pub stop_reason: StopReason,
}

impl LoopSummary {
    fn new() -> Self {
        Self {
            frames: 0,
            regions: 0,
            recorded: 0,
            duplicates: 0,
            rejected: 0,
            unidentified: 0,
            unexpected: 0,
            persist_failures: 0,
            stop_reason: StopReason::DeadlineReached,
        }
    }

    fn count(&mut self, decision: Decision) {
        self.regions += 1;
        match decision {
            Decision::Recorded => self.recorded += 1,
            Decision::AlreadyRecorded => self.duplicates += 1,
            Decision::NotExpected => self.unexpected += 1,
            Decision::BelowConfidence => self.rejected += 1,
            Decision::Unidentified => self.unidentified += 1,
            Decision::PersistFailed => self.persist_failures += 1,
        }
    }
}

pub type SharedFrameSource = Arc<Mutex<dyn FrameSource + Send>>;

/// The black-box capabilities the loop drives. Frame reads and image work
/// are blocking, so they run on the blocking pool.
pub struct RecognitionRig<'a> {
    pub source: SharedFrameSource,
    pub detector: Arc<dyn FaceDetector + Send + Sync>,
    pub classifier: Arc<dyn Classifier + Send + Sync>,
    pub sink: Arc<dyn ImageSink + Send + Sync>,
    pub observer: Option<&'a mut dyn RecognitionObserver>,
}

/// Fixed inputs for one run of the loop.
pub struct LoopParams<'a> {
    pub session: &'a AttendanceSession,
    pub deadline: DateTime<Utc>,
    /// Exclusive upper bound on an accepted score.
    pub threshold: f64,
    /// Longest single wait for a frame; further bounded by the deadline.
    pub frame_wait: Duration,
    pub captured_dir: &'a Path,
    pub expected: HashSet<String>,
    /// Subjects already recorded for this schedule, e.g. before a restart.
    pub processed: HashSet<String>,
}

pub struct LoopOutcome {
    pub summary: LoopSummary,
    pub processed: HashSet<String>,
}

struct LoopState<'a> {
    params: LoopParams<'a>,
    recorder: &'a AttendanceRecorder,
    unexpected_seen: HashSet<String>,
    summary: LoopSummary,
}

/// Pull frames until the deadline, a cancel or a source failure. Frames are
/// handled strictly one after another and every Present write is awaited
/// before the next frame is read.
pub async fn recognition_loop(
    params: LoopParams<'_>,
    rig: &mut RecognitionRig<'_>,
    recorder: &AttendanceRecorder,
    clock: &dyn Clock,
    cancel_token: &CancellationToken,
) -> LoopOutcome {
    let schedule_id = params.session.schedule_id.clone();
    let mut state = LoopState {
        params,
        recorder,
        unexpected_seen: HashSet::new(),
        summary: LoopSummary::new(),
    };

    log_info!(
        "Recognition started for schedule {} ({} expected, {} already recorded), deadline {}",
        schedule_id,
        state.params.expected.len(),
        state.params.processed.len(),
        state.params.deadline.to_rfc3339()
    );

    let stop_reason = loop {
        let now = clock.now();
        if now >= state.params.deadline {
            log_info!("Deadline reached for schedule {}", schedule_id);
            break StopReason::DeadlineReached;
        }
        if cancel_token.is_cancelled() {
            log_info!("Recognition stopped by operator for schedule {}", schedule_id);
            break StopReason::Cancelled;
        }

        let remaining = (state.params.deadline - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let wait = state.params.frame_wait.min(remaining);

        let source = Arc::clone(&rig.source);
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("Recognition stopped by operator for schedule {}", schedule_id);
                break StopReason::Cancelled;
            }
            joined = tokio::task::spawn_blocking(move || read_frame(&source, wait)) => joined,
        };

        let frame = match next {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => continue,
            Ok(Err(err)) => {
                log_error!("Frame source failed for schedule {}: {err}", schedule_id);
                break StopReason::SourceFailed(err.to_string());
            }
            Err(err) => {
                log_error!("Frame reader for schedule {} died: {err}", schedule_id);
                break StopReason::SourceFailed(format!("frame reader failed: {err}"));
            }
        };

        let captured_at = clock.now();
        if captured_at >= state.params.deadline {
            log_info!("Deadline reached for schedule {}", schedule_id);
            break StopReason::DeadlineReached;
        }

        state.summary.frames += 1;
        state.process_frame(frame, captured_at, rig).await;
    };

    state.summary.stop_reason = stop_reason;
    log_info!(
        "Recognition finished for schedule {}: {} frames, {} regions, {} recorded, {} duplicates, {} rejected, {} unidentified, {} unexpected, {} failed writes",
        schedule_id,
        state.summary.frames,
        state.summary.regions,
        state.summary.recorded,
        state.summary.duplicates,
        state.summary.rejected,
        state.summary.unidentified,
        state.summary.unexpected,
        state.summary.persist_failures
    );

    LoopOutcome {
        summary: state.summary,
        processed: state.params.processed,
    }
}

fn read_frame(source: &SharedFrameSource, wait: Duration) -> AttendanceResult<Option<Frame>> {
    let mut source = source
        .lock()
        .map_err(|_| AttendanceError::SourceUnavailable("frame source lock poisoned".into()))?;
    source.next_frame(wait)
}

/// A classified face region and where its crop was saved, if anywhere.
struct Sighting {
    region: BoundingBox,
    classification: Classification,
    image_path: Option<String>,
}

struct FrameJob {
    frame: Frame,
    detector: Arc<dyn FaceDetector + Send + Sync>,
    classifier: Arc<dyn Classifier + Send + Sync>,
    sink: Arc<dyn ImageSink + Send + Sync>,
    captured_dir: PathBuf,
    captured_at: DateTime<Utc>,
    frame_number: u64,
}

/// Detect, crop, classify and save every region of one frame.
fn analyze_frame(job: FrameJob) -> Vec<Sighting> {
    let frame = &job.frame;
    let regions = job.detector.detect_regions(frame);
    if regions.is_empty() {
        log_debug!(
            "No faces in frame {}",
            frame.origin.as_deref().unwrap_or("<camera>")
        );
        return Vec::new();
    }

    let mut sightings = Vec::with_capacity(regions.len());
    for (index, region) in regions.into_iter().enumerate() {
        let region = region.clamp_to(frame.dimensions());
        if region.area() == 0 {
            continue;
        }

        let face = frame.crop(&region);
        let classification = job.classifier.classify(&face);

        let path = capture_path(
            &job.captured_dir,
            classification.subject_id(),
            job.captured_at,
            job.frame_number,
            index,
        );
        let image_path = match job.sink.save(&face, &path) {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(err) => {
                log_warn!("Could not save captured face: {err:#}");
                None
            }
        };

        sightings.push(Sighting {
            region,
            classification,
            image_path,
        });
    }
    sightings
}

impl LoopState<'_> {
    async fn process_frame(
        &mut self,
        frame: Frame,
        captured_at: DateTime<Utc>,
        rig: &mut RecognitionRig<'_>,
    ) {
        let job = FrameJob {
            frame,
            detector: Arc::clone(&rig.detector),
            classifier: Arc::clone(&rig.classifier),
            sink: Arc::clone(&rig.sink),
            captured_dir: self.params.captured_dir.to_path_buf(),
            captured_at,
            frame_number: self.summary.frames,
        };
        let sightings = match tokio::task::spawn_blocking(move || analyze_frame(job)).await {
            Ok(sightings) => sightings,
            Err(err) => {
                log_error!("Face analysis worker failed: {err}");
                return;
            }
        };

        for sighting in sightings {
            let decision = self
                .decide(
                    &sighting.classification,
                    captured_at,
                    sighting.image_path.as_deref(),
                )
                .await;
            self.summary.count(decision);

            if let Some(observer) = rig.observer.as_deref_mut() {
                let event = RecognitionEvent {
                    region: sighting.region,
                    classification: sighting.classification,
                    captured_at,
                    image_path: sighting.image_path,
                };
                observer.on_event(&event, decision);
            }
        }
    }

    async fn decide(
        &mut self,
        classification: &Classification,
        captured_at: DateTime<Utc>,
        image_path: Option<&str>,
    ) -> Decision {
        let (subject_id, confidence) = match classification {
            Classification::Identified {
                subject_id,
                confidence,
            } => (subject_id.as_str(), *confidence),
            Classification::Unidentified { confidence } => {
                log_debug!("Unidentified face (score {confidence:.1})");
                return Decision::Unidentified;
            }
        };

        if !(confidence < self.params.threshold) {
            log_debug!(
                "Rejected {subject_id}: score {confidence:.1} not below {:.1}",
                self.params.threshold
            );
            return Decision::BelowConfidence;
        }

        if self.params.processed.contains(subject_id) {
            return Decision::AlreadyRecorded;
        }

        if !self.params.expected.contains(subject_id) {
            if self.unexpected_seen.insert(subject_id.to_string()) {
                log_warn!(
                    "Subject {subject_id} is not expected for schedule {}; ignoring",
                    self.params.session.schedule_id
                );
            }
            return Decision::NotExpected;
        }

        let outcome = self
            .recorder
            .record_present(
                self.params.session,
                subject_id,
                captured_at,
                image_path.map(str::to_string),
            )
            .await;

        match outcome {
            Ok(PresentOutcome::Recorded) => {
                self.params.processed.insert(subject_id.to_string());
                log_info!(
                    "Recorded {subject_id} present for schedule {} (score {confidence:.1})",
                    self.params.session.schedule_id
                );
                Decision::Recorded
            }
            Ok(PresentOutcome::AlreadyRecorded) => {
                self.params.processed.insert(subject_id.to_string());
                Decision::AlreadyRecorded
            }
            Err(err) => {
                log_error!("Failed to record {subject_id} present: {err:#}");
                Decision::PersistFailed
            }
        }
    }
}
