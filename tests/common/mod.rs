#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use image::DynamicImage;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use rollcall_lib::{
    db::{AttendanceRecord, AttendanceStatus, Database},
    error::{AttendanceError, AttendanceResult},
    recognition::{
        BoundingBox, Classification, Classifier, Decision, FaceDetector, Frame, FrameSource,
        ImageSink, RecognitionEvent, RecognitionObserver, RecognitionRig,
    },
    session::{AttendanceController, SessionPolicy, SessionReport},
    utils::Clock,
};

pub const SCHEDULE: &str = "LH01";

pub fn class_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 7, 0, 0).unwrap()
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn identified(subject_id: &str, confidence: f64) -> Classification {
    Classification::Identified {
        subject_id: subject_id.to_string(),
        confidence,
    }
}

pub fn unidentified(confidence: f64) -> Classification {
    Classification::Unidentified { confidence }
}

pub enum Step {
    /// A frame with one face region per classification.
    Frame(Vec<Classification>),
    Fail,
}

/// Shared script driving the fake source, detector and classifier. Every
/// delivered frame advances the clock by `frame_interval`; once the steps run
/// out the source either repeats `repeat` forever or idles for the full wait.
pub struct Script {
    clock: Arc<ManualClock>,
    steps: VecDeque<Step>,
    repeat: Option<Vec<Classification>>,
    frame_interval: Duration,
    pending: VecDeque<Classification>,
    pub waits: Vec<Duration>,
    pub delivered: usize,
}

pub type SharedScript = Arc<Mutex<Script>>;

impl Script {
    pub fn shared(clock: Arc<ManualClock>, steps: Vec<Step>) -> SharedScript {
        Arc::new(Mutex::new(Self {
            clock,
            steps: steps.into(),
            repeat: None,
            frame_interval: Duration::from_secs(1),
            pending: VecDeque::new(),
            waits: Vec::new(),
            delivered: 0,
        }))
    }

    pub fn repeating(clock: Arc<ManualClock>, faces: Vec<Classification>) -> SharedScript {
        let script = Self::shared(clock, Vec::new());
        script.lock().unwrap().repeat = Some(faces);
        script
    }

    /// Clock advance per delivered frame; zero puts frames in the same instant.
    pub fn with_frame_interval(script: SharedScript, interval: Duration) -> SharedScript {
        script.lock().unwrap().frame_interval = interval;
        script
    }

    fn deliver(&mut self, faces: Vec<Classification>) -> Frame {
        self.clock.advance(self.frame_interval);
        self.delivered += 1;
        self.pending = faces.into();
        Frame::with_origin(DynamicImage::new_luma8(64, 64), format!("frame_{:04}", self.delivered))
    }
}

pub struct ScriptedSource(pub SharedScript);

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self, wait: Duration) -> AttendanceResult<Option<Frame>> {
        let mut script = self.0.lock().unwrap();
        script.waits.push(wait);

        match script.steps.pop_front() {
            Some(Step::Frame(faces)) => Ok(Some(script.deliver(faces))),
            Some(Step::Fail) => Err(AttendanceError::SourceUnavailable(
                "camera unplugged".into(),
            )),
            None => match script.repeat.clone() {
                Some(faces) => Ok(Some(script.deliver(faces))),
                None => {
                    script.clock.advance(wait);
                    Ok(None)
                }
            },
        }
    }
}

pub struct ScriptedDetector(pub SharedScript);

impl FaceDetector for ScriptedDetector {
    fn detect_regions(&self, _frame: &Frame) -> Vec<BoundingBox> {
        let count = self.0.lock().unwrap().pending.len();
        (0..count).map(|_| BoundingBox::new(0, 0, 64, 64)).collect()
    }
}

pub struct ScriptedClassifier(pub SharedScript);

impl Classifier for ScriptedClassifier {
    fn classify(&self, _face: &DynamicImage) -> Classification {
        self.0
            .lock()
            .unwrap()
            .pending
            .pop_front()
            .unwrap_or(Classification::Unidentified { confidence: 100.0 })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub fail: bool,
    pub saved: Mutex<Vec<PathBuf>>,
}

impl ImageSink for RecordingSink {
    fn save(&self, _image: &DynamicImage, path: &Path) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("disk full"));
        }
        self.saved.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub struct CollectingObserver {
    pub decisions: Vec<(Option<String>, Decision)>,
}

impl RecognitionObserver for CollectingObserver {
    fn on_event(&mut self, event: &RecognitionEvent, decision: Decision) {
        self.decisions
            .push((event.classification.subject_id().map(str::to_string), decision));
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub policy: SessionPolicy,
}

pub struct RunResult {
    pub report: AttendanceResult<SessionReport>,
    pub decisions: Vec<(Option<String>, Decision)>,
    pub saved: Vec<PathBuf>,
}

impl Harness {
    /// Empty store: no subjects, no schedules.
    pub async fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("rollcall.sqlite3")).unwrap();
        let captured_dir = dir.path().join("Captured");
        std::fs::create_dir_all(&captured_dir).unwrap();

        Self {
            db,
            clock: Arc::new(ManualClock::new(class_start())),
            policy: SessionPolicy {
                confidence_threshold: 75.0,
                session_duration: chrono::Duration::minutes(15),
                frame_wait: Duration::from_millis(200),
                captured_dir,
                absence_note: "Unexcused absence".into(),
            },
            dir,
        }
    }

    /// Subjects A, B and C registered and schedule LH01 created.
    pub async fn seeded() -> Self {
        let harness = Self::empty().await;
        for (id, name) in [("A", "Alice"), ("B", "Bao"), ("C", "Chidi")] {
            harness.db.insert_subject(id, name, class_start()).await.unwrap();
        }
        harness
            .db
            .insert_schedule(SCHEDULE, Some("Lecture 1".into()), class_start())
            .await
            .unwrap();
        harness
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn controller(&self) -> AttendanceController {
        AttendanceController::new(self.db.clone(), self.clock(), self.policy.clone())
    }

    pub fn script(&self, steps: Vec<Step>) -> SharedScript {
        Script::shared(self.clock.clone(), steps)
    }

    pub async fn run(&self, script: &SharedScript) -> RunResult {
        self.run_with(script, RecordingSink::default(), &CancellationToken::new())
            .await
    }

    pub async fn run_with(
        &self,
        script: &SharedScript,
        sink: RecordingSink,
        cancel_token: &CancellationToken,
    ) -> RunResult {
        let sink = Arc::new(sink);
        let mut observer = CollectingObserver::default();

        let report = {
            let mut rig = RecognitionRig {
                source: Arc::new(Mutex::new(ScriptedSource(script.clone()))),
                detector: Arc::new(ScriptedDetector(script.clone())),
                classifier: Arc::new(ScriptedClassifier(script.clone())),
                sink: sink.clone(),
                observer: Some(&mut observer),
            };
            self.controller()
                .run_session(SCHEDULE, &mut rig, cancel_token)
                .await
        };

        let saved = sink.saved.lock().unwrap().clone();
        RunResult {
            report,
            decisions: observer.decisions,
            saved,
        }
    }

    pub async fn records(&self) -> Vec<AttendanceRecord> {
        self.db.records_for_schedule(SCHEDULE).await.unwrap()
    }

    pub async fn status_of(&self, subject_id: &str) -> Option<AttendanceStatus> {
        self.db
            .find_attendance_record(SCHEDULE, subject_id)
            .await
            .unwrap()
            .map(|record| record.status)
    }

    async fn exec(&self, sql: String) {
        self.db
            .execute(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .unwrap();
    }

    /// Make SQLite reject inserts matching `condition` on attendance rows.
    pub async fn fail_inserts_when(&self, condition: &str) {
        self.exec(format!(
            "CREATE TRIGGER reject_attendance BEFORE INSERT ON attendance_records
             WHEN {condition}
             BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;"
        ))
        .await;
    }

    /// Make SQLite reject moving any session to Completed.
    pub async fn fail_session_completion(&self) {
        self.exec(
            "CREATE TRIGGER reject_completion BEFORE UPDATE ON attendance_sessions
             WHEN NEW.status = 'Completed'
             BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;"
                .to_string(),
        )
        .await;
    }

    pub async fn allow_session_completion(&self) {
        self.exec("DROP TRIGGER reject_completion".to_string()).await;
    }

    /// Store a roster row whose subject id is a blob, which the roster query
    /// cannot decode as text.
    pub async fn corrupt_roster(&self) {
        self.exec(format!(
            "PRAGMA foreign_keys = OFF;
             INSERT INTO expected_attendees (schedule_id, subject_id, created_at)
             VALUES ('{SCHEDULE}', X'00FF', '{}');
             PRAGMA foreign_keys = ON;",
            class_start().to_rfc3339()
        ))
        .await;
    }

    pub async fn repair_roster(&self) {
        self.exec(format!(
            "DELETE FROM expected_attendees
             WHERE schedule_id = '{SCHEDULE}' AND typeof(subject_id) = 'blob';"
        ))
        .await;
    }
}
