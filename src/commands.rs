use std::{
    fs,
    process::ExitCode,
    sync::{Arc, Mutex},
};

use tokio_util::sync::CancellationToken;

use crate::{
    cli::{Cli, Command, ScheduleAction, SubjectAction},
    db::{Database, NoteOutcome},
    error::{AttendanceError, AttendanceResult},
    recognition::{
        FsImageSink, FullFrameDetector, GalleryClassifier, RecognitionRig, SpoolFrameSource,
        StopReason,
    },
    session::{AttendanceController, SessionPolicy, SessionReport},
    settings::Settings,
    utils::{Clock, SystemClock},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Exit status after a session that stopped on a camera failure or could not
/// be completed.
pub const EXIT_ABNORMAL_STOP: u8 = 2;

pub async fn dispatch(cli: Cli) -> AttendanceResult<ExitCode> {
    let mut settings = Settings::load(&cli.config)?;
    if let Some(database) = cli.database {
        settings.database_path = database;
    }

    let db = Database::new(settings.database_path.clone())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Run { schedule } => run_schedule(&settings, db, clock, &schedule).await,
        Command::Report { schedule } => {
            print_report(&db, &schedule).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::History { subject } => {
            print_history(&db, &subject).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Note {
            schedule,
            subject,
            text,
        } => {
            amend_note(&db, clock.as_ref(), &schedule, &subject, text).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Subject {
            action: SubjectAction::Add { id, name },
        } => {
            db.insert_subject(&id, &name, clock.now()).await?;
            println!("Registered subject {id} ({name})");
            Ok(ExitCode::SUCCESS)
        }
        Command::Schedule {
            action: ScheduleAction::Add { id, title },
        } => {
            db.insert_schedule(&id, title, clock.now()).await?;
            println!("Created schedule {id}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_schedule(
    settings: &Settings,
    db: Database,
    clock: Arc<dyn Clock>,
    schedule_id: &str,
) -> AttendanceResult<ExitCode> {
    // Everything that can fail without touching the schedule happens first.
    let classifier = GalleryClassifier::load(&settings.model_path, &settings.labels_path)?;
    log_info!(
        "Loaded trained model: {} samples, {} labelled subjects",
        classifier.sample_count(),
        classifier.subject_count()
    );

    fs::create_dir_all(&settings.captured_dir).map_err(|err| {
        AttendanceError::Config(format!(
            "cannot create capture directory {}: {err}",
            settings.captured_dir.display()
        ))
    })?;
    let source = SpoolFrameSource::open(&settings.frames_dir)?;
    let detector = FullFrameDetector::new(settings.min_face_fraction);
    let sink = FsImageSink;

    let controller = AttendanceController::new(
        db,
        clock,
        SessionPolicy {
            confidence_threshold: settings.confidence_threshold,
            session_duration: settings.session_duration(),
            frame_wait: settings.frame_wait(),
            captured_dir: settings.captured_dir.clone(),
            absence_note: settings.absence_note.clone(),
        },
    );

    if let Err(err) = controller.stale_sessions().await {
        log_warn!("Could not check for abandoned sessions: {err}");
    }

    let cancel_token = CancellationToken::new();
    let interrupt = tokio::spawn({
        let token = cancel_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log_info!("Interrupt received; stopping recognition");
                token.cancel();
            }
        }
    });

    let mut rig = RecognitionRig {
        source: Arc::new(Mutex::new(source)),
        detector: Arc::new(detector),
        classifier: Arc::new(classifier),
        sink: Arc::new(sink),
        observer: None,
    };
    let result = controller
        .run_session(schedule_id, &mut rig, &cancel_token)
        .await;
    interrupt.abort();

    let report = result?;
    print_session_report(&report);

    Ok(ExitCode::from(session_exit_status(&report)))
}

/// `EXIT_ABNORMAL_STOP` when the camera failed or the session is still open.
pub fn session_exit_status(report: &SessionReport) -> u8 {
    if report.source_failed() || !report.finalized {
        EXIT_ABNORMAL_STOP
    } else {
        0
    }
}

fn print_session_report(report: &SessionReport) {
    println!(
        "Schedule {} session {} ({})",
        report.session.schedule_id,
        report.session.id,
        if report.resumed { "resumed" } else { "new" }
    );
    println!("  expected attendees: {}", report.roster.expected());

    match &report.loop_summary {
        Some(summary) => {
            let stop = match &summary.stop_reason {
                StopReason::DeadlineReached => "deadline reached".to_string(),
                StopReason::Cancelled => "stopped by operator".to_string(),
                StopReason::SourceFailed(reason) => format!("camera failed: {reason}"),
            };
            println!("  recognition: {stop}");
            println!(
                "  frames {}, faces {}, recorded {}, repeats {}, rejected {}, unidentified {}, unexpected {}, failed writes {}",
                summary.frames,
                summary.regions,
                summary.recorded,
                summary.duplicates,
                summary.rejected,
                summary.unidentified,
                summary.unexpected,
                summary.persist_failures
            );
        }
        None => println!("  recognition: skipped, deadline {} had passed", report.deadline.to_rfc3339()),
    }

    match &report.absences {
        Some(absences) => {
            println!("  marked absent: {}", absences.recorded.len());
            if !absences.failed.is_empty() {
                println!("  absent writes failed for: {}", absences.failed.join(", "));
            }
        }
        None => println!("  absence pass did not run"),
    }

    if report.finalized {
        println!("  session completed");
    } else {
        println!("  session left open; run the schedule again to finish it");
    }
}

async fn print_report(db: &Database, schedule_id: &str) -> AttendanceResult<()> {
    let schedule = db
        .get_schedule(schedule_id)
        .await?
        .ok_or_else(|| AttendanceError::NotFound(format!("schedule {schedule_id}")))?;

    match &schedule.title {
        Some(title) => println!("{} - {}", schedule.id, title),
        None => println!("{}", schedule.id),
    }

    let rows = db.attendance_report(schedule_id).await?;
    if rows.is_empty() {
        println!("  no expected attendees");
        return Ok(());
    }

    for row in rows {
        let status = row
            .status
            .map(|status| status.as_str())
            .unwrap_or("Not checked");
        let recorded_at = row
            .recorded_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "  {:<12} {:<28} {:<12} {:<20} {}",
            row.subject_id,
            row.subject_name,
            status,
            recorded_at,
            row.note.unwrap_or_default()
        );
    }
    Ok(())
}

async fn print_history(db: &Database, subject_id: &str) -> AttendanceResult<()> {
    let subject = db
        .get_subject(subject_id)
        .await?
        .ok_or_else(|| AttendanceError::NotFound(format!("subject {subject_id}")))?;

    let stats = db.subject_stats(subject_id).await?;
    println!("{} ({})", subject.name, subject.id);
    println!(
        "  expected {}, present {}, absent {}, rate {:.1}%",
        stats.expected, stats.present, stats.absent, stats.rate
    );

    for record in db.records_for_subject(subject_id).await? {
        println!(
            "  {:<12} {:<8} {:<20} {}",
            record.schedule_id,
            record.status.as_str(),
            record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            record.note.unwrap_or_default()
        );
    }
    Ok(())
}

async fn amend_note(
    db: &Database,
    clock: &dyn Clock,
    schedule_id: &str,
    subject_id: &str,
    text: String,
) -> AttendanceResult<()> {
    if db.get_schedule(schedule_id).await?.is_none() {
        return Err(AttendanceError::NotFound(format!("schedule {schedule_id}")));
    }
    if db.get_subject(subject_id).await?.is_none() {
        return Err(AttendanceError::NotFound(format!("subject {subject_id}")));
    }

    let note = Some(text).filter(|text| !text.trim().is_empty());
    match db
        .upsert_attendance_note(schedule_id, subject_id, note, clock.now())
        .await?
    {
        NoteOutcome::Updated => println!("Updated note for {subject_id} on {schedule_id}"),
        NoteOutcome::InsertedAbsent => {
            println!("No record for {subject_id} on {schedule_id}; recorded absent with note")
        }
    }
    Ok(())
}
