mod common;

use std::time::Duration;

use rollcall_lib::{
    db::{AttendanceStatus, NoteOutcome, SubjectStats},
    error::AttendanceError,
    session::{RosterOutcome, RosterResolver, SessionFinalizer, SessionManager},
};

use common::{class_start, identified, Harness, Step, SCHEDULE};

#[tokio::test]
async fn roster_is_populated_once_from_the_registry() {
    let harness = Harness::seeded().await;
    let roster = RosterResolver::new(harness.db.clone(), harness.clock());

    assert_eq!(roster.ensure_roster(SCHEDULE).await.unwrap(), RosterOutcome::Populated(3));

    // A subject registered later is not synced into an existing roster.
    harness.db.insert_subject("D", "Dana", class_start()).await.unwrap();
    assert_eq!(roster.ensure_roster(SCHEDULE).await.unwrap(), RosterOutcome::Existing(3));

    assert_eq!(
        harness.db.expected_subject_ids(SCHEDULE).await.unwrap(),
        vec!["A", "B", "C"]
    );
}

#[tokio::test]
async fn unknown_schedule_is_not_found_and_opens_nothing() {
    let harness = Harness::seeded().await;
    let roster = RosterResolver::new(harness.db.clone(), harness.clock());

    let err = roster.ensure_roster("LH99").await.unwrap_err();
    assert!(matches!(err, AttendanceError::NotFound(_)));
    assert!(err.is_fatal_setup());

    let sessions = SessionManager::new(
        harness.db.clone(),
        harness.clock(),
        chrono::Duration::minutes(15),
    );
    assert!(matches!(
        sessions.start_or_resume("LH99").await,
        Err(AttendanceError::NotFound(_))
    ));
    assert!(harness.db.list_open_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_registry_cannot_build_a_roster() {
    let harness = Harness::empty().await;
    harness
        .db
        .insert_schedule(SCHEDULE, None, class_start())
        .await
        .unwrap();

    let run = harness.run(&harness.script(Vec::new())).await;
    assert!(matches!(run.report, Err(AttendanceError::EmptyRegistry)));
    assert!(harness
        .db
        .get_session_for_schedule(SCHEDULE)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn start_or_resume_returns_the_same_open_session() {
    let harness = Harness::seeded().await;
    let sessions = SessionManager::new(
        harness.db.clone(),
        harness.clock(),
        chrono::Duration::minutes(15),
    );

    let (first, created) = sessions.start_or_resume(SCHEDULE).await.unwrap();
    assert!(created);
    assert_eq!(
        sessions.deadline(&first),
        class_start() + chrono::Duration::minutes(15)
    );

    harness.clock.advance(Duration::from_secs(90));
    let (second, created) = sessions.start_or_resume(SCHEDULE).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);
    assert_eq!(second.started_at, first.started_at);
}

#[tokio::test]
async fn finalizer_runs_exactly_once() {
    let harness = Harness::seeded().await;
    let finalizer = SessionFinalizer::new(harness.db.clone(), harness.clock());

    assert!(matches!(
        finalizer.complete(SCHEDULE).await,
        Err(AttendanceError::NotFound(_))
    ));

    SessionManager::new(harness.db.clone(), harness.clock(), chrono::Duration::minutes(15))
        .start_or_resume(SCHEDULE)
        .await
        .unwrap();

    let completed = finalizer.complete(SCHEDULE).await.unwrap();
    assert!(!completed.is_open());
    assert!(matches!(
        finalizer.complete(SCHEDULE).await,
        Err(AttendanceError::SessionClosed(_))
    ));
}

#[tokio::test]
async fn completed_session_rows_are_immutable() {
    let harness = Harness::seeded().await;
    harness.run(&harness.script(Vec::new())).await.report.unwrap();

    let result = harness
        .db
        .execute(|conn| {
            conn.execute(
                "UPDATE attendance_sessions SET status = 'Open' WHERE schedule_id = ?1",
                [SCHEDULE],
            )?;
            Ok(())
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn report_lists_the_roster_with_unchecked_subjects() {
    let harness = Harness::seeded().await;
    for subject in ["A", "B", "C"] {
        harness
            .db
            .add_expected_attendee(SCHEDULE, subject, class_start())
            .await
            .unwrap();
    }
    harness
        .db
        .upsert_attendance_note(SCHEDULE, "B", Some("Sick leave".into()), class_start())
        .await
        .unwrap();

    let rows = harness.db.attendance_report(SCHEDULE).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].subject_name, "Alice");
    assert_eq!(rows[0].status, None);
    assert_eq!(rows[1].status, Some(AttendanceStatus::Absent));
    assert_eq!(rows[1].note.as_deref(), Some("Sick leave"));
    assert_eq!(rows[2].status, None);
}

#[tokio::test]
async fn note_updates_an_existing_record_in_place() {
    let harness = Harness::seeded().await;
    let script = harness.script(vec![Step::Frame(vec![identified("A", 12.0)])]);
    harness.run(&script).await.report.unwrap();

    let outcome = harness
        .db
        .upsert_attendance_note(SCHEDULE, "A", Some("Arrived late".into()), class_start())
        .await
        .unwrap();
    assert_eq!(outcome, NoteOutcome::Updated);

    let record = harness
        .db
        .find_attendance_record(SCHEDULE, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::Present);
    assert_eq!(record.note.as_deref(), Some("Arrived late"));
    assert_eq!(harness.records().await.len(), 3);
}

#[tokio::test]
async fn note_without_a_record_inserts_an_absence() {
    let harness = Harness::seeded().await;

    let outcome = harness
        .db
        .upsert_attendance_note(SCHEDULE, "C", Some("Family emergency".into()), class_start())
        .await
        .unwrap();
    assert_eq!(outcome, NoteOutcome::InsertedAbsent);

    let record = harness
        .db
        .find_attendance_record(SCHEDULE, "C")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::Absent);
    assert_eq!(record.session_id, None);
}

#[tokio::test]
async fn history_is_newest_first_with_rounded_rate() {
    let harness = Harness::seeded().await;
    for (schedule, offset_hours) in [("LH02", 24), ("LH03", 48)] {
        harness
            .db
            .insert_schedule(
                schedule,
                None,
                class_start() + chrono::Duration::hours(offset_hours),
            )
            .await
            .unwrap();
    }

    // LH01: A present.
    harness
        .run(&harness.script(vec![Step::Frame(vec![identified("A", 10.0)])]))
        .await
        .report
        .unwrap();

    // LH02: A absent. LH03: roster only, not run yet.
    harness.clock.advance(Duration::from_secs(24 * 3600));
    harness
        .db
        .upsert_attendance_note("LH02", "A", None, harness_now(&harness))
        .await
        .unwrap();
    harness
        .db
        .add_expected_attendee("LH02", "A", class_start())
        .await
        .unwrap();
    harness
        .db
        .add_expected_attendee("LH03", "A", class_start())
        .await
        .unwrap();

    let history = harness.db.records_for_subject("A").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].schedule_id, "LH02");
    assert_eq!(history[1].schedule_id, SCHEDULE);

    let stats = harness.db.subject_stats("A").await.unwrap();
    assert_eq!(stats, SubjectStats::new(3, 1, 1));
    assert_eq!(stats.rate, 33.3);
}

fn harness_now(harness: &Harness) -> chrono::DateTime<chrono::Utc> {
    use rollcall_lib::utils::Clock;
    harness.clock.now()
}
