use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_attendance_status, parse_datetime, parse_optional_datetime, to_u64},
    models::{
        AttendanceRecord, AttendanceStatus, NewAttendanceRecord, NoteOutcome, ReportRow,
        SubjectStats,
    },
};

fn row_to_record(row: &Row) -> Result<AttendanceRecord> {
    let recorded_at: String = row.get("recorded_at")?;
    let status: String = row.get("status")?;

    Ok(AttendanceRecord {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        schedule_id: row.get("schedule_id")?,
        subject_id: row.get("subject_id")?,
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
        status: parse_attendance_status(&status)?,
        note: row.get("note")?,
        image_path: row.get("image_path")?,
    })
}

fn row_to_report(row: &Row) -> Result<ReportRow> {
    let status: Option<String> = row.get("status")?;
    let recorded_at: Option<String> = row.get("recorded_at")?;

    Ok(ReportRow {
        subject_id: row.get("subject_id")?,
        subject_name: row.get("subject_name")?,
        status: status.as_deref().map(parse_attendance_status).transpose()?,
        recorded_at: parse_optional_datetime(recorded_at, "recorded_at")?,
        note: row.get("note")?,
    })
}

fn find_record(
    conn: &Connection,
    schedule_id: &str,
    subject_id: &str,
) -> Result<Option<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, schedule_id, subject_id, recorded_at, status, note, image_path
         FROM attendance_records
         WHERE schedule_id = ?1 AND subject_id = ?2",
    )?;
    let mut rows = stmt.query(params![schedule_id, subject_id])?;
    let record = match rows.next()? {
        Some(row) => Some(row_to_record(row)?),
        None => None,
    };
    Ok(record)
}

fn insert_if_absent(conn: &Connection, record: &NewAttendanceRecord) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT INTO attendance_records (session_id, schedule_id, subject_id, recorded_at, status, note, image_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(schedule_id, subject_id) DO NOTHING",
            params![
                record.session_id,
                record.schedule_id,
                record.subject_id,
                record.recorded_at.to_rfc3339(),
                record.status.as_str(),
                record.note,
                record.image_path,
            ],
        )
        .with_context(|| {
            format!(
                "failed to insert {} record for subject {}",
                record.status.as_str(),
                record.subject_id
            )
        })?;
    Ok(inserted > 0)
}

impl Database {
    pub async fn find_attendance_record(
        &self,
        schedule_id: &str,
        subject_id: &str,
    ) -> Result<Option<AttendanceRecord>> {
        let schedule_id = schedule_id.to_string();
        let subject_id = subject_id.to_string();
        self.execute(move |conn| find_record(conn, &schedule_id, &subject_id))
            .await
    }

    /// Write the record unless the subject already has one for this schedule.
    /// The lookup and the conflict-ignoring insert run in the same DB task,
    /// so the stored row always wins over a later write. Returns whether a
    /// row was written.
    pub async fn insert_attendance_if_absent(&self, record: &NewAttendanceRecord) -> Result<bool> {
        let record = record.clone();
        self.execute(move |conn| {
            if find_record(conn, &record.schedule_id, &record.subject_id)?.is_some() {
                return Ok(false);
            }
            insert_if_absent(conn, &record)
        })
        .await
    }

    pub async fn present_subject_ids(&self, schedule_id: &str) -> Result<Vec<String>> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT subject_id FROM attendance_records
                 WHERE schedule_id = ?1 AND status = 'Present'
                 ORDER BY recorded_at ASC",
            )?;
            let rows = stmt.query_map(params![schedule_id], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    pub async fn records_for_schedule(&self, schedule_id: &str) -> Result<Vec<AttendanceRecord>> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, schedule_id, subject_id, recorded_at, status, note, image_path
                 FROM attendance_records
                 WHERE schedule_id = ?1
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query(params![schedule_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Newest first.
    pub async fn records_for_subject(&self, subject_id: &str) -> Result<Vec<AttendanceRecord>> {
        let subject_id = subject_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, schedule_id, subject_id, recorded_at, status, note, image_path
                 FROM attendance_records
                 WHERE subject_id = ?1
                 ORDER BY recorded_at DESC, id DESC",
            )?;

            let mut rows = stmt.query(params![subject_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Roster of a schedule joined with whatever has been recorded so far.
    pub async fn attendance_report(&self, schedule_id: &str) -> Result<Vec<ReportRow>> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ea.subject_id AS subject_id,
                        s.name AS subject_name,
                        ar.status AS status,
                        ar.recorded_at AS recorded_at,
                        ar.note AS note
                 FROM expected_attendees ea
                 JOIN subjects s ON s.id = ea.subject_id
                 LEFT JOIN attendance_records ar
                        ON ar.schedule_id = ea.schedule_id AND ar.subject_id = ea.subject_id
                 WHERE ea.schedule_id = ?1
                 ORDER BY ea.subject_id ASC",
            )?;

            let mut rows = stmt.query(params![schedule_id])?;
            let mut report = Vec::new();
            while let Some(row) = rows.next()? {
                report.push(row_to_report(row)?);
            }
            Ok(report)
        })
        .await
    }

    pub async fn subject_stats(&self, subject_id: &str) -> Result<SubjectStats> {
        let subject_id = subject_id.to_string();
        self.execute(move |conn| {
            let expected: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT schedule_id) FROM expected_attendees WHERE subject_id = ?1",
                params![subject_id],
                |row| row.get(0),
            )?;
            let (present, absent): (i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(status = 'Present'), 0),
                        COALESCE(SUM(status = 'Absent'), 0)
                 FROM attendance_records
                 WHERE subject_id = ?1",
                params![subject_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(SubjectStats::new(
                to_u64(expected, "expected")?,
                to_u64(present, "present")?,
                to_u64(absent, "absent")?,
            ))
        })
        .await
    }

    /// Amend the note on a subject's record for a schedule. When nothing was
    /// recorded yet, an Absent row carrying the note is created instead.
    pub async fn upsert_attendance_note(
        &self,
        schedule_id: &str,
        subject_id: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<NoteOutcome> {
        let schedule_id = schedule_id.to_string();
        let subject_id = subject_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE attendance_records SET note = ?1
                 WHERE schedule_id = ?2 AND subject_id = ?3",
                params![note, schedule_id, subject_id],
            )?;
            if updated > 0 {
                tx.commit()?;
                return Ok(NoteOutcome::Updated);
            }

            let session_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM attendance_sessions WHERE schedule_id = ?1",
                    params![schedule_id],
                    |row| row.get(0),
                )
                .optional()?;

            let record = NewAttendanceRecord {
                session_id,
                schedule_id,
                subject_id,
                recorded_at: now,
                status: AttendanceStatus::Absent,
                note,
                image_path: None,
            };
            insert_if_absent(&tx, &record)?;
            tx.commit()?;
            Ok(NoteOutcome::InsertedAbsent)
        })
        .await
    }
}
