use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_session_status},
    models::{AttendanceSession, SessionStatus},
};

fn row_to_session(row: &Row) -> Result<AttendanceSession> {
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let status: String = row.get("status")?;

    Ok(AttendanceSession {
        id: row.get("id")?,
        schedule_id: row.get("schedule_id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        status: parse_session_status(&status)?,
        completed_at: parse_optional_datetime(completed_at, "completed_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Persist a freshly opened session. The UNIQUE constraint on
    /// `schedule_id` rejects a second session for the same schedule.
    pub async fn insert_session(&self, session: &AttendanceSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO attendance_sessions (id, schedule_id, started_at, status, completed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.schedule_id,
                    record.started_at.to_rfc3339(),
                    record.status.as_str(),
                    record.completed_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| {
                format!("failed to insert session for schedule {}", record.schedule_id)
            })?;
            Ok(())
        })
        .await
    }

    pub async fn get_session_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Option<AttendanceSession>> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, schedule_id, started_at, status, completed_at, created_at, updated_at
                 FROM attendance_sessions
                 WHERE schedule_id = ?1",
            )?;

            let mut rows = stmt.query(params![schedule_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    /// Open -> Completed. Returns the number of rows moved, which is zero when
    /// the session is missing or already completed.
    pub async fn mark_session_completed(
        &self,
        schedule_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<usize> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE attendance_sessions
                 SET status = ?1,
                     completed_at = ?2,
                     updated_at = ?2
                 WHERE schedule_id = ?3 AND status = ?4",
                params![
                    SessionStatus::Completed.as_str(),
                    completed_at.to_rfc3339(),
                    schedule_id,
                    SessionStatus::Open.as_str(),
                ],
            )?;
            Ok(rows_affected)
        })
        .await
    }

    pub async fn list_open_sessions(&self) -> Result<Vec<AttendanceSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, schedule_id, started_at, status, completed_at, created_at, updated_at
                 FROM attendance_sessions
                 WHERE status = 'Open'
                 ORDER BY started_at DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }
}
