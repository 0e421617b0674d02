use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u64},
    models::{RosterPopulation, Schedule, Subject},
};

fn row_to_subject(row: &Row) -> Result<Subject> {
    let created_at: String = row.get("created_at")?;

    Ok(Subject {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn row_to_schedule(row: &Row) -> Result<Schedule> {
    let created_at: String = row.get("created_at")?;

    Ok(Schedule {
        id: row.get("id")?,
        title: row.get("title")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Register a subject. Fails if the id is already taken.
    pub async fn insert_subject(
        &self,
        subject_id: &str,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let subject_id = subject_id.to_string();
        let name = name.to_string();
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO subjects (id, name, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO NOTHING",
                params![subject_id, name, created_at.to_rfc3339()],
            )?;
            if inserted == 0 {
                bail!("subject {subject_id} is already registered");
            }
            Ok(())
        })
        .await
    }

    pub async fn get_subject(&self, subject_id: &str) -> Result<Option<Subject>> {
        let subject_id = subject_id.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, created_at FROM subjects WHERE id = ?1")?;
            let mut rows = stmt.query(params![subject_id])?;
            let subject = match rows.next()? {
                Some(row) => Some(row_to_subject(row)?),
                None => None,
            };
            Ok(subject)
        })
        .await
    }

    pub async fn insert_schedule(
        &self,
        schedule_id: &str,
        title: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO schedules (id, title, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO NOTHING",
                params![schedule_id, title, created_at.to_rfc3339()],
            )?;
            if inserted == 0 {
                bail!("schedule {schedule_id} already exists");
            }
            Ok(())
        })
        .await
    }

    pub async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, title, created_at FROM schedules WHERE id = ?1")?;
            let mut rows = stmt.query(params![schedule_id])?;
            let schedule = match rows.next()? {
                Some(row) => Some(row_to_schedule(row)?),
                None => None,
            };
            Ok(schedule)
        })
        .await
    }

    /// Explicitly register one expected attendee. Re-registering is a no-op;
    /// returns whether a row was written.
    pub async fn add_expected_attendee(
        &self,
        schedule_id: &str,
        subject_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool> {
        let schedule_id = schedule_id.to_string();
        let subject_id = subject_id.to_string();
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO expected_attendees (schedule_id, subject_id, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(schedule_id, subject_id) DO NOTHING",
                params![schedule_id, subject_id, created_at.to_rfc3339()],
            )?;
            Ok(inserted > 0)
        })
        .await
    }

    /// Enroll every registered subject into the schedule's roster, but only
    /// when the roster is still empty. Existence check, count and bulk insert
    /// share one transaction, so either the whole roster lands or none of it.
    pub async fn populate_roster_if_empty(
        &self,
        schedule_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<RosterPopulation> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let schedule_exists = tx
                .query_row(
                    "SELECT 1 FROM schedules WHERE id = ?1",
                    params![schedule_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            if !schedule_exists {
                return Ok(RosterPopulation::ScheduleMissing);
            }

            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM expected_attendees WHERE schedule_id = ?1",
                params![schedule_id],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Ok(RosterPopulation::Existing(to_u64(existing, "roster size")?));
            }

            let subject_ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM subjects ORDER BY id ASC")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<_, _>>()?
            };
            if subject_ids.is_empty() {
                return Ok(RosterPopulation::RegistryEmpty);
            }

            {
                let mut insert = tx.prepare(
                    "INSERT INTO expected_attendees (schedule_id, subject_id, created_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(schedule_id, subject_id) DO NOTHING",
                )?;
                let created_at = created_at.to_rfc3339();
                for subject_id in &subject_ids {
                    insert.execute(params![schedule_id, subject_id, created_at])?;
                }
            }

            tx.commit()?;
            Ok(RosterPopulation::Populated(subject_ids.len() as u64))
        })
        .await
    }

    pub async fn expected_subject_ids(&self, schedule_id: &str) -> Result<Vec<String>> {
        let schedule_id = schedule_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT subject_id FROM expected_attendees
                 WHERE schedule_id = ?1
                 ORDER BY subject_id ASC",
            )?;
            let rows = stmt.query_map(params![schedule_id], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}
