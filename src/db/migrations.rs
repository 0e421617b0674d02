use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Bring the schema up to date. Each step commits together with its
/// `user_version` bump, so an interrupted upgrade resumes where it stopped.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version = schema_version(conn)?;
    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        );
    }

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate().skip(version.max(0) as usize) {
        let target = index as i32 + 1;
        let tx = conn
            .transaction()
            .with_context(|| format!("failed to open transaction for {name}"))?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to execute {name}"))?;
        tx.pragma_update(None, "user_version", target)
            .context("failed to update user_version pragma")?;
        tx.commit()
            .with_context(|| format!("failed to commit migration to version {target}"))?;
    }

    Ok(())
}
