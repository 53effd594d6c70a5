// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL-mode connection setup and schema migration (`spec.md` sections 4.1, 6).

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;

/// Current schema version. Bump and add a branch to [`migrate`] when the
/// table layout changes; never edit a past migration in place.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Open (or create) the database file, apply connection-level pragmas, and
/// run forward migrations. Aborts (returns `Err`) rather than silently
/// downgrading if the on-disk schema is newer than this binary understands.
pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
    migrate(&conn)?;
    Ok(conn)
}

pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS SchemaVersions (
            version INTEGER PRIMARY KEY,
            applied_utc TEXT NOT NULL
        );",
    )?;

    let found: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM SchemaVersions", [], |row| row.get(0))
        .unwrap_or(None);

    match found {
        None => apply_v1(conn)?,
        Some(v) if v == CURRENT_SCHEMA_VERSION => {}
        Some(v) if v < CURRENT_SCHEMA_VERSION => {
            return Err(StoreError::CorruptRow(format!(
                "no migration path defined from schema version {v} to {CURRENT_SCHEMA_VERSION}"
            )));
        }
        Some(v) => {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: v,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
    }
    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE FileJobs (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            initial_size INTEGER NOT NULL,
            source_hash TEXT,
            state TEXT NOT NULL,
            version_token INTEGER NOT NULL,
            created_utc TEXT NOT NULL,
            updated_utc TEXT NOT NULL,
            verification_completed_utc TEXT,
            source_deleted_utc TEXT
        );
        CREATE INDEX idx_filejobs_state ON FileJobs(state);

        CREATE TABLE TargetOutcomes (
            job_id TEXT NOT NULL REFERENCES FileJobs(id),
            target_id TEXT NOT NULL,
            copy_state TEXT NOT NULL,
            copy_state_detail TEXT,
            attempts INTEGER NOT NULL,
            verified_hash TEXT,
            temp_path TEXT,
            final_path TEXT,
            last_error TEXT,
            bytes_copied INTEGER NOT NULL,
            last_transition_utc TEXT NOT NULL,
            PRIMARY KEY (job_id, target_id)
        );

        CREATE TABLE StateChangeLog (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            entity_kind TEXT NOT NULL,
            entity_id TEXT,
            old_state TEXT,
            new_state TEXT NOT NULL,
            utc TEXT NOT NULL,
            duration_ms INTEGER,
            context_json TEXT
        );
        CREATE INDEX idx_statechangelog_job ON StateChangeLog(job_id);
        CREATE INDEX idx_statechangelog_utc ON StateChangeLog(utc);

        INSERT INTO SchemaVersions (version, applied_utc) VALUES (1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
        ",
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
