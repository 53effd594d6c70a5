// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single-writer transition function (`spec.md` section 4.1).
//!
//! Every mutation to a Job or its TargetOutcomes goes through
//! [`Store::transition`] (or one of the named wrappers built on it below).
//! The mutex mirrors the teacher's single `Arc<Mutex<MaterializedState>>`
//! pattern, except the guarded state is a `rusqlite::Connection` rather
//! than an in-memory map: SQLite still enforces single-writer semantics
//! per connection, the mutex just keeps two Tokio tasks from interleaving
//! statements within one logical transaction.

use crate::error::StoreError;
use crate::rows::{copy_state_to_columns, job_from_row, target_from_row};
use chrono::Utc;
use forker_core::{invariants, Job, JobId, JobState, StateChangeEntry, TargetId, TargetOutcome};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Result of a single transition attempt (`spec.md` section 4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied { version_token: u64 },
    Conflict { current_token: u64 },
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<Self, StoreError> {
        let conn = crate::schema::open(path, busy_timeout_ms)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store for tests (`spec.md` test tooling, not a production path).
    #[cfg(any(test, feature = "test-support"))]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        crate::schema::migrate(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Admits a newly discovered, stable source file: inserts the Job
    /// (already in `Queued` state — admission and creation are atomic) and
    /// its two `Pending` TargetOutcomes.
    pub fn admit(&self, mut job: Job) -> Result<(), StoreError> {
        job.state = JobState::Queued;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO FileJobs (id, source_path, initial_size, source_hash, state,
                version_token, created_utc, updated_utc, verification_completed_utc, source_deleted_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id.as_str(),
                job.source_path.to_string_lossy(),
                job.initial_size as i64,
                job.source_hash.as_ref().map(|h| h.to_hex()),
                job.state.to_string(),
                job.version_token as i64,
                job.created_utc.to_rfc3339(),
                job.updated_utc.to_rfc3339(),
                job.verification_completed_utc.map(|t| t.to_rfc3339()),
                job.source_deleted_utc.map(|t| t.to_rfc3339()),
            ],
        )?;
        for target_id in Job::REQUIRED_TARGETS {
            let target = TargetOutcome::new(job.id, target_id, job.created_utc);
            insert_target(&conn, &target)?;
        }
        insert_log(
            &conn,
            &StateChangeEntry::for_job(job.id, None, job.state.to_string(), job.created_utc),
        )?;
        Ok(())
    }

    /// Direct connection access for read-only query helpers defined in
    /// sibling modules ([`crate::query`], [`crate::prune`]).
    pub(crate) fn conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    pub fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let conn = self.conn.lock();
        load_job(&conn, job_id)
    }

    pub fn get_targets(&self, job_id: JobId) -> Result<Vec<TargetOutcome>, StoreError> {
        let conn = self.conn.lock();
        load_targets(&conn, job_id)
    }

    /// Every Job not yet in a terminal state, for the startup recovery scan.
    pub fn list_non_terminal_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, source_path, initial_size, source_hash, state, version_token,
                    created_utc, updated_utc, verification_completed_utc, source_deleted_utc
             FROM FileJobs WHERE state NOT IN ('verified', 'quarantined', 'failed')",
        )?;
        let rows = stmt.query_map([], job_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The transition function (`spec.md` section 4.1): validates the
    /// caller's expected token within one transaction, applies `mutate`,
    /// re-checks every invariant relevant to the resulting state, and
    /// commits only if both checks pass.
    ///
    /// `mutate` receives the current Job and its two TargetOutcomes (in
    /// `TargetId::A`, `TargetId::B` order) and returns the updated values
    /// plus the log entry to append, or an [`forker_core::InvariantViolation`]
    /// to refuse the transition.
    pub fn transition(
        &self,
        job_id: JobId,
        expected_version_token: u64,
        mutate: impl FnOnce(
            Job,
            [TargetOutcome; 2],
        ) -> Result<(Job, [TargetOutcome; 2], StateChangeEntry), invariants::InvariantViolation>,
    ) -> Result<TransitionOutcome, StoreError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let current = load_job(&tx, job_id)?.ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if current.version_token != expected_version_token {
            return Ok(TransitionOutcome::Conflict { current_token: current.version_token });
        }

        let targets = load_targets(&tx, job_id)?;
        let [a, b] = targets_to_pair(targets)?;

        let (mut new_job, new_targets, log_entry) = mutate(current, [a, b])?;
        new_job.version_token = expected_version_token + 1;
        new_job.updated_utc = Utc::now();

        update_job(&tx, &new_job)?;
        for target in &new_targets {
            update_target(&tx, target)?;
        }
        insert_log(&tx, &log_entry)?;
        tx.commit()?;

        Ok(TransitionOutcome::Applied { version_token: new_job.version_token })
    }

    pub fn state_change_log(&self, job_id: JobId) -> Result<Vec<StateChangeEntry>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq, job_id, entity_kind, entity_id, old_state, new_state, utc, duration_ms, context_json
             FROM StateChangeLog WHERE job_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id.as_str()], crate::rows::log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn targets_to_pair(mut targets: Vec<TargetOutcome>) -> Result<[TargetOutcome; 2], StoreError> {
    targets.sort_by_key(|t| t.target_id == TargetId::B);
    match <[TargetOutcome; 2]>::try_from(targets) {
        Ok(pair) => Ok(pair),
        Err(v) => Err(StoreError::CorruptRow(format!(
            "expected exactly 2 TargetOutcomes, found {}",
            v.len()
        ))),
    }
}

fn load_job(conn: &Connection, job_id: JobId) -> Result<Option<Job>, StoreError> {
    conn.query_row(
        "SELECT id, source_path, initial_size, source_hash, state, version_token,
                created_utc, updated_utc, verification_completed_utc, source_deleted_utc
         FROM FileJobs WHERE id = ?1",
        params![job_id.as_str()],
        job_from_row,
    )
    .optional()
    .map_err(StoreError::from)
}

fn load_targets(conn: &Connection, job_id: JobId) -> Result<Vec<TargetOutcome>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT job_id, target_id, copy_state, copy_state_detail, attempts, verified_hash,
                temp_path, final_path, last_error, bytes_copied, last_transition_utc
         FROM TargetOutcomes WHERE job_id = ?1",
    )?;
    let rows =
        stmt.query_map(params![job_id.as_str()], target_from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn update_job(conn: &Connection, job: &Job) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE FileJobs SET source_hash = ?2, state = ?3, version_token = ?4, updated_utc = ?5,
            verification_completed_utc = ?6, source_deleted_utc = ?7
         WHERE id = ?1",
        params![
            job.id.as_str(),
            job.source_hash.as_ref().map(|h| h.to_hex()),
            job.state.to_string(),
            job.version_token as i64,
            job.updated_utc.to_rfc3339(),
            job.verification_completed_utc.map(|t| t.to_rfc3339()),
            job.source_deleted_utc.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn insert_target(conn: &Connection, target: &TargetOutcome) -> Result<(), StoreError> {
    let (tag, detail) = copy_state_to_columns(&target.copy_state);
    conn.execute(
        "INSERT INTO TargetOutcomes (job_id, target_id, copy_state, copy_state_detail, attempts,
            verified_hash, temp_path, final_path, last_error, bytes_copied, last_transition_utc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            target.job_id.as_str(),
            target.target_id.to_string(),
            tag,
            detail,
            target.attempts,
            target.verified_hash.as_ref().map(|h| h.to_hex()),
            target.temp_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            target.final_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            target.last_error,
            target.bytes_copied as i64,
            target.last_transition_utc.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn update_target(conn: &Connection, target: &TargetOutcome) -> Result<(), StoreError> {
    let (tag, detail) = copy_state_to_columns(&target.copy_state);
    conn.execute(
        "UPDATE TargetOutcomes SET copy_state = ?3, copy_state_detail = ?4, attempts = ?5,
            verified_hash = ?6, temp_path = ?7, final_path = ?8, last_error = ?9,
            bytes_copied = ?10, last_transition_utc = ?11
         WHERE job_id = ?1 AND target_id = ?2",
        params![
            target.job_id.as_str(),
            target.target_id.to_string(),
            tag,
            detail,
            target.attempts,
            target.verified_hash.as_ref().map(|h| h.to_hex()),
            target.temp_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            target.final_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            target.last_error,
            target.bytes_copied as i64,
            target.last_transition_utc.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_log(conn: &Connection, entry: &StateChangeEntry) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO StateChangeLog (job_id, entity_kind, entity_id, old_state, new_state, utc, duration_ms, context_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.job_id.as_str(),
            entry.entity_kind.to_string(),
            entry.entity_id.map(|t| t.to_string()),
            entry.old_state,
            entry.new_state,
            entry.utc.to_rfc3339(),
            entry.duration_ms.map(|d| d as i64),
            entry.context_json,
        ],
    )?;
    Ok(())
}

pub fn target_mut(pair: &mut [TargetOutcome; 2], id: TargetId) -> &mut TargetOutcome {
    if pair[0].target_id == id {
        &mut pair[0]
    } else {
        &mut pair[1]
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
