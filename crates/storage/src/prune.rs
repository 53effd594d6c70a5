// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `StateChangeLog` retention (`spec.md` section 6,
//! `state_log_max_records` / `state_log_retention_days`).
//!
//! Pruning never touches `FileJobs` or `TargetOutcomes` — terminal jobs are
//! preserved for audit per `spec.md` section 3; only the append-only log
//! is trimmed.

use crate::error::StoreError;
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

/// Deletes log rows older than `retention_days`, then trims any remaining
/// excess over `max_records` oldest-first. Returns the number of rows
/// deleted.
pub fn prune(
    store: &Store,
    max_records: u64,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let conn = store.conn();
    let cutoff = (now - Duration::days(retention_days as i64)).to_rfc3339();
    let mut deleted = conn.execute("DELETE FROM StateChangeLog WHERE utc < ?1", params![cutoff])? as u64;

    let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM StateChangeLog", [], |row| row.get(0))?;
    if remaining > 0 && (remaining as u64) > max_records {
        let excess = remaining as u64 - max_records;
        deleted += conn.execute(
            "DELETE FROM StateChangeLog WHERE seq IN (
                SELECT seq FROM StateChangeLog ORDER BY seq ASC LIMIT ?1
            )",
            params![excess as i64],
        )? as u64;
    }
    Ok(deleted)
}

#[cfg(test)]
#[path = "prune_tests.rs"]
mod tests;
