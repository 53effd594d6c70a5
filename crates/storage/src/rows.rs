// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row <-> domain type conversions shared by the store, recovery scan, and
//! query API.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use forker_core::{
    CopyState, EntityKind, Job, JobId, JobState, PermanentCause, RetryableCause, Sha256Hex,
    StateChangeEntry, TargetId, TargetOutcome,
};
use rusqlite::Row;
use std::path::PathBuf;
use std::str::FromStr;

pub fn job_state_from_str(s: &str) -> Result<JobState, StoreError> {
    Ok(match s {
        "discovered" => JobState::Discovered,
        "queued" => JobState::Queued,
        "in_progress" => JobState::InProgress,
        "partial" => JobState::Partial,
        "verified" => JobState::Verified,
        "quarantined" => JobState::Quarantined,
        "failed" => JobState::Failed,
        other => return Err(StoreError::CorruptRow(format!("unknown job state {other:?}"))),
    })
}

pub fn target_id_from_str(s: &str) -> Result<TargetId, StoreError> {
    Ok(match s {
        "A" => TargetId::A,
        "B" => TargetId::B,
        other => return Err(StoreError::CorruptRow(format!("unknown target id {other:?}"))),
    })
}

fn parse_hash(s: &str) -> Result<Sha256Hex, StoreError> {
    Sha256Hex::from_str(s).map_err(|e| StoreError::CorruptRow(e.to_string()))
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(e.to_string()))
}

pub fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let id: String = row.get("id")?;
    let state: String = row.get("state")?;
    let source_hash: Option<String> = row.get("source_hash")?;
    let created_utc: String = row.get("created_utc")?;
    let updated_utc: String = row.get("updated_utc")?;
    let verification_completed_utc: Option<String> = row.get("verification_completed_utc")?;
    let source_deleted_utc: Option<String> = row.get("source_deleted_utc")?;

    Ok(Job {
        id: JobId::from_string(id),
        source_path: PathBuf::from(row.get::<_, String>("source_path")?),
        initial_size: row.get::<_, i64>("initial_size")? as u64,
        source_hash: source_hash.map(|s| parse_hash(&s)).transpose().unwrap_or(None),
        state: job_state_from_str(&state).unwrap_or(JobState::Discovered),
        version_token: row.get::<_, i64>("version_token")? as u64,
        created_utc: parse_utc(&created_utc).unwrap_or_else(|_| Utc::now()),
        updated_utc: parse_utc(&updated_utc).unwrap_or_else(|_| Utc::now()),
        verification_completed_utc: verification_completed_utc
            .map(|s| parse_utc(&s))
            .transpose()
            .unwrap_or(None),
        source_deleted_utc: source_deleted_utc.map(|s| parse_utc(&s)).transpose().unwrap_or(None),
    })
}

/// Splits a [`CopyState`] into its storage tag and an optional JSON detail
/// payload carrying the failure cause.
pub fn copy_state_to_columns(state: &CopyState) -> (&'static str, Option<String>) {
    match state {
        CopyState::Pending => ("pending", None),
        CopyState::Copying => ("copying", None),
        CopyState::Copied => ("copied", None),
        CopyState::Verifying => ("verifying", None),
        CopyState::Verified => ("verified", None),
        CopyState::FailedRetryable(cause) => {
            ("failed_retryable", serde_json::to_string(cause).ok())
        }
        CopyState::FailedPermanent(cause) => {
            ("failed_permanent", serde_json::to_string(cause).ok())
        }
    }
}

pub fn copy_state_from_columns(
    tag: &str,
    detail: Option<&str>,
) -> Result<CopyState, StoreError> {
    Ok(match tag {
        "pending" => CopyState::Pending,
        "copying" => CopyState::Copying,
        "copied" => CopyState::Copied,
        "verifying" => CopyState::Verifying,
        "verified" => CopyState::Verified,
        "failed_retryable" => {
            let detail = detail.ok_or_else(|| {
                StoreError::CorruptRow("failed_retryable row missing detail".into())
            })?;
            let cause: RetryableCause = serde_json::from_str(detail)
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
            CopyState::FailedRetryable(cause)
        }
        "failed_permanent" => {
            let detail = detail.ok_or_else(|| {
                StoreError::CorruptRow("failed_permanent row missing detail".into())
            })?;
            let cause: PermanentCause = serde_json::from_str(detail)
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
            CopyState::FailedPermanent(cause)
        }
        other => return Err(StoreError::CorruptRow(format!("unknown copy state {other:?}"))),
    })
}

pub fn target_from_row(row: &Row<'_>) -> rusqlite::Result<TargetOutcome> {
    let job_id: String = row.get("job_id")?;
    let target_id: String = row.get("target_id")?;
    let copy_state_tag: String = row.get("copy_state")?;
    let copy_state_detail: Option<String> = row.get("copy_state_detail")?;
    let verified_hash: Option<String> = row.get("verified_hash")?;
    let temp_path: Option<String> = row.get("temp_path")?;
    let final_path: Option<String> = row.get("final_path")?;
    let last_transition_utc: String = row.get("last_transition_utc")?;

    Ok(TargetOutcome {
        job_id: JobId::from_string(job_id),
        target_id: target_id_from_str(&target_id).unwrap_or(TargetId::A),
        copy_state: copy_state_from_columns(&copy_state_tag, copy_state_detail.as_deref())
            .unwrap_or(CopyState::Pending),
        attempts: row.get::<_, i64>("attempts")? as u32,
        verified_hash: verified_hash.map(|s| parse_hash(&s)).transpose().unwrap_or(None),
        temp_path: temp_path.map(PathBuf::from),
        final_path: final_path.map(PathBuf::from),
        last_error: row.get("last_error")?,
        bytes_copied: row.get::<_, i64>("bytes_copied")? as u64,
        last_transition_utc: parse_utc(&last_transition_utc).unwrap_or_else(|_| Utc::now()),
    })
}

pub fn log_from_row(row: &Row<'_>) -> rusqlite::Result<StateChangeEntry> {
    let job_id: String = row.get("job_id")?;
    let entity_kind: String = row.get("entity_kind")?;
    let entity_id: Option<String> = row.get("entity_id")?;
    let utc: String = row.get("utc")?;

    Ok(StateChangeEntry {
        seq: row.get("seq")?,
        job_id: JobId::from_string(job_id),
        entity_kind: if entity_kind == "target" { EntityKind::Target } else { EntityKind::Job },
        entity_id: entity_id.and_then(|s| target_id_from_str(&s).ok()),
        old_state: row.get("old_state")?,
        new_state: row.get("new_state")?,
        utc: parse_utc(&utc).unwrap_or_else(|_| Utc::now()),
        duration_ms: row.get::<_, Option<i64>>("duration_ms")?.map(|d| d as u64),
        context_json: row.get("context_json")?,
    })
}
