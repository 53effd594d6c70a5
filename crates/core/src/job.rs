// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier and state machine.

use crate::hash::Sha256Hex;
use crate::target::TargetId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a replication job (one admitted source file).
    pub struct JobId("job-");
}

/// Job-level state machine (`spec.md` section 4.2).
///
/// `Discovered -> Queued -> InProgress -> Partial -> {Verified | Quarantined | Failed}`.
/// `Verified` and `Quarantined` are terminal; `Failed` is terminal unless
/// externally requeued via the operator `Requeue` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Discovered,
    Queued,
    InProgress,
    Partial,
    Verified,
    Quarantined,
    Failed,
}

crate::simple_display! {
    JobState {
        Discovered => "discovered",
        Queued => "queued",
        InProgress => "in_progress",
        Partial => "partial",
        Verified => "verified",
        Quarantined => "quarantined",
        Failed => "failed",
    }
}

impl JobState {
    /// Verified and Quarantined are terminal; Failed is terminal unless
    /// externally requeued (the CLI `Requeue` action is the only way out).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Verified | JobState::Quarantined | JobState::Failed)
    }

    /// Whether `Requeue` may move a job in this state back to `Queued`.
    pub fn is_requeueable(&self) -> bool {
        matches!(self, JobState::Failed | JobState::Quarantined)
    }
}

/// The Job aggregate root (`spec.md` section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_path: PathBuf,
    /// Bytes observed at admission time; used to detect truncation (I5).
    pub initial_size: u64,
    /// Filled lazily on first demand, then cached (`spec.md` section 4.6).
    pub source_hash: Option<Sha256Hex>,
    pub state: JobState,
    /// Monotonic per-Job counter for optimistic concurrency (I6).
    pub version_token: u64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub verification_completed_utc: Option<DateTime<Utc>>,
    pub source_deleted_utc: Option<DateTime<Utc>>,
}

impl Job {
    /// `required_targets` is always exactly `{A, B}` — the spec forbids
    /// three-way or N-way replication, so this is a fixed constant rather
    /// than a configurable field.
    pub const REQUIRED_TARGETS: [TargetId; 2] = TargetId::ALL;

    pub fn new(id: JobId, source_path: PathBuf, initial_size: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            source_path,
            initial_size,
            source_hash: None,
            state: JobState::Discovered,
            version_token: 1,
            created_utc: now,
            updated_utc: now,
            verification_completed_utc: None,
            source_deleted_utc: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            source_path: PathBuf = PathBuf::from("/tmp/source.svs"),
        }
        set {
            initial_size: u64 = 1024,
            state: JobState = JobState::Discovered,
            version_token: u64 = 1,
        }
        option {
            source_hash: Sha256Hex = None,
            verification_completed_utc: DateTime<Utc> = None,
            source_deleted_utc: DateTime<Utc> = None,
        }
        computed {
            id: JobId = JobId::new(),
            created_utc: DateTime<Utc> = Utc::now(),
            updated_utc: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
