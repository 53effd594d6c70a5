// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target identity and the per-target copy state machine.

use crate::hash::Sha256Hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A job always replicates to exactly two targets. `spec.md` fixes
/// `required_targets` to the set `{A, B}` — there is no N-way replication,
/// so this is a two-variant enum rather than a generic identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetId {
    A,
    B,
}

impl TargetId {
    pub const ALL: [TargetId; 2] = [TargetId::A, TargetId::B];
}

crate::simple_display! {
    TargetId {
        A => "A",
        B => "B",
    }
}

/// Cause of a retryable copy/verify failure (transient, may succeed on retry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryableCause {
    /// Transient I/O error on either source or destination.
    TransientIo(String),
    /// Destination write failed (disk full, network share hiccup, etc).
    DestinationWrite(String),
    /// Source read failed in a way that may be transient (share contention).
    SourceReadTransient(String),
    /// The copy or verify operation exceeded an operational timeout.
    Timeout,
    /// The worker was cancelled by a shutdown signal mid-operation.
    Cancelled,
}

crate::simple_display! {
    RetryableCause {
        TransientIo(..) => "transient_io",
        DestinationWrite(..) => "destination_write",
        SourceReadTransient(..) => "source_read_transient",
        Timeout => "timeout",
        Cancelled => "cancelled",
    }
}

/// Cause of a permanent copy/verify failure (retrying will not help).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermanentCause {
    /// The independent re-read hash did not match the source hash.
    HashMismatch { expected: Sha256Hex, actual: Sha256Hex },
    /// Observed byte count did not match `initial_size` (source moved under us).
    Truncation { expected: u64, actual: u64 },
    /// The source file disappeared before the copy could complete.
    SourceMissing,
    /// Destination write access was denied after `max_retry_attempts` tries.
    DestinationPermissionDenied,
    /// The retry budget (`max_retry_attempts`) was exhausted on a retryable cause.
    RetriesExhausted,
}

crate::simple_display! {
    PermanentCause {
        HashMismatch { .. } => "hash_mismatch",
        Truncation { .. } => "truncation",
        SourceMissing => "source_missing",
        DestinationPermissionDenied => "destination_permission_denied",
        RetriesExhausted => "retries_exhausted",
    }
}

impl PermanentCause {
    /// I3: these causes are data-integrity causes and drive the Job to
    /// Quarantined rather than Failed.
    pub fn is_integrity_cause(&self) -> bool {
        matches!(
            self,
            PermanentCause::HashMismatch { .. }
                | PermanentCause::Truncation { .. }
                | PermanentCause::SourceMissing
        )
    }
}

/// Per-target copy/verify state machine (`spec.md` section 4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyState {
    Pending,
    Copying,
    Copied,
    Verifying,
    Verified,
    FailedRetryable(RetryableCause),
    FailedPermanent(PermanentCause),
}

crate::simple_display! {
    CopyState {
        Pending => "pending",
        Copying => "copying",
        Copied => "copied",
        Verifying => "verifying",
        Verified => "verified",
        FailedRetryable(..) => "failed_retryable",
        FailedPermanent(..) => "failed_permanent",
    }
}

impl CopyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CopyState::Verified | CopyState::FailedPermanent(_))
    }

    pub fn is_failed_permanent(&self) -> bool {
        matches!(self, CopyState::FailedPermanent(_))
    }

    pub fn is_failed_retryable(&self) -> bool {
        matches!(self, CopyState::FailedRetryable(_))
    }
}

/// Per-target outcome record: child aggregate of [`crate::job::Job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub job_id: crate::job::JobId,
    pub target_id: TargetId,
    pub copy_state: CopyState,
    /// Incremented exactly once per `StartCopy` (I7), inside the same store
    /// transaction as the `Pending -> Copying` transition.
    pub attempts: u32,
    /// Authoritative hash recorded once the Verifier's independent re-read
    /// succeeds. The Copy Worker's streaming hash is advisory and is never
    /// written here (see `SPEC_FULL.md` section 9 open question).
    pub verified_hash: Option<Sha256Hex>,
    pub temp_path: Option<PathBuf>,
    pub final_path: Option<PathBuf>,
    pub last_error: Option<String>,
    /// Live progress, advisory, throttled on write (see `Job Manager`).
    pub bytes_copied: u64,
    pub last_transition_utc: DateTime<Utc>,
}

impl TargetOutcome {
    pub fn new(job_id: crate::job::JobId, target_id: TargetId, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            target_id,
            copy_state: CopyState::Pending,
            attempts: 0,
            verified_hash: None,
            temp_path: None,
            final_path: None,
            last_error: None,
            bytes_copied: 0,
            last_transition_utc: now,
        }
    }
}

crate::builder! {
    pub struct TargetOutcomeBuilder => TargetOutcome {
        set {
            job_id: crate::job::JobId = crate::job::JobId::new(),
            target_id: TargetId = TargetId::A,
            copy_state: CopyState = CopyState::Pending,
            attempts: u32 = 0,
            verified_hash: Option<Sha256Hex> = None,
            temp_path: Option<PathBuf> = None,
            final_path: Option<PathBuf> = None,
            last_error: Option<String> = None,
            bytes_copied: u64 = 0,
        }
        computed {
            last_transition_utc: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
