// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-commit invariant checks (`spec.md` section 3, I1-I7).
//!
//! These are pure functions with no I/O: the Store's transition function
//! calls them before committing a proposed mutation, and refuses the
//! transition (returning `InvariantViolation`) rather than ever persisting
//! a state that violates one of them.

use crate::job::{Job, JobState};
use crate::target::{CopyState, TargetOutcome};
use thiserror::Error;

/// Which invariant was violated, and a short human-readable reason. Kept as
/// a single flat enum (rather than one error type per check) because all
/// call sites handle it uniformly: log at critical severity, refuse the
/// transition, do not crash the process (`spec.md` section 7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("I1: target entered Verifying without first reaching Copied")]
    VerifyingWithoutCopied,
    #[error("I1/I2: job entered Verified with a target not Verified, or with a hash mismatch")]
    VerifiedWithoutAllTargetsMatching,
    #[error("I3: job marked Quarantined without a qualifying FailedPermanent target")]
    QuarantinedWithoutCause,
    #[error("I4: source_deleted_utc set without Verified job and both non-empty final files")]
    SourceDeletedPrematurely,
    #[error("I5: bytes_copied ({bytes_copied}) exceeds initial_size ({initial_size})")]
    BytesCopiedExceedsInitialSize { bytes_copied: u64, initial_size: u64 },
    #[error("I5: target entered Copied without bytes_copied == initial_size and a final_path")]
    CopiedWithoutFullBytesOrPath,
    #[error("I6: version_token did not strictly increase (old={old}, new={new})")]
    TokenDidNotIncrease { old: u64, new: u64 },
    #[error("I7: attempts did not increase by exactly one on StartCopy (old={old}, new={new})")]
    AttemptsNotIncrementedByOne { old: u32, new: u32 },
}

/// I1 (half): a Target may enter Verifying only after Copied.
pub fn check_enters_verifying(previous: &CopyState) -> Result<(), InvariantViolation> {
    if *previous == CopyState::Copied {
        Ok(())
    } else {
        Err(InvariantViolation::VerifyingWithoutCopied)
    }
}

/// I1 (half) + I2: a Job may enter Verified only when both targets are
/// Verified with `verified_hash == source_hash`.
pub fn check_job_enters_verified(
    job: &Job,
    targets: &[&TargetOutcome],
) -> Result<(), InvariantViolation> {
    let Some(source_hash) = &job.source_hash else {
        return Err(InvariantViolation::VerifiedWithoutAllTargetsMatching);
    };
    let all_match = targets.len() == 2
        && targets.iter().all(|t| {
            t.copy_state == CopyState::Verified
                && t.verified_hash.as_ref() == Some(source_hash)
        });
    if all_match {
        Ok(())
    } else {
        Err(InvariantViolation::VerifiedWithoutAllTargetsMatching)
    }
}

/// I3: a Job is Quarantined iff at least one target reached `FailedPermanent`
/// with an integrity cause, or the job's own adjudication promoted a
/// retryable failure past the retry budget with an integrity-equivalent cause.
pub fn check_job_enters_quarantined(targets: &[&TargetOutcome]) -> Result<(), InvariantViolation> {
    let has_cause = targets.iter().any(|t| match &t.copy_state {
        CopyState::FailedPermanent(cause) => cause.is_integrity_cause(),
        _ => false,
    });
    if has_cause {
        Ok(())
    } else {
        Err(InvariantViolation::QuarantinedWithoutCause)
    }
}

/// I4: `source_deleted_utc` is set only when Job is Verified and both
/// target `final_path` files are known to exist and be non-empty.
pub fn check_source_deletion(
    job_state: JobState,
    targets: &[&TargetOutcome],
    final_files_nonempty: bool,
) -> Result<(), InvariantViolation> {
    if job_state == JobState::Verified
        && targets.len() == 2
        && targets.iter().all(|t| t.final_path.is_some())
        && final_files_nonempty
    {
        Ok(())
    } else {
        Err(InvariantViolation::SourceDeletedPrematurely)
    }
}

/// I5: `bytes_copied <= initial_size` always; on entry to Copied,
/// `bytes_copied == initial_size` and `final_path` must be set.
pub fn check_bytes_copied(bytes_copied: u64, initial_size: u64) -> Result<(), InvariantViolation> {
    if bytes_copied <= initial_size {
        Ok(())
    } else {
        Err(InvariantViolation::BytesCopiedExceedsInitialSize { bytes_copied, initial_size })
    }
}

pub fn check_enters_copied(
    bytes_copied: u64,
    initial_size: u64,
    final_path: &Option<std::path::PathBuf>,
) -> Result<(), InvariantViolation> {
    if bytes_copied == initial_size && final_path.is_some() {
        Ok(())
    } else {
        Err(InvariantViolation::CopiedWithoutFullBytesOrPath)
    }
}

/// I6: `version_token` strictly increases per Job.
pub fn check_token_increases(old: u64, new: u64) -> Result<(), InvariantViolation> {
    if new == old + 1 {
        Ok(())
    } else {
        Err(InvariantViolation::TokenDidNotIncrease { old, new })
    }
}

/// I7: each `StartCopy` increments `attempts` by exactly one, checked in the
/// same transaction as the `Pending -> Copying` transition.
pub fn check_attempts_increment(old: u32, new: u32) -> Result<(), InvariantViolation> {
    if new == old + 1 {
        Ok(())
    } else {
        Err(InvariantViolation::AttemptsNotIncrementedByOne { old, new })
    }
}

#[cfg(test)]
#[path = "invariants_tests.rs"]
mod tests;
