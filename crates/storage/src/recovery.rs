// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup recovery scan (`spec.md` section 4.1).
//!
//! The store only knows about rows; it cannot delete a stale `temp_path`
//! itself (filesystem access is a capability owned by `forker-adapters`).
//! [`scan`] resets the database side of recovery and returns one
//! [`RecoveryAction`] per follow-up the caller (the Job Manager) must
//! perform against the filesystem or the Verifier/Adjudicator queues.
//! Running [`scan`] twice in a row is a no-op the second time: once a
//! `Copying` target is reset to `Pending` there is nothing left to reset.

use crate::error::StoreError;
use crate::store::{target_mut, Store, TransitionOutcome};
use chrono::Utc;
use forker_core::{CopyState, JobId, JobState, StateChangeEntry, TargetId};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryActionKind {
    /// A target was mid-copy when the process stopped; it has been reset to
    /// `Pending` in the store. If `stale_temp_path` is `Some`, the caller
    /// must delete that file before the next `StartCopy`.
    ResetCopyingTarget { target_id: TargetId, stale_temp_path: Option<PathBuf> },
    /// A target was mid-verification; the store did not change it, the
    /// caller must re-run the Verifier against it.
    ReenqueueVerification { target_id: TargetId },
    /// A job was left `Partial`; the caller must re-run the Adjudicator.
    ReadjudicatePartialJob,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAction {
    pub job_id: JobId,
    pub kind: RecoveryActionKind,
}

/// Scans every non-terminal job and returns the follow-up actions needed to
/// resume safely.
pub fn scan(store: &Store) -> Result<Vec<RecoveryAction>, StoreError> {
    let mut actions = Vec::new();

    for job in store.list_non_terminal_jobs()? {
        let targets = store.get_targets(job.id)?;

        // Both targets can be `Copying` at once (they copy concurrently), so
        // every reset needed for this job goes through a single `transition`
        // call: a second call would see the token the first call already
        // bumped and silently conflict if it used the stale, loop-captured
        // `job.version_token` instead.
        let copying: Vec<(TargetId, Option<PathBuf>)> = targets
            .iter()
            .filter(|t| t.copy_state == CopyState::Copying)
            .map(|t| (t.target_id, t.temp_path.clone()))
            .collect();

        if !copying.is_empty() {
            let resets = copying.clone();
            let first_reset_target = resets[0].0;
            let outcome = store.transition(job.id, job.version_token, move |j, mut pair| {
                for (target_id, _) in &resets {
                    let slot = target_mut(&mut pair, *target_id);
                    slot.copy_state = CopyState::Pending;
                    slot.temp_path = None;
                    slot.last_transition_utc = Utc::now();
                }
                let entry = StateChangeEntry::for_target(
                    j.id,
                    first_reset_target,
                    Some("copying".into()),
                    "pending",
                    Utc::now(),
                )
                .with_context("recovered after restart");
                Ok((j, pair, entry))
            })?;
            if let TransitionOutcome::Applied { .. } = outcome {
                for (target_id, stale_temp_path) in copying {
                    actions.push(RecoveryAction {
                        job_id: job.id,
                        kind: RecoveryActionKind::ResetCopyingTarget { target_id, stale_temp_path },
                    });
                }
            }
        }

        for target in &targets {
            if target.copy_state == CopyState::Verifying {
                actions.push(RecoveryAction {
                    job_id: job.id,
                    kind: RecoveryActionKind::ReenqueueVerification { target_id: target.target_id },
                });
            }
        }

        if job.state == JobState::Partial {
            actions.push(RecoveryAction { job_id: job.id, kind: RecoveryActionKind::ReadjudicatePartialJob });
        }
    }

    Ok(actions)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
