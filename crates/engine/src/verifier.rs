// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verifier (`spec.md` section 4.6): for each Target that reaches `Copied`,
//! performs an independent re-read hash of `final_path` and compares it to
//! the Job's `source_hash` — computed lazily, once, and cached on the Job.
//! The streaming hash the Copy Worker accumulates while writing is never
//! trusted; only this re-read decides `Verified` vs `FailedPermanent`.

use crate::copy_worker::CopyCompletion;
use crate::job_manager::JobManager;
use crate::terminal_event::TerminalEvent;
use chrono::Utc;
use forker_adapters::Hasher;
use forker_core::{invariants, PermanentCause, RetryableCause, Sha256Hex, StateChangeEntry};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

pub struct VerifierPool<H: Hasher> {
    job_manager: Arc<JobManager>,
    hasher: H,
    semaphore: Arc<Semaphore>,
    max_concurrent: u32,
    terminal_tx: mpsc::Sender<TerminalEvent>,
}

impl<H: Hasher> VerifierPool<H> {
    pub fn new(
        job_manager: Arc<JobManager>,
        hasher: H,
        max_concurrent: usize,
        terminal_tx: mpsc::Sender<TerminalEvent>,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            job_manager,
            hasher,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent: max_concurrent as u32,
            terminal_tx,
        }
    }

    /// Waits for every in-flight verification to finish by acquiring the
    /// pool's entire permit budget. Callers must stop feeding new
    /// `CopyCompletion`s before calling this.
    pub async fn drain(&self) {
        let _ = self.semaphore.acquire_many(self.max_concurrent).await;
    }

    /// Drains `completions` until the channel closes, spawning one bounded
    /// task per `CopyCompletion`. Mirrors the Copy Worker pool's shape: the
    /// bound lives on a semaphore held for the duration of one verification.
    pub async fn run(&self, mut completions: mpsc::Receiver<CopyCompletion>) {
        while let Some(completion) = completions.recv().await {
            let job_manager = self.job_manager.clone();
            let hasher = self.hasher.clone();
            let semaphore = self.semaphore.clone();
            let terminal_tx = self.terminal_tx.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                run_verify(&job_manager, &hasher, completion, &terminal_tx).await;
            });
        }
    }
}

/// Runs the full `spec.md` section 4.6 algorithm for one completed copy.
pub async fn run_verify<H: Hasher>(
    job_manager: &JobManager,
    hasher: &H,
    completion: CopyCompletion,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
) {
    let job = match job_manager.store().get_job(completion.job_id) {
        Ok(Some(job)) => job,
        _ => return,
    };

    let source_hash = match job.source_hash {
        Some(hash) => hash,
        None => match hasher.hash_file(&job.source_path).await {
            Ok(hash) => hash,
            Err(e) => {
                fail_retryable(
                    job_manager,
                    terminal_tx,
                    completion,
                    RetryableCause::SourceReadTransient(e.to_string()),
                )
                .await;
                return;
            }
        },
    };

    if start_verify(job_manager, completion, source_hash).is_err() {
        return;
    }

    let targets = match job_manager.store().get_targets(completion.job_id) {
        Ok(targets) => targets,
        Err(_) => return,
    };
    let Some(target) = targets.into_iter().find(|t| t.target_id == completion.target_id) else {
        return;
    };
    let Some(final_path) = target.final_path.clone() else {
        return;
    };

    match hasher.hash_file(&final_path).await {
        Ok(actual_hash) if actual_hash == source_hash => {
            complete_verified(job_manager, completion, actual_hash, terminal_tx).await;
        }
        Ok(actual_hash) => {
            fail_permanent(
                job_manager,
                terminal_tx,
                completion,
                PermanentCause::HashMismatch { expected: source_hash, actual: actual_hash },
            )
            .await;
        }
        Err(e) => {
            fail_retryable(job_manager, terminal_tx, completion, RetryableCause::TransientIo(e.to_string()))
                .await;
        }
    }
}

fn start_verify(
    job_manager: &JobManager,
    completion: CopyCompletion,
    source_hash: Sha256Hex,
) -> Result<(), ()> {
    job_manager
        .transition_retrying(completion.job_id, |mut job, mut pair| {
            if job.source_hash.is_none() {
                job.source_hash = Some(source_hash.clone());
            }
            let slot = forker_storage::store::target_mut(&mut pair, completion.target_id);
            invariants::check_enters_verifying(&slot.copy_state)?;
            let old = slot.copy_state.to_string();
            slot.copy_state = forker_core::CopyState::Verifying;
            slot.last_transition_utc = Utc::now();
            let entry =
                StateChangeEntry::for_target(job.id, completion.target_id, Some(old), "verifying", Utc::now());
            Ok((job, pair, entry))
        })
        .map(|_| ())
        .map_err(|_| ())
}

async fn complete_verified(
    job_manager: &JobManager,
    completion: CopyCompletion,
    verified_hash: Sha256Hex,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
) {
    let outcome = job_manager.transition_retrying(completion.job_id, |job, mut pair| {
        let slot = forker_storage::store::target_mut(&mut pair, completion.target_id);
        slot.verified_hash = Some(verified_hash.clone());
        slot.copy_state = forker_core::CopyState::Verified;
        slot.last_transition_utc = Utc::now();
        let entry = StateChangeEntry::for_target(
            job.id,
            completion.target_id,
            Some("verifying".into()),
            "verified",
            Utc::now(),
        );
        Ok((job, pair, entry))
    });
    if outcome.is_ok() {
        let _ = terminal_tx
            .send(TerminalEvent { job_id: completion.job_id, target_id: completion.target_id })
            .await;
    }
}

async fn fail_retryable(
    job_manager: &JobManager,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
    completion: CopyCompletion,
    cause: RetryableCause,
) {
    let outcome = job_manager.transition_retrying(completion.job_id, |job, mut pair| {
        let slot = forker_storage::store::target_mut(&mut pair, completion.target_id);
        slot.copy_state = forker_core::CopyState::FailedRetryable(cause.clone());
        slot.temp_path = None;
        slot.last_error = Some(format!("{cause:?}"));
        slot.last_transition_utc = Utc::now();
        let entry = StateChangeEntry::for_target(
            job.id,
            completion.target_id,
            Some("verifying".into()),
            "failed_retryable",
            Utc::now(),
        );
        Ok((job, pair, entry))
    });
    if outcome.is_ok() {
        let _ = terminal_tx
            .send(TerminalEvent { job_id: completion.job_id, target_id: completion.target_id })
            .await;
    }
}

async fn fail_permanent(
    job_manager: &JobManager,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
    completion: CopyCompletion,
    cause: PermanentCause,
) {
    let outcome = job_manager.transition_retrying(completion.job_id, |job, mut pair| {
        let slot = forker_storage::store::target_mut(&mut pair, completion.target_id);
        slot.copy_state = forker_core::CopyState::FailedPermanent(cause.clone());
        slot.last_error = Some(format!("{cause:?}"));
        slot.last_transition_utc = Utc::now();
        let entry = StateChangeEntry::for_target(
            job.id,
            completion.target_id,
            Some("verifying".into()),
            "failed_permanent",
            Utc::now(),
        );
        Ok((job, pair, entry))
    });
    if outcome.is_ok() {
        let _ = terminal_tx
            .send(TerminalEvent { job_id: completion.job_id, target_id: completion.target_id })
            .await;
    }
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod tests;
