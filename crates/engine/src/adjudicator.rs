// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adjudicator (`spec.md` section 4.7): the single reactor that subscribes
//! to Target terminal transitions and drives Job-level state — completion,
//! quarantine, and retry scheduling.
//!
//! Sharded by `JobId`: the main loop fans each [`TerminalEvent`] out to a
//! per-job worker task (spawned lazily, tracked in a `tokio::task::JoinSet`)
//! so that events for the same Job are always processed in arrival order
//! while distinct Jobs proceed concurrently — grounded on the per-job
//! reactor shape in
//! `examples/other_examples/245047a6_IONIQ6000-av1-base__crates-daemon-src-job_executor.rs.rs`.

use crate::copy_worker::CopyTask;
use crate::job_manager::JobManager;
use crate::retry::backoff_delay;
use crate::terminal_event::TerminalEvent;
use forker_adapters::Filesystem;
use forker_core::{
    invariants, Clock, Config, CopyState, Job, JobId, JobState, PermanentCause, StateChangeEntry,
    TargetId,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Clone)]
pub struct AdjudicatorConfig {
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff_cap_ms: u64,
    pub target_a_dir: PathBuf,
    pub target_b_dir: PathBuf,
    pub quarantine_dir: PathBuf,
}

impl From<&Config> for AdjudicatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_retry_attempts: config.max_retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
            retry_backoff_cap_ms: config.retry_backoff_cap_ms,
            target_a_dir: config.target_a_dir.clone(),
            target_b_dir: config.target_b_dir.clone(),
            quarantine_dir: config.quarantine_dir.clone(),
        }
    }
}

impl AdjudicatorConfig {
    fn target_dir(&self, target_id: TargetId) -> PathBuf {
        match target_id {
            TargetId::A => self.target_a_dir.clone(),
            TargetId::B => self.target_b_dir.clone(),
        }
    }
}

struct Ctx<F: Filesystem, Clk: Clock> {
    job_manager: Arc<JobManager>,
    filesystem: F,
    clock: Clk,
    config: Arc<AdjudicatorConfig>,
    retry_tx: mpsc::Sender<CopyTask>,
}

impl<F: Filesystem, Clk: Clock> Clone for Ctx<F, Clk> {
    fn clone(&self) -> Self {
        Self {
            job_manager: self.job_manager.clone(),
            filesystem: self.filesystem.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            retry_tx: self.retry_tx.clone(),
        }
    }
}

pub struct Adjudicator<F: Filesystem, Clk: Clock> {
    ctx: Ctx<F, Clk>,
}

impl<F: Filesystem, Clk: Clock> Adjudicator<F, Clk> {
    pub fn new(
        job_manager: Arc<JobManager>,
        filesystem: F,
        clock: Clk,
        config: AdjudicatorConfig,
        retry_tx: mpsc::Sender<CopyTask>,
    ) -> Self {
        Self { ctx: Ctx { job_manager, filesystem, clock, config: Arc::new(config), retry_tx } }
    }

    /// Drains `events` until the channel closes, fanning each event out to
    /// a per-`JobId` worker and awaiting all of them before returning.
    pub async fn run(&self, mut events: mpsc::Receiver<TerminalEvent>) {
        let mut lanes: HashMap<JobId, mpsc::UnboundedSender<TerminalEvent>> = HashMap::new();
        let mut workers: JoinSet<()> = JoinSet::new();

        while let Some(event) = events.recv().await {
            let lane = lanes.entry(event.job_id).or_insert_with(|| {
                let (tx, mut rx) = mpsc::unbounded_channel::<TerminalEvent>();
                let ctx = self.ctx.clone();
                workers.spawn(async move {
                    while let Some(event) = rx.recv().await {
                        handle_event(&ctx, event).await;
                    }
                });
                tx
            });
            let _ = lane.send(event);
        }

        drop(lanes);
        while workers.join_next().await.is_some() {}
    }
}

async fn handle_event<F: Filesystem, Clk: Clock>(ctx: &Ctx<F, Clk>, event: TerminalEvent) {
    let Ok(Some(job)) = ctx.job_manager.store().get_job(event.job_id) else { return };
    if job.is_terminal() {
        return;
    }
    let Ok(targets) = ctx.job_manager.store().get_targets(event.job_id) else { return };
    let Some(target) = targets.iter().find(|t| t.target_id == event.target_id) else { return };

    match target.copy_state.clone() {
        CopyState::Verified => handle_possible_completion(ctx, &job, &targets).await,
        CopyState::FailedPermanent(cause) => {
            handle_permanent_failure(ctx, &job, event.target_id, &targets, cause).await
        }
        CopyState::FailedRetryable(_) => {
            handle_retryable_failure(ctx, &job, event.target_id, target.attempts).await
        }
        _ => {}
    }
}

async fn handle_possible_completion<F: Filesystem, Clk: Clock>(
    ctx: &Ctx<F, Clk>,
    job: &Job,
    targets: &[forker_core::TargetOutcome],
) {
    let refs: Vec<&forker_core::TargetOutcome> = targets.iter().collect();
    if invariants::check_job_enters_verified(job, &refs).is_err() {
        return;
    }

    let now = ctx.clock.utc_now();
    let applied = ctx.job_manager.transition_retrying(job.id, move |mut job, pair| {
        let refs: Vec<&forker_core::TargetOutcome> = pair.iter().collect();
        invariants::check_job_enters_verified(&job, &refs)?;
        let old = job.state.to_string();
        job.state = JobState::Verified;
        job.verification_completed_utc = Some(now);
        job.updated_utc = now;
        let entry = StateChangeEntry::for_job(job.id, Some(old), "verified", now);
        Ok((job, pair, entry))
    });
    if applied.is_err() {
        return;
    }

    let _ = ctx.filesystem.remove_file(&job.source_path).await;

    let now = ctx.clock.utc_now();
    let _ = ctx.job_manager.transition_retrying(job.id, move |mut job, pair| {
        let refs: Vec<&forker_core::TargetOutcome> = pair.iter().collect();
        invariants::check_source_deletion(job.state, &refs, true)?;
        job.source_deleted_utc = Some(now);
        job.updated_utc = now;
        let entry =
            StateChangeEntry::for_job(job.id, Some("verified".into()), "verified", now)
                .with_context("source deleted after full verification");
        Ok((job, pair, entry))
    });
}

async fn handle_permanent_failure<F: Filesystem, Clk: Clock>(
    ctx: &Ctx<F, Clk>,
    job: &Job,
    target_id: TargetId,
    targets: &[forker_core::TargetOutcome],
    cause: PermanentCause,
) {
    if cause.is_integrity_cause() {
        let refs: Vec<&forker_core::TargetOutcome> = targets.iter().collect();
        if invariants::check_job_enters_quarantined(&refs).is_err() {
            return;
        }
        let now = ctx.clock.utc_now();
        let applied = ctx.job_manager.transition_retrying(job.id, move |mut job, pair| {
            let refs: Vec<&forker_core::TargetOutcome> = pair.iter().collect();
            invariants::check_job_enters_quarantined(&refs)?;
            let old = job.state.to_string();
            job.state = JobState::Quarantined;
            job.updated_utc = now;
            let entry = StateChangeEntry::for_job(job.id, Some(old), "quarantined", now);
            Ok((job, pair, entry))
        });
        if applied.is_err() {
            return;
        }

        let Some(target) = targets.iter().find(|t| t.target_id == target_id) else { return };
        let Some(final_path) = target.final_path.clone() else { return };
        let Ok(moved_to) =
            ctx.filesystem.quarantine(&final_path, &ctx.config.quarantine_dir, ctx.clock.utc_now()).await
        else {
            return;
        };

        let now = ctx.clock.utc_now();
        let _ = ctx.job_manager.transition_retrying(job.id, move |job, mut pair| {
            let slot = forker_storage::store::target_mut(&mut pair, target_id);
            slot.final_path = Some(moved_to.clone());
            slot.last_transition_utc = now;
            let entry = StateChangeEntry::for_target(
                job.id,
                target_id,
                Some("failed_permanent".into()),
                "failed_permanent",
                now,
            )
            .with_context("moved into quarantine directory");
            Ok((job, pair, entry))
        });
    } else {
        let now = ctx.clock.utc_now();
        let _ = ctx.job_manager.transition_retrying(job.id, move |mut job, pair| {
            let old = job.state.to_string();
            job.state = JobState::Failed;
            job.updated_utc = now;
            let entry = StateChangeEntry::for_job(job.id, Some(old), "failed", now);
            Ok((job, pair, entry))
        });
    }
}

async fn handle_retryable_failure<F: Filesystem, Clk: Clock>(
    ctx: &Ctx<F, Clk>,
    job: &Job,
    target_id: TargetId,
    attempts: u32,
) {
    if attempts < ctx.config.max_retry_attempts {
        let delay = backoff_delay(attempts, ctx.config.retry_delay_ms, ctx.config.retry_backoff_cap_ms);
        tokio::time::sleep(delay).await;

        let now = ctx.clock.utc_now();
        let applied = ctx.job_manager.transition_retrying(job.id, move |job, mut pair| {
            let slot = forker_storage::store::target_mut(&mut pair, target_id);
            slot.copy_state = CopyState::Pending;
            slot.temp_path = None;
            slot.last_transition_utc = now;
            let entry = StateChangeEntry::for_target(
                job.id,
                target_id,
                Some("failed_retryable".into()),
                "pending",
                now,
            )
            .with_context("retry dispatch");
            Ok((job, pair, entry))
        });
        if applied.is_ok() {
            let _ = ctx
                .retry_tx
                .send(CopyTask {
                    job_id: job.id,
                    target_id,
                    source_path: job.source_path.clone(),
                    expected_size: job.initial_size,
                    target_dir: ctx.config.target_dir(target_id),
                })
                .await;
        }
    } else {
        let now = ctx.clock.utc_now();
        let applied = ctx.job_manager.transition_retrying(job.id, move |job, mut pair| {
            let slot = forker_storage::store::target_mut(&mut pair, target_id);
            slot.copy_state = CopyState::FailedPermanent(PermanentCause::RetriesExhausted);
            slot.last_transition_utc = now;
            let entry = StateChangeEntry::for_target(
                job.id,
                target_id,
                Some("failed_retryable".into()),
                "failed_permanent",
                now,
            )
            .with_context("retry budget exhausted");
            Ok((job, pair, entry))
        });
        if applied.is_ok() {
            let Ok(targets) = ctx.job_manager.store().get_targets(job.id) else { return };
            handle_permanent_failure(ctx, job, target_id, &targets, PermanentCause::RetriesExhausted)
                .await;
        }
    }
}

#[cfg(test)]
#[path = "adjudicator_tests.rs"]
mod tests;
