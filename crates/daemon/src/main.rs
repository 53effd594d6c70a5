// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `forkerd`: loads configuration, opens the embedded store, runs startup
//! recovery, wires the five pipeline components together, and runs until an
//! OS shutdown signal arrives.
//!
//! There is no daemon-to-CLI IPC protocol (`spec.md` section 6): the CLI
//! talks to the same SQLite file directly, in WAL mode, as a second
//! connection. `main` here is therefore just wiring — every behavior lives
//! in `forker-engine`, `forker-storage`, and `forker-adapters`.

use anyhow::{Context, Result};
use forker_adapters::{Filesystem, NotifyEventSource, OsFilesystem, Sha256Hasher};
use forker_core::{Config, SystemClock, TargetId};
use forker_engine::{
    Adjudicator, AdjudicatorConfig, CopyCompletion, CopyTask, CopyWorkerPool, JobManager,
    StabilityGate, StabilityGateConfig, TerminalEvent, VerifierPool,
};
use forker_storage::recovery::{RecoveryAction, RecoveryActionKind};
use forker_storage::Store;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "forkerd.toml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading config from {config_path}"))?;

    let store = Store::open(&config.db_path, config.busy_timeout_ms)
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;
    let job_manager = Arc::new(JobManager::new(store));

    let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<CopyTask>(256);
    let (verify_tx, verify_rx) = mpsc::channel::<CopyCompletion>(256);
    let (terminal_tx, terminal_rx) = mpsc::channel::<TerminalEvent>(256);

    replay_recovery_actions(
        &job_manager,
        &config,
        &dispatch_tx,
        &verify_tx,
        &terminal_tx,
    )
    .await?;

    let pool_a = Arc::new(CopyWorkerPool::new(
        job_manager.clone(),
        OsFilesystem,
        config.max_concurrent_copies_per_target,
        config.copy_buffer_size_bytes,
        config.copy_progress_persist_interval_ms,
        config.copy_progress_persist_chunks,
        verify_tx.clone(),
        terminal_tx.clone(),
    ));
    let pool_b = Arc::new(CopyWorkerPool::new(
        job_manager.clone(),
        OsFilesystem,
        config.max_concurrent_copies_per_target,
        config.copy_buffer_size_bytes,
        config.copy_progress_persist_interval_ms,
        config.copy_progress_persist_chunks,
        verify_tx.clone(),
        terminal_tx.clone(),
    ));

    // One shared dispatch channel, fed by both the Stability Gate (initial
    // admission) and the Adjudicator (retries); routed here to whichever
    // per-Target pool matches, since the spec calls for one worker pool per
    // Target (section 4.5) but names no component that owns both.
    let router_pool_a = pool_a.clone();
    let router_pool_b = pool_b.clone();
    let router_handle = tokio::spawn(async move {
        while let Some(task) = dispatch_rx.recv().await {
            match task.target_id {
                TargetId::A => router_pool_a.spawn(task),
                TargetId::B => router_pool_b.spawn(task),
            }
        }
    });

    let verifier = Arc::new(VerifierPool::new(
        job_manager.clone(),
        Sha256Hasher,
        config.max_concurrent_copies_per_target,
        terminal_tx.clone(),
    ));
    let verifier_run = verifier.clone();
    let verifier_handle = tokio::spawn(async move { verifier_run.run(verify_rx).await });

    let adjudicator = Adjudicator::new(
        job_manager.clone(),
        OsFilesystem,
        SystemClock,
        AdjudicatorConfig::from(&config),
        dispatch_tx.clone(),
    );
    let adjudicator_handle = tokio::spawn(async move { adjudicator.run(terminal_rx).await });

    let events = NotifyEventSource::watch(&config.source_dir)
        .with_context(|| format!("watching {}", config.source_dir.display()))?;
    let mut gate = StabilityGate::new(
        events,
        OsFilesystem,
        SystemClock,
        job_manager.clone(),
        StabilityGateConfig::from(&config),
        dispatch_tx.clone(),
    );
    let gate_handle = tokio::spawn(async move { gate.run().await });

    let prune_handle = spawn_prune_task(job_manager.clone(), &config);
    let sweep_handle = spawn_stale_pending_sweep_task(job_manager.clone(), &config, dispatch_tx.clone());

    info!(source_dir = %config.source_dir.display(), "forkerd started");
    wait_for_shutdown_signal().await.context("installing shutdown signal handler")?;
    info!("shutdown signal received, draining in-flight work");

    // Stop taking in new work; the Adjudicator's retry lane still feeds the
    // shared dispatch channel, so draining the pools can't be sequenced
    // strictly (retries loop back through copy -> verify -> adjudicate).
    // Give in-flight attempts a grace period, then force everything down.
    gate_handle.abort();
    prune_handle.abort();
    sweep_handle.abort();
    let grace_period = std::time::Duration::from_secs(30);
    let drained = tokio::time::timeout(grace_period, async {
        pool_a.drain().await;
        pool_b.drain().await;
        verifier.drain().await;
    })
    .await
    .is_ok();
    if !drained {
        warn!("shutdown grace period elapsed with work still in flight, forcing stop");
    }

    drop(dispatch_tx);
    router_handle.abort();
    drop(verify_tx);
    verifier_handle.abort();
    drop(terminal_tx);
    adjudicator_handle.abort();

    info!("forkerd stopped");
    Ok(())
}

/// Acts on the database-side outcome of `forker_storage::recovery::scan`,
/// deleting stale temp files and re-dispatching the retry/verify/adjudicate
/// follow-ups the store could not perform itself.
async fn replay_recovery_actions(
    job_manager: &Arc<JobManager>,
    config: &Config,
    dispatch_tx: &mpsc::Sender<CopyTask>,
    verify_tx: &mpsc::Sender<CopyCompletion>,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
) -> Result<()> {
    let actions = forker_storage::recovery::scan(job_manager.store())
        .context("running startup recovery scan")?;
    if actions.is_empty() {
        return Ok(());
    }
    info!(count = actions.len(), "replaying startup recovery actions");

    let filesystem = OsFilesystem;
    for action in actions {
        if let Err(e) = apply_recovery_action(job_manager, config, &filesystem, dispatch_tx, verify_tx, terminal_tx, action).await {
            warn!(error = %e, "failed to replay a recovery action");
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn apply_recovery_action(
    job_manager: &Arc<JobManager>,
    config: &Config,
    filesystem: &OsFilesystem,
    dispatch_tx: &mpsc::Sender<CopyTask>,
    verify_tx: &mpsc::Sender<CopyCompletion>,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
    action: RecoveryAction,
) -> Result<()> {
    let Some(job) = job_manager.store().get_job(action.job_id)? else { return Ok(()) };

    match action.kind {
        RecoveryActionKind::ResetCopyingTarget { target_id, stale_temp_path } => {
            if let Some(temp_path) = stale_temp_path {
                if let Err(e) = filesystem.remove_file(&temp_path).await {
                    warn!(path = %temp_path.display(), error = %e, "failed to remove stale temp file");
                }
            }
            let target_dir = match target_id {
                TargetId::A => config.target_a_dir.clone(),
                TargetId::B => config.target_b_dir.clone(),
            };
            let _ = dispatch_tx
                .send(CopyTask {
                    job_id: job.id,
                    target_id,
                    source_path: job.source_path.clone(),
                    expected_size: job.initial_size,
                    target_dir,
                })
                .await;
        }
        RecoveryActionKind::ReenqueueVerification { target_id } => {
            let _ = verify_tx.send(CopyCompletion { job_id: job.id, target_id }).await;
        }
        RecoveryActionKind::ReadjudicatePartialJob => {
            let targets = job_manager.store().get_targets(job.id)?;
            for target in targets {
                use forker_core::CopyState;
                let is_terminal = matches!(
                    target.copy_state,
                    CopyState::Verified | CopyState::FailedRetryable(_) | CopyState::FailedPermanent(_)
                );
                if is_terminal {
                    let _ = terminal_tx
                        .send(TerminalEvent { job_id: job.id, target_id: target.target_id })
                        .await;
                }
            }
        }
    }
    Ok(())
}

fn spawn_prune_task(job_manager: Arc<JobManager>, config: &Config) -> tokio::task::JoinHandle<()> {
    let max_records = config.state_log_max_records;
    let retention_days = config.state_log_retention_days;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            match forker_storage::prune::prune(job_manager.store(), max_records, retention_days, now) {
                Ok(deleted) if deleted > 0 => info!(deleted, "pruned state change log"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "failed to prune state change log"),
            }
        }
    })
}

/// Finds Targets left `Pending` longer than a debounce window and
/// re-dispatches them. Most `Pending` targets are picked up within
/// milliseconds by the component that just created them (the Stability
/// Gate on admission, the Adjudicator on retry); the only targets that sit
/// `Pending` past the debounce are ones an operator's `Requeue` put there,
/// or a dispatch that silently dropped because the channel was full.
fn spawn_stale_pending_sweep_task(
    job_manager: Arc<JobManager>,
    config: &Config,
    dispatch_tx: mpsc::Sender<CopyTask>,
) -> tokio::task::JoinHandle<()> {
    let target_a_dir = config.target_a_dir.clone();
    let target_b_dir = config.target_b_dir.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        let debounce = chrono::Duration::seconds(15);
        loop {
            ticker.tick().await;
            let Ok(jobs) = job_manager.store().list_non_terminal_jobs() else { continue };
            let now = chrono::Utc::now();
            for job in jobs {
                let Ok(targets) = job_manager.store().get_targets(job.id) else { continue };
                for target in targets {
                    use forker_core::CopyState;
                    if target.copy_state != CopyState::Pending {
                        continue;
                    }
                    if now - target.last_transition_utc < debounce {
                        continue;
                    }
                    let target_dir = match target.target_id {
                        TargetId::A => target_a_dir.clone(),
                        TargetId::B => target_b_dir.clone(),
                    };
                    let _ = dispatch_tx
                        .send(CopyTask {
                            job_id: job.id,
                            target_id: target.target_id,
                            source_path: job.source_path.clone(),
                            expected_size: job.initial_size,
                            target_dir,
                        })
                        .await;
                }
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
