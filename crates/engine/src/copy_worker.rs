// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Copy Worker (`spec.md` section 4.5): streams a source file into a target
//! directory through a sibling `.part` file, feeding every buffer into a
//! streaming SHA-256 before writing it, then renames atomically into place.
//!
//! One pool per Target, bounded by `max_concurrent_copies_per_target`
//! (`spec.md` section 5); the bound is a `tokio::sync::Semaphore` permit
//! held for the duration of one copy, following the teacher's bounded
//! worker-pool shape (`oj-engine/src/runtime/handlers/worker/polling.rs`).

use crate::job_manager::JobManager;
use crate::terminal_event::TerminalEvent;
use chrono::Utc;
use forker_adapters::{Filesystem, FilesystemError};
use forker_core::{invariants, JobId, PermanentCause, RetryableCause, StateChangeEntry, TargetId};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Semaphore};

pub struct CopyTask {
    pub job_id: JobId,
    pub target_id: TargetId,
    pub source_path: PathBuf,
    pub expected_size: u64,
    pub target_dir: PathBuf,
}

/// Sent to the Verifier's queue once a Target reaches `Copied` — the
/// Verifier, not the Adjudicator, is what "subscribes" to this transition
/// (`spec.md` section 4.6).
#[derive(Debug, Clone, Copy)]
pub struct CopyCompletion {
    pub job_id: JobId,
    pub target_id: TargetId,
}

pub struct CopyWorkerPool<F: Filesystem> {
    job_manager: Arc<JobManager>,
    filesystem: F,
    semaphore: Arc<Semaphore>,
    max_concurrent: u32,
    buffer_size: usize,
    progress_persist_interval_ms: u64,
    progress_persist_chunks: u32,
    verify_tx: mpsc::Sender<CopyCompletion>,
    terminal_tx: mpsc::Sender<TerminalEvent>,
}

impl<F: Filesystem> CopyWorkerPool<F> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_manager: Arc<JobManager>,
        filesystem: F,
        max_concurrent: usize,
        buffer_size: usize,
        progress_persist_interval_ms: u64,
        progress_persist_chunks: u32,
        verify_tx: mpsc::Sender<CopyCompletion>,
        terminal_tx: mpsc::Sender<TerminalEvent>,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            job_manager,
            filesystem,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent: max_concurrent as u32,
            buffer_size,
            progress_persist_interval_ms,
            progress_persist_chunks,
            verify_tx,
            terminal_tx,
        }
    }

    /// Waits for every in-flight copy to finish by acquiring the pool's
    /// entire permit budget. Callers must stop feeding new [`CopyTask`]s
    /// into the pool before calling this — shutdown drain, not a pause.
    pub async fn drain(&self) {
        let _ = self.semaphore.acquire_many(self.max_concurrent).await;
    }

    /// Spawns a task that acquires a pool permit and runs [`run_copy`] to
    /// completion. Returns immediately; the pool's concurrency bound is
    /// enforced by the semaphore inside the spawned task, not by blocking
    /// the caller.
    pub fn spawn(&self, task: CopyTask)
    where
        F: Clone,
    {
        let job_manager = self.job_manager.clone();
        let filesystem = self.filesystem.clone();
        let semaphore = self.semaphore.clone();
        let buffer_size = self.buffer_size;
        let progress_persist_interval_ms = self.progress_persist_interval_ms;
        let progress_persist_chunks = self.progress_persist_chunks;
        let verify_tx = self.verify_tx.clone();
        let terminal_tx = self.terminal_tx.clone();

        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            run_copy(
                &job_manager,
                &filesystem,
                buffer_size,
                progress_persist_interval_ms,
                progress_persist_chunks,
                task,
                &verify_tx,
                &terminal_tx,
            )
            .await;
        });
    }
}

/// Runs the full `spec.md` section 4.5 algorithm for one `(JobId, TargetId)`.
pub async fn run_copy<F: Filesystem>(
    job_manager: &JobManager,
    filesystem: &F,
    buffer_size: usize,
    progress_persist_interval_ms: u64,
    progress_persist_chunks: u32,
    task: CopyTask,
    verify_tx: &mpsc::Sender<CopyCompletion>,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
) {
    let file_name = task
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    let temp_file_name = format!("{file_name}.{}.part", nanoid::nanoid!(8));
    let temp_path = task.target_dir.join(&temp_file_name);
    let final_path = task.target_dir.join(&file_name);

    // Step 1: Pending -> Copying, persisting temp_path and bumping attempts
    // before any bytes are written (I7).
    let started = start_copy(job_manager, &task, temp_path.clone());
    if let Err(cause) = started {
        fail_retryable(job_manager, terminal_tx, &task, cause).await;
        return;
    }

    match stream_copy(
        job_manager,
        filesystem,
        &task,
        &temp_file_name,
        &temp_path,
        buffer_size,
        progress_persist_interval_ms,
        progress_persist_chunks,
    )
    .await
    {
        Ok(bytes_copied) => {
            if bytes_copied != task.expected_size {
                let _ = filesystem.remove_file(&temp_path).await;
                fail_permanent(
                    job_manager,
                    terminal_tx,
                    &task,
                    PermanentCause::Truncation { expected: task.expected_size, actual: bytes_copied },
                )
                .await;
                return;
            }

            if let Err(e) = filesystem.finalize(&temp_path, &final_path).await {
                fail_retryable(job_manager, terminal_tx, &task, classify_dest_error(&e)).await;
                return;
            }

            if complete_copy(job_manager, &task, bytes_copied, final_path).is_ok() {
                let _ = verify_tx.send(CopyCompletion { job_id: task.job_id, target_id: task.target_id }).await;
            }
        }
        Err(StreamFailure::Source(e)) => {
            let _ = filesystem.remove_file(&temp_path).await;
            match &e {
                FilesystemError::NotFound(_) => {
                    fail_permanent(job_manager, terminal_tx, &task, PermanentCause::SourceMissing).await;
                }
                FilesystemError::Io { .. } => {
                    fail_retryable(
                        job_manager,
                        terminal_tx,
                        &task,
                        RetryableCause::SourceReadTransient(e.to_string()),
                    )
                    .await;
                }
            }
        }
        Err(StreamFailure::Destination(e)) => {
            let _ = filesystem.remove_file(&temp_path).await;
            fail_retryable(job_manager, terminal_tx, &task, classify_dest_error(&e)).await;
        }
    }
}

fn classify_dest_error(e: &FilesystemError) -> RetryableCause {
    RetryableCause::DestinationWrite(e.to_string())
}

enum StreamFailure {
    Source(FilesystemError),
    Destination(FilesystemError),
}

/// Streams `source_path` into `temp_path` in `buffer_size` chunks, feeding
/// each chunk into a running (advisory) SHA-256 before writing it, and
/// persisting `bytes_copied` at most every `progress_persist_interval_ms` or
/// `progress_persist_chunks` buffers, whichever comes first — the spec is
/// explicit that "persistence cost must not dominate".
async fn stream_copy<F: Filesystem>(
    job_manager: &JobManager,
    filesystem: &F,
    task: &CopyTask,
    temp_file_name: &str,
    temp_path: &PathBuf,
    buffer_size: usize,
    progress_persist_interval_ms: u64,
    progress_persist_chunks: u32,
) -> Result<u64, StreamFailure> {
    let mut reader =
        filesystem.open_reader(&task.source_path).await.map_err(StreamFailure::Source)?;
    let (_, mut writer) = filesystem
        .create_temp_writer(&task.target_dir, temp_file_name)
        .await
        .map_err(StreamFailure::Destination)?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut bytes_copied: u64 = 0;
    let mut chunks_since_persist: u32 = 0;
    let mut last_persist = Instant::now();

    loop {
        let n = reader.read(&mut buf).await.map_err(|source| {
            StreamFailure::Source(FilesystemError::Io {
                path: task.source_path.display().to_string(),
                source,
            })
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n]).await.map_err(|source| {
            StreamFailure::Destination(FilesystemError::Io {
                path: temp_path.display().to_string(),
                source,
            })
        })?;
        bytes_copied += n as u64;
        chunks_since_persist += 1;

        if chunks_since_persist >= progress_persist_chunks
            || last_persist.elapsed().as_millis() as u64 >= progress_persist_interval_ms
        {
            chunks_since_persist = 0;
            last_persist = Instant::now();
            // Advisory only; a failure to persist progress never fails the copy.
            persist_progress(job_manager, task, bytes_copied);
        }
    }

    writer.shutdown().await.map_err(|source| {
        StreamFailure::Destination(FilesystemError::Io { path: temp_path.display().to_string(), source })
    })?;

    Ok(bytes_copied)
}

fn start_copy(
    job_manager: &JobManager,
    task: &CopyTask,
    temp_path: PathBuf,
) -> Result<(), RetryableCause> {
    let result = job_manager.transition_retrying(task.job_id, |mut job, mut pair| {
        use forker_core::JobState;
        let slot = forker_storage::store::target_mut(&mut pair, task.target_id);
        invariants::check_attempts_increment(slot.attempts, slot.attempts + 1)?;
        slot.attempts += 1;
        slot.copy_state = forker_core::CopyState::Copying;
        slot.temp_path = Some(temp_path.clone());
        slot.last_transition_utc = Utc::now();
        if job.state == JobState::Queued {
            job.state = JobState::InProgress;
        }
        let entry = StateChangeEntry::for_target(
            job.id,
            task.target_id,
            Some("pending".into()),
            "copying",
            Utc::now(),
        );
        Ok((job, pair, entry))
    });
    result.map(|_| ()).map_err(|e| RetryableCause::TransientIo(e.to_string()))
}

/// Opportunistically persists `bytes_copied` mid-stream (`spec.md` section
/// 4.5 step 4), throttled by the caller to at most every
/// `progress_persist_interval_ms`/`progress_persist_chunks`. Never read back
/// to resume a copy — advisory only, so a `Conflict` or store error here is
/// silently dropped rather than retried or surfaced.
fn persist_progress(job_manager: &JobManager, task: &CopyTask, bytes_copied: u64) {
    let job = match job_manager.store().get_job(task.job_id) {
        Ok(Some(job)) => job,
        _ => return,
    };
    let _ = job_manager.store().transition(task.job_id, job.version_token, |job, mut pair| {
        let slot = forker_storage::store::target_mut(&mut pair, task.target_id);
        invariants::check_bytes_copied(bytes_copied, job.initial_size)?;
        slot.bytes_copied = bytes_copied;
        slot.last_transition_utc = Utc::now();
        let entry = StateChangeEntry::for_target(
            job.id,
            task.target_id,
            Some("copying".into()),
            "copying",
            Utc::now(),
        )
        .with_context("progress persisted mid-copy");
        Ok((job, pair, entry))
    });
}

fn complete_copy(
    job_manager: &JobManager,
    task: &CopyTask,
    bytes_copied: u64,
    final_path: PathBuf,
) -> Result<(), ()> {
    job_manager
        .transition_retrying(task.job_id, |job, mut pair| {
            let slot = forker_storage::store::target_mut(&mut pair, task.target_id);
            slot.bytes_copied = bytes_copied;
            slot.final_path = Some(final_path.clone());
            invariants::check_enters_copied(slot.bytes_copied, job.initial_size, &slot.final_path)?;
            slot.copy_state = forker_core::CopyState::Copied;
            slot.last_transition_utc = Utc::now();
            let entry = StateChangeEntry::for_target(
                job.id,
                task.target_id,
                Some("copying".into()),
                "copied",
                Utc::now(),
            );
            Ok((job, pair, entry))
        })
        .map(|_| ())
        .map_err(|_| ())
}

async fn fail_retryable(
    job_manager: &JobManager,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
    task: &CopyTask,
    cause: RetryableCause,
) {
    let outcome = job_manager.transition_retrying(task.job_id, |job, mut pair| {
        let slot = forker_storage::store::target_mut(&mut pair, task.target_id);
        slot.copy_state = forker_core::CopyState::FailedRetryable(cause.clone());
        slot.temp_path = None;
        slot.last_error = Some(format!("{cause:?}"));
        slot.last_transition_utc = Utc::now();
        let entry = StateChangeEntry::for_target(
            job.id,
            task.target_id,
            Some("copying".into()),
            "failed_retryable",
            Utc::now(),
        );
        Ok((job, pair, entry))
    });
    if outcome.is_ok() {
        let _ = terminal_tx.send(TerminalEvent { job_id: task.job_id, target_id: task.target_id }).await;
    }
}

async fn fail_permanent(
    job_manager: &JobManager,
    terminal_tx: &mpsc::Sender<TerminalEvent>,
    task: &CopyTask,
    cause: PermanentCause,
) {
    let outcome = job_manager.transition_retrying(task.job_id, |job, mut pair| {
        let slot = forker_storage::store::target_mut(&mut pair, task.target_id);
        slot.copy_state = forker_core::CopyState::FailedPermanent(cause.clone());
        slot.temp_path = None;
        slot.last_error = Some(format!("{cause:?}"));
        slot.last_transition_utc = Utc::now();
        let entry = StateChangeEntry::for_target(
            job.id,
            task.target_id,
            Some("copying".into()),
            "failed_permanent",
            Utc::now(),
        );
        Ok((job, pair, entry))
    });
    if outcome.is_ok() {
        let _ = terminal_tx.send(TerminalEvent { job_id: task.job_id, target_id: task.target_id }).await;
    }
}

#[cfg(test)]
#[path = "copy_worker_tests.rs"]
mod tests;
