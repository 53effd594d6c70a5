// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the end-to-end replication specs: wires the Copy
//! Worker, Verifier, and Adjudicator around an in-memory [`Store`] without
//! going through `forkerd`'s process boundary, since nothing in this
//! pipeline depends on being a separate OS process — only the Stability
//! Gate's `notify` watch and the daemon's signal handling do, and neither
//! is exercised here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forker_adapters::{FakeFilesystem, FakeHasher, FileMetadata, Filesystem, FilesystemError};
use forker_core::{Clock, FakeClock, Job, JobId, Sha256Hex, TargetId};
use forker_engine::{
    copy_worker, verifier, Adjudicator, AdjudicatorConfig, CopyCompletion, CopyTask, JobManager,
    TerminalEvent,
};
use forker_storage::Store;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const TARGET_A_DIR: &str = "/targets/a";
pub const TARGET_B_DIR: &str = "/targets/b";
pub const QUARANTINE_DIR: &str = "/quarantine";

pub struct Harness {
    pub job_manager: Arc<JobManager>,
    pub filesystem: FakeFilesystem,
    pub hasher: FakeHasher,
    pub clock: FakeClock,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            job_manager: Arc::new(JobManager::new(Store::open_in_memory().unwrap())),
            filesystem: FakeFilesystem::new(),
            hasher: FakeHasher::new(),
            clock: FakeClock::new(),
        }
    }

    /// Admits a source file of `size` bytes and seeds identical source and
    /// target digests for both targets, so the default run of the pipeline
    /// reaches `Verified` unless a test overrides a seeded hash.
    pub fn admit(&self, file_name: &str, size: u64) -> JobId {
        let source_path = PathBuf::from("/source").join(file_name);
        self.filesystem.put_file(&source_path, vec![0u8; size as usize]);

        let source_hash = Sha256Hex::from_bytes([7u8; 32]);
        self.hasher.seed(&source_path, source_hash.clone());
        for dir in [TARGET_A_DIR, TARGET_B_DIR] {
            self.hasher.seed(Path::new(dir).join(file_name), source_hash.clone());
        }

        let job = Job::new(JobId::new(), source_path, size, self.clock.utc_now());
        let id = job.id;
        self.job_manager.store().admit(job).unwrap();
        id
    }

    pub fn final_path(&self, target_id: TargetId, file_name: &str) -> PathBuf {
        let dir = match target_id {
            TargetId::A => TARGET_A_DIR,
            TargetId::B => TARGET_B_DIR,
        };
        Path::new(dir).join(file_name)
    }

    /// Dispatches the initial `CopyTask` for both targets and runs the full
    /// pipeline (Copy Worker -> Verifier -> Adjudicator, including retry
    /// dispatch) until the Job reaches a terminal state or `timeout` elapses.
    pub async fn run_to_terminal(&self, job_id: JobId, timeout: Duration) {
        self.run_to_terminal_with(self.filesystem.clone(), job_id, timeout).await
    }

    /// Same as [`Self::run_to_terminal`] but with a caller-supplied
    /// filesystem, for scenarios that need to inject failures (a flaky
    /// wrapper around [`FakeFilesystem`]) without affecting the source/
    /// target bytes the rest of the harness set up.
    pub async fn run_to_terminal_with<F: Filesystem>(
        &self,
        filesystem: F,
        job_id: JobId,
        timeout: Duration,
    ) {
        let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<CopyTask>(64);
        let (verify_tx, verify_rx) = mpsc::channel::<CopyCompletion>(64);
        let (terminal_tx, terminal_rx) = mpsc::channel::<TerminalEvent>(64);

        let job = self.job_manager.store().get_job(job_id).unwrap().unwrap();
        for (target_id, dir) in [(TargetId::A, TARGET_A_DIR), (TargetId::B, TARGET_B_DIR)] {
            let outstanding = self.job_manager.store().get_targets(job_id).unwrap();
            let needs_dispatch = outstanding
                .into_iter()
                .any(|t| t.target_id == target_id && t.copy_state == forker_core::CopyState::Pending);
            if needs_dispatch {
                dispatch_tx
                    .send(CopyTask {
                        job_id,
                        target_id,
                        source_path: job.source_path.clone(),
                        expected_size: job.initial_size,
                        target_dir: PathBuf::from(dir),
                    })
                    .await
                    .unwrap();
            }
        }

        let copy_jm = self.job_manager.clone();
        let copy_fs = filesystem.clone();
        let copy_verify_tx = verify_tx.clone();
        let copy_terminal_tx = terminal_tx.clone();
        let copy_handle = tokio::spawn(async move {
            while let Some(task) = dispatch_rx.recv().await {
                copy_worker::run_copy(&copy_jm, &copy_fs, 64 * 1024, 50, 4, task, &copy_verify_tx, &copy_terminal_tx)
                    .await;
            }
        });

        let verify_jm = self.job_manager.clone();
        let verify_hasher = self.hasher.clone();
        let verify_terminal_tx = terminal_tx.clone();
        let verifier_handle = tokio::spawn(async move {
            let mut completions = verify_rx;
            while let Some(completion) = completions.recv().await {
                verifier::run_verify(&verify_jm, &verify_hasher, completion, &verify_terminal_tx).await;
            }
        });

        let adjudicator = Adjudicator::new(
            self.job_manager.clone(),
            filesystem,
            self.clock.clone(),
            AdjudicatorConfig {
                max_retry_attempts: 5,
                retry_delay_ms: 0,
                retry_backoff_cap_ms: 0,
                target_a_dir: PathBuf::from(TARGET_A_DIR),
                target_b_dir: PathBuf::from(TARGET_B_DIR),
                quarantine_dir: PathBuf::from(QUARANTINE_DIR),
            },
            dispatch_tx,
        );
        let adjudicator_handle = tokio::spawn(async move { adjudicator.run(terminal_rx).await });

        drop(verify_tx);
        drop(terminal_tx);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.job_manager.store().get_job(job_id).unwrap().unwrap();
            if job.is_terminal() || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        copy_handle.abort();
        verifier_handle.abort();
        adjudicator_handle.abort();
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps [`FakeFilesystem`] and fails `create_temp_writer` for one target
/// directory a fixed number of times before delegating — scripts the
/// "transient error, then success" shape of the retry-budget scenario
/// without needing a real flaky disk.
#[derive(Clone)]
pub struct FlakyFilesystem {
    inner: FakeFilesystem,
    flaky_dir: PathBuf,
    failures_remaining: Arc<AtomicU32>,
}

impl FlakyFilesystem {
    pub fn new(inner: FakeFilesystem, flaky_dir: impl Into<PathBuf>, failures: u32) -> Self {
        Self { inner, flaky_dir: flaky_dir.into(), failures_remaining: Arc::new(AtomicU32::new(failures)) }
    }
}

#[async_trait]
impl Filesystem for FlakyFilesystem {
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, FilesystemError> {
        self.inner.metadata(path).await
    }

    async fn is_writer_active(&self, path: &Path) -> Result<bool, FilesystemError> {
        self.inner.is_writer_active(path).await
    }

    async fn open_reader(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Unpin + Send>, FilesystemError> {
        self.inner.open_reader(path).await
    }

    async fn create_temp_writer(
        &self,
        dir: &Path,
        file_name: &str,
    ) -> Result<(PathBuf, Box<dyn tokio::io::AsyncWrite + Unpin + Send>), FilesystemError> {
        if dir == self.flaky_dir {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(FilesystemError::Io {
                    path: dir.join(file_name).display().to_string(),
                    source: std::io::Error::other("injected transient write failure"),
                });
            }
        }
        self.inner.create_temp_writer(dir, file_name).await
    }

    async fn finalize(&self, temp_path: &Path, final_path: &Path) -> Result<(), FilesystemError> {
        self.inner.finalize(temp_path, final_path).await
    }

    async fn remove_file(&self, path: &Path) -> Result<(), FilesystemError> {
        self.inner.remove_file(path).await
    }

    async fn quarantine(
        &self,
        path: &Path,
        quarantine_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, FilesystemError> {
        self.inner.quarantine(path, quarantine_dir, now).await
    }
}
