// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns the `Store` handle and the reload-then-retry loop around `Conflict`
//! (`spec.md` section 4.1: "`Conflict` signals a stale caller and triggers a
//! reload-then-retry at the call site"), mirroring the teacher's pattern of
//! a single struct owning shared state behind one handle
//! (`oj-daemon`'s `Executor` owning `Arc<Mutex<MaterializedState>>`).

use chrono::{DateTime, Utc};
use forker_core::{InvariantViolation, Job, JobId, StateChangeEntry, TargetOutcome};
use forker_storage::{Store, StoreError, TransitionOutcome};
use std::path::PathBuf;

#[derive(Clone)]
pub struct JobManager {
    store: Store,
}

impl JobManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Admits a source file the Stability Gate has judged stable
    /// (`spec.md` section 4.2's Discovered -> Queued transition).
    pub fn admit_discovered(
        &self,
        source_path: PathBuf,
        initial_size: u64,
        now: DateTime<Utc>,
    ) -> Result<JobId, StoreError> {
        let job = Job::new(JobId::new(), source_path, initial_size, now);
        let id = job.id;
        self.store.admit(job)?;
        Ok(id)
    }

    /// Applies `mutate` against the Job's current state, reloading and
    /// retrying whenever the Store reports `Conflict` rather than surfacing
    /// it — per `spec.md` section 4.1, `Conflict` is never surfaced past
    /// this boundary.
    pub fn transition_retrying(
        &self,
        job_id: JobId,
        mut mutate: impl FnMut(
            Job,
            [TargetOutcome; 2],
        ) -> Result<(Job, [TargetOutcome; 2], StateChangeEntry), InvariantViolation>,
    ) -> Result<u64, StoreError> {
        loop {
            let job = self
                .store
                .get_job(job_id)?
                .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
            let expected_token = job.version_token;
            match self.store.transition(job_id, expected_token, |j, pair| mutate(j, pair))? {
                TransitionOutcome::Applied { version_token } => return Ok(version_token),
                TransitionOutcome::Conflict { .. } => continue,
            }
        }
    }
}

#[cfg(test)]
#[path = "job_manager_tests.rs"]
mod tests;
