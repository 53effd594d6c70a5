// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The read-only query surface and `Requeue` action `spec.md` section 6
//! exposes to callers outside the core (`forker-daemon`, `forker-cli`).
//!
//! The storage crate already owns the query SQL (`forker_storage::query`);
//! this is a thin `JobManager`-backed wrapper so callers never see a
//! `Conflict` on `requeue` the way they never see one on any other
//! transition — it reloads the job's current `version_token` and retries,
//! same as [`crate::job_manager::JobManager::transition_retrying`].

use crate::job_manager::JobManager;
use forker_core::JobId;
use forker_storage::{JobDetail, JobSummary, StoreError};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job {0} not found")]
    JobNotFound(String),
}

pub struct QueryApi {
    job_manager: std::sync::Arc<JobManager>,
}

impl QueryApi {
    pub fn new(job_manager: std::sync::Arc<JobManager>) -> Self {
        Self { job_manager }
    }

    pub async fn counts_by_state(&self) -> Result<HashMap<forker_core::JobState, u64>, QueryError> {
        Ok(self.job_manager.store().counts_by_state()?)
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, QueryError> {
        Ok(self.job_manager.store().list_jobs()?)
    }

    pub async fn job_detail(&self, job_id: JobId) -> Result<JobDetail, QueryError> {
        self.job_manager
            .store()
            .job_detail(job_id)?
            .ok_or_else(|| QueryError::JobNotFound(job_id.to_string()))
    }

    /// Moves a `Failed`/`Quarantined` job back to `Queued`, reloading and
    /// retrying on every `Conflict` until the caller's intent lands against
    /// whatever the job's current `version_token` turns out to be.
    pub async fn requeue(&self, job_id: JobId, justification: &str) -> Result<(), QueryError> {
        loop {
            let job = self
                .job_manager
                .store()
                .get_job(job_id)?
                .ok_or_else(|| QueryError::JobNotFound(job_id.to_string()))?;
            match self.job_manager.store().requeue(job_id, job.version_token, justification)? {
                forker_storage::TransitionOutcome::Applied { .. } => return Ok(()),
                forker_storage::TransitionOutcome::Conflict { .. } => continue,
            }
        }
    }
}

#[cfg(test)]
#[path = "query_api_tests.rs"]
mod tests;
