// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only query surface and the `Requeue` action (`spec.md` section 6).

use crate::error::StoreError;
use crate::rows::job_from_row;
use crate::store::{target_mut, Store, TransitionOutcome};
use chrono::{DateTime, Utc};
use forker_core::{CopyState, Job, JobId, JobState, StateChangeEntry, TargetId, TargetOutcome};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: JobId,
    pub source_path: PathBuf,
    pub state: JobState,
    pub initial_size: u64,
    pub created_utc: DateTime<Utc>,
    pub version_token: u64,
}

#[derive(Debug, Clone)]
pub struct JobDetail {
    pub job: Job,
    pub targets: Vec<TargetOutcome>,
}

impl Store {
    /// Count of jobs in each [`JobState`] (`spec.md` section 6, "counts by state").
    pub fn counts_by_state(&self) -> Result<HashMap<JobState, u64>, StoreError> {
        let all = self.list_jobs()?;
        let mut counts = HashMap::new();
        for summary in all {
            *counts.entry(summary.state).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Result<Vec<JobSummary>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, source_path, initial_size, source_hash, state, version_token,
                    created_utc, updated_utc, verification_completed_utc, source_deleted_utc
             FROM FileJobs ORDER BY created_utc DESC",
        )?;
        let rows = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<Job>, _>>()?
            .into_iter()
            .map(|job| JobSummary {
                id: job.id,
                source_path: job.source_path,
                state: job.state,
                initial_size: job.initial_size,
                created_utc: job.created_utc,
                version_token: job.version_token,
            })
            .collect();
        Ok(rows)
    }

    /// Full detail for one job: the Job row plus both TargetOutcomes.
    pub fn job_detail(&self, job_id: JobId) -> Result<Option<JobDetail>, StoreError> {
        let Some(job) = self.get_job(job_id)? else { return Ok(None) };
        let targets = self.get_targets(job_id)?;
        Ok(Some(JobDetail { job, targets }))
    }

    /// Moves a `Failed`/`Quarantined` job back to `Queued` under the Store's
    /// optimistic token, recording `justification` in the audit trail.
    ///
    /// Any Target not already `Verified` is reset to `Pending` in the same
    /// transition (temp/final paths and the last error cleared) so there is
    /// real pending work for the daemon's stale-pending sweep to pick back
    /// up — there is no daemon-to-CLI channel to notify the running process
    /// directly, only the shared store.
    pub fn requeue(
        &self,
        job_id: JobId,
        expected_version_token: u64,
        justification: &str,
    ) -> Result<TransitionOutcome, StoreError> {
        let current = self.get_job(job_id)?.ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if !current.state.is_requeueable() {
            return Err(StoreError::NotRequeueable(job_id.to_string()));
        }

        let justification = justification.to_string();
        self.transition(job_id, expected_version_token, move |mut job, mut targets| {
            let old_state = job.state.to_string();
            job.state = JobState::Queued;
            for target_id in [TargetId::A, TargetId::B] {
                let slot = target_mut(&mut targets, target_id);
                if slot.copy_state != CopyState::Verified {
                    slot.copy_state = CopyState::Pending;
                    slot.temp_path = None;
                    slot.final_path = None;
                    slot.last_error = None;
                    slot.last_transition_utc = Utc::now();
                }
            }
            let entry = StateChangeEntry::for_job(job.id, Some(old_state), "queued", Utc::now())
                .with_context(format!("{{\"requeue_justification\":{justification:?}}}"));
            Ok((job, targets, entry))
        })
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
