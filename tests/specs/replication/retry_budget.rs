// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 6 (`spec.md` section 8): transient write failures on one target
//! consume retry budget but the job still reaches `Verified` once the
//! transient condition clears.

use crate::support::{FlakyFilesystem, Harness, TARGET_B_DIR};
use forker_core::{CopyState, JobState, TargetId};
use std::time::Duration;

#[tokio::test]
async fn two_transient_failures_then_success_ends_verified() {
    let harness = Harness::new();
    let job_id = harness.admit("scan.svs", 4096);

    let flaky = FlakyFilesystem::new(harness.filesystem.clone(), TARGET_B_DIR, 2);
    harness.run_to_terminal_with(flaky, job_id, Duration::from_secs(5)).await;

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Verified);

    let targets = harness.job_manager.store().get_targets(job_id).unwrap();
    let target_b = targets.iter().find(|t| t.target_id == TargetId::B).unwrap();
    assert_eq!(target_b.copy_state, CopyState::Verified);
    assert_eq!(target_b.attempts, 3, "two failed attempts plus the one that succeeded");

    let log = harness.job_manager.store().state_change_log(job_id).unwrap();
    let start_copy_entries = log
        .iter()
        .filter(|e| e.entity_id == Some(TargetId::B) && e.new_state == "copying")
        .count();
    assert_eq!(start_copy_entries, 3, "StateChangeLog should record three StartCopy transitions for Target B");
}

#[tokio::test]
async fn retry_budget_exhausted_fails_the_job() {
    let harness = Harness::new();
    let job_id = harness.admit("scan.svs", 4096);

    // More injected failures than the harness's max_retry_attempts (5):
    // every attempt on Target B fails until the retry budget is spent.
    let flaky = FlakyFilesystem::new(harness.filesystem.clone(), TARGET_B_DIR, 10);
    harness.run_to_terminal_with(flaky, job_id, Duration::from_secs(5)).await;

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);

    let targets = harness.job_manager.store().get_targets(job_id).unwrap();
    let target_b = targets.iter().find(|t| t.target_id == TargetId::B).unwrap();
    assert_eq!(target_b.attempts, 5, "exactly max_retry_attempts StartCopy calls before giving up");
}
