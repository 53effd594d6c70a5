// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 1 (`spec.md` section 8): a stable source copies cleanly to both
//! targets, verifies, and the source is removed.

use crate::support::{Harness, TARGET_A_DIR, TARGET_B_DIR};
use forker_core::{CopyState, JobState, TargetId};
use std::time::Duration;

#[tokio::test]
async fn both_targets_verify_and_source_is_removed() {
    let harness = Harness::new();
    let job_id = harness.admit("scan.svs", 10 * 1024 * 1024);

    harness.run_to_terminal(job_id, Duration::from_secs(5)).await;

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Verified);
    assert!(job.source_deleted_utc.is_some());
    assert!(!harness.filesystem.exists(&job.source_path), "source should be removed after verification");

    let targets = harness.job_manager.store().get_targets(job_id).unwrap();
    assert_eq!(targets.len(), 2);
    for target in &targets {
        assert_eq!(target.copy_state, CopyState::Verified);
        let final_path = target.final_path.as_ref().expect("verified target has a final_path");
        assert!(harness.filesystem.exists(final_path), "final target file should exist");
        assert_eq!(
            harness.filesystem.contents(final_path).unwrap().len() as u64,
            job.initial_size,
            "final file size should equal initial_size (P1)"
        );
        assert!(target.temp_path.is_none(), "no .part file should remain for a Verified target (P1)");
    }

    assert!(harness.filesystem.exists(&harness.final_path(TargetId::A, "scan.svs")));
    assert!(harness.filesystem.exists(&harness.final_path(TargetId::B, "scan.svs")));
}

/// P6: the committed `version_token` sequence is strictly increasing, and
/// replaying `StateChangeLog` in `seq` order reconstructs the same terminal
/// state the Job actually ended in.
#[tokio::test]
async fn version_tokens_and_log_entries_are_monotonic() {
    let harness = Harness::new();
    let job_id = harness.admit("scan.svs", 4096);

    harness.run_to_terminal(job_id, Duration::from_secs(5)).await;

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Verified);
    assert!(job.version_token > 1, "at least one transition should have applied past admission");

    let log = harness.job_manager.store().state_change_log(job_id).unwrap();
    assert!(!log.is_empty());
    let mut last_seq = 0i64;
    for entry in &log {
        let seq = entry.seq.expect("persisted entries always have a seq");
        assert!(seq > last_seq, "StateChangeLog seq must be strictly increasing");
        last_seq = seq;
    }
    assert_eq!(log.last().unwrap().new_state, "verified");
}
