// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 3 / P5 (`spec.md` section 8): a mid-copy crash leaves a target
//! `Copying` with a stale `.part` file; the startup recovery scan resets it
//! to `Pending` and the job reaches the same terminal state a crash-free run
//! would have produced.

use crate::support::{Harness, TARGET_A_DIR};
use chrono::Utc;
use forker_adapters::Filesystem;
use forker_core::{CopyState, JobState, TargetId};
use forker_storage::recovery::{self, RecoveryActionKind};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::test]
async fn stale_copying_target_resets_and_job_still_reaches_verified() {
    let harness = Harness::new();
    let job_id = harness.admit("scan.svs", 4096);

    // Simulate the process dying 60% through Target A's copy: the temp file
    // exists on disk but the store still thinks the target is `Copying`.
    let stale_temp = PathBuf::from(TARGET_A_DIR).join("scan.svs.deadbeef.part");
    harness.filesystem.put_file(&stale_temp, vec![0u8; 2048]);

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    harness
        .job_manager
        .store()
        .transition(job_id, job.version_token, |mut job, mut pair| {
            job.state = JobState::InProgress;
            let target_a = pair.iter_mut().find(|t| t.target_id == TargetId::A).unwrap();
            target_a.copy_state = CopyState::Copying;
            target_a.attempts = 1;
            target_a.temp_path = Some(stale_temp.clone());
            target_a.last_transition_utc = Utc::now();
            let entry = forker_core::StateChangeEntry::for_target(
                job.id,
                TargetId::A,
                Some("pending".into()),
                "copying",
                Utc::now(),
            );
            Ok((job, pair, entry))
        })
        .unwrap();

    let actions = recovery::scan(harness.job_manager.store()).unwrap();
    assert_eq!(actions.len(), 1);
    match &actions[0].kind {
        RecoveryActionKind::ResetCopyingTarget { target_id: TargetId::A, stale_temp_path: Some(path) } => {
            assert_eq!(path, &stale_temp);
        }
        other => panic!("expected ResetCopyingTarget for Target A, got {other:?}"),
    }

    // The caller (forkerd's startup replay) deletes the stale temp file.
    harness.filesystem.remove_file(&stale_temp).await.unwrap();
    assert!(!harness.filesystem.exists(&stale_temp));

    let target_a = harness
        .job_manager
        .store()
        .get_targets(job_id)
        .unwrap()
        .into_iter()
        .find(|t| t.target_id == TargetId::A)
        .unwrap();
    assert_eq!(target_a.copy_state, CopyState::Pending, "scan resets the database side immediately");
    assert_eq!(target_a.attempts, 1, "scan itself does not touch the attempt counter");

    harness.run_to_terminal(job_id, Duration::from_secs(5)).await;

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Verified, "the job reaches the same terminal state as a crash-free run");

    let target_a = harness
        .job_manager
        .store()
        .get_targets(job_id)
        .unwrap()
        .into_iter()
        .find(|t| t.target_id == TargetId::A)
        .unwrap();
    assert_eq!(target_a.attempts, 2, "StartCopy increments on the restarted attempt");
    assert_eq!(target_a.copy_state, CopyState::Verified);
}
