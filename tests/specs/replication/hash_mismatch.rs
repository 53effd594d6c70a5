// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 2 / P3 / P4 (`spec.md` section 8): a re-read hash mismatch on one
//! target quarantines the Job without touching the source or the other
//! target.

use crate::support::{Harness, TARGET_A_DIR, TARGET_B_DIR};
use forker_core::{CopyState, JobState, PermanentCause, Sha256Hex, TargetId};
use std::path::Path;
use std::time::Duration;

#[tokio::test]
async fn mismatched_target_quarantines_job_and_preserves_source() {
    let harness = Harness::new();
    let job_id = harness.admit("scan.svs", 4096);

    // Reseed Target B's post-copy hash to something that will never match
    // the source digest, simulating a bit flip caught by the Verifier's
    // independent re-read.
    harness.hasher.seed(Path::new(TARGET_B_DIR).join("scan.svs"), Sha256Hex::from_bytes([9u8; 32]));

    harness.run_to_terminal(job_id, Duration::from_secs(5)).await;

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Quarantined);
    assert!(job.source_deleted_utc.is_none(), "source must be preserved on quarantine (P3)");
    assert!(harness.filesystem.exists(&job.source_path), "source file must still exist (P3)");

    let targets = harness.job_manager.store().get_targets(job_id).unwrap();
    let target_a = targets.iter().find(|t| t.target_id == TargetId::A).unwrap();
    let target_b = targets.iter().find(|t| t.target_id == TargetId::B).unwrap();

    assert_eq!(target_a.copy_state, CopyState::Verified, "the intact target is unaffected");
    let a_final = target_a.final_path.as_ref().unwrap();
    assert!(harness.filesystem.exists(a_final));

    match &target_b.copy_state {
        CopyState::FailedPermanent(PermanentCause::HashMismatch { .. }) => {}
        other => panic!("expected HashMismatch, got {other:?}"),
    }
    let b_path = target_b.final_path.as_ref().expect("quarantine keeps the (moved) final_path populated");
    assert!(
        b_path.starts_with(crate::support::QUARANTINE_DIR),
        "mismatched target file should be moved into the quarantine directory, got {b_path:?}"
    );
    assert!(!harness.filesystem.exists(&Path::new(TARGET_B_DIR).join("scan.svs")), "original location is empty");
}
