// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! L2 (`spec.md` section 8): delivering the same terminal event to the
//! Adjudicator twice has the same effect as delivering it once.

use crate::support::Harness;
use forker_core::JobState;
use forker_engine::{Adjudicator, AdjudicatorConfig, TerminalEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn replaying_a_terminal_event_is_a_no_op() {
    let harness = Harness::new();
    let job_id = harness.admit("scan.svs", 4096);

    // Drive both targets to Verified without the Adjudicator attached, so we
    // can control exactly how many terminal events it sees.
    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    for target_id in forker_core::TargetId::ALL {
        let dir = match target_id {
            forker_core::TargetId::A => crate::support::TARGET_A_DIR,
            forker_core::TargetId::B => crate::support::TARGET_B_DIR,
        };
        let task = forker_engine::CopyTask {
            job_id,
            target_id,
            source_path: job.source_path.clone(),
            expected_size: job.initial_size,
            target_dir: PathBuf::from(dir),
        };
        let (verify_tx, mut verify_rx) = mpsc::channel(1);
        let (terminal_tx, _terminal_rx) = mpsc::channel(1);
        forker_engine::copy_worker::run_copy(
            harness.job_manager.as_ref(),
            &harness.filesystem,
            64 * 1024,
            50,
            4,
            task,
            &verify_tx,
            &terminal_tx,
        )
        .await;
        let completion = verify_rx.recv().await.unwrap();
        let (verify_terminal_tx, mut verify_terminal_rx) = mpsc::channel(1);
        forker_engine::verifier::run_verify(
            harness.job_manager.as_ref(),
            &harness.hasher,
            completion,
            &verify_terminal_tx,
        )
        .await;
        let _ = verify_terminal_rx.recv().await;
    }

    let (terminal_tx, terminal_rx) = mpsc::channel::<TerminalEvent>(4);
    let adjudicator = Adjudicator::new(
        harness.job_manager.clone(),
        harness.filesystem.clone(),
        harness.clock.clone(),
        AdjudicatorConfig {
            max_retry_attempts: 5,
            retry_delay_ms: 0,
            retry_backoff_cap_ms: 0,
            target_a_dir: PathBuf::from(crate::support::TARGET_A_DIR),
            target_b_dir: PathBuf::from(crate::support::TARGET_B_DIR),
            quarantine_dir: PathBuf::from(crate::support::QUARANTINE_DIR),
        },
        mpsc::channel(4).0,
    );
    let handle = tokio::spawn(async move { adjudicator.run(terminal_rx).await });

    // Send the same (job_id, Target A) terminal event twice before the first
    // has necessarily been processed.
    let event = TerminalEvent { job_id, target_id: forker_core::TargetId::A };
    terminal_tx.send(event).await.unwrap();
    terminal_tx.send(event).await.unwrap();
    terminal_tx.send(TerminalEvent { job_id, target_id: forker_core::TargetId::B }).await.unwrap();
    drop(terminal_tx);

    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

    let job = harness.job_manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Verified, "duplicate terminal events must not double-apply");

    let verified_entries = harness
        .job_manager
        .store()
        .state_change_log(job_id)
        .unwrap()
        .into_iter()
        .filter(|e| e.new_state == "verified" && e.context_json.is_none())
        .count();
    assert_eq!(verified_entries, 1, "the Job -> Verified transition happens exactly once");
}
