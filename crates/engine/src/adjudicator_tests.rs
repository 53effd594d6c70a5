// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use forker_adapters::FakeFilesystem;
use forker_core::{CopyState, FakeClock, PermanentCause, RetryableCause, Sha256Hex, TargetId};
use forker_storage::Store;
use std::path::PathBuf;

fn test_config() -> AdjudicatorConfig {
    AdjudicatorConfig {
        max_retry_attempts: 3,
        retry_delay_ms: 1,
        retry_backoff_cap_ms: 10,
        target_a_dir: PathBuf::from("/dest/a"),
        target_b_dir: PathBuf::from("/dest/b"),
        quarantine_dir: PathBuf::from("/quarantine"),
    }
}

fn set_target(
    manager: &JobManager,
    job_id: JobId,
    target_id: TargetId,
    mutate: impl Fn(&mut forker_core::TargetOutcome) + Send + Sync + 'static,
) {
    manager
        .transition_retrying(job_id, move |job, mut pair| {
            let slot = forker_storage::store::target_mut(&mut pair, target_id);
            mutate(slot);
            let entry =
                StateChangeEntry::for_target(job.id, target_id, None, slot.copy_state.to_string(), Utc::now());
            Ok((job, pair, entry))
        })
        .unwrap();
}

#[tokio::test]
async fn both_targets_verified_completes_job_and_deletes_source() {
    let manager = Arc::new(JobManager::new(Store::open_in_memory().unwrap()));
    let fs = FakeFilesystem::new();
    fs.put_file("/src/slide.svs", b"hello world".to_vec());
    let job_id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 11, Utc::now()).unwrap();

    let shared_hash = Sha256Hex::from_bytes([3u8; 32]);
    manager
        .transition_retrying(job_id, move |mut job, pair| {
            job.source_hash = Some(shared_hash.clone());
            let entry = StateChangeEntry::for_job(job.id, None, "queued", Utc::now());
            Ok((job, pair, entry))
        })
        .unwrap();
    for target_id in [TargetId::A, TargetId::B] {
        set_target(&manager, job_id, target_id, move |slot| {
            slot.copy_state = CopyState::Verified;
            slot.verified_hash = Some(Sha256Hex::from_bytes([3u8; 32]));
            slot.final_path = Some(PathBuf::from(format!("/dest/{target_id}/slide.svs")));
        });
    }

    let (retry_tx, _retry_rx) = mpsc::channel(4);
    let adjudicator = Adjudicator::new(manager.clone(), fs.clone(), FakeClock::new(), test_config(), retry_tx);
    let (events_tx, events_rx) = mpsc::channel(4);
    events_tx.send(TerminalEvent { job_id, target_id: TargetId::B }).await.unwrap();
    drop(events_tx);
    adjudicator.run(events_rx).await;

    let job = manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Verified);
    assert!(job.source_deleted_utc.is_some());
    assert!(!fs.exists(&PathBuf::from("/src/slide.svs")));
}

#[tokio::test]
async fn hash_mismatch_quarantines_job_and_moves_offending_file() {
    let manager = Arc::new(JobManager::new(Store::open_in_memory().unwrap()));
    let fs = FakeFilesystem::new();
    fs.put_file("/dest/a/slide.svs", b"corrupt".to_vec());
    let job_id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 11, Utc::now()).unwrap();

    set_target(&manager, job_id, TargetId::A, |slot| {
        slot.copy_state = CopyState::FailedPermanent(PermanentCause::HashMismatch {
            expected: Sha256Hex::from_bytes([1u8; 32]),
            actual: Sha256Hex::from_bytes([2u8; 32]),
        });
        slot.final_path = Some(PathBuf::from("/dest/a/slide.svs"));
    });

    let (retry_tx, _retry_rx) = mpsc::channel(4);
    let adjudicator = Adjudicator::new(manager.clone(), fs.clone(), FakeClock::new(), test_config(), retry_tx);
    let (events_tx, events_rx) = mpsc::channel(4);
    events_tx.send(TerminalEvent { job_id, target_id: TargetId::A }).await.unwrap();
    drop(events_tx);
    adjudicator.run(events_rx).await;

    let job = manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Quarantined);
    assert!(!fs.exists(&PathBuf::from("/dest/a/slide.svs")));
}

#[tokio::test]
async fn retryable_failure_under_budget_reschedules_a_copy_task() {
    let manager = Arc::new(JobManager::new(Store::open_in_memory().unwrap()));
    let fs = FakeFilesystem::new();
    let job_id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 11, Utc::now()).unwrap();

    set_target(&manager, job_id, TargetId::A, |slot| {
        slot.attempts = 1;
        slot.copy_state = CopyState::FailedRetryable(RetryableCause::TransientIo("disk hiccup".into()));
    });

    let (retry_tx, mut retry_rx) = mpsc::channel(4);
    let adjudicator = Adjudicator::new(manager.clone(), fs.clone(), FakeClock::new(), test_config(), retry_tx);
    let (events_tx, events_rx) = mpsc::channel(4);
    events_tx.send(TerminalEvent { job_id, target_id: TargetId::A }).await.unwrap();
    drop(events_tx);
    adjudicator.run(events_rx).await;

    let targets = manager.store().get_targets(job_id).unwrap();
    let target = targets.iter().find(|t| t.target_id == TargetId::A).unwrap();
    assert_eq!(target.copy_state, CopyState::Pending);

    let task = retry_rx.try_recv().unwrap();
    assert_eq!(task.job_id, job_id);
    assert_eq!(task.target_id, TargetId::A);
}

#[tokio::test]
async fn retryable_failure_past_budget_promotes_to_failed_permanent_and_fails_job() {
    let manager = Arc::new(JobManager::new(Store::open_in_memory().unwrap()));
    let fs = FakeFilesystem::new();
    let job_id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 11, Utc::now()).unwrap();

    set_target(&manager, job_id, TargetId::A, |slot| {
        slot.attempts = 3;
        slot.copy_state = CopyState::FailedRetryable(RetryableCause::TransientIo("disk hiccup".into()));
    });

    let (retry_tx, mut retry_rx) = mpsc::channel(4);
    let adjudicator = Adjudicator::new(manager.clone(), fs.clone(), FakeClock::new(), test_config(), retry_tx);
    let (events_tx, events_rx) = mpsc::channel(4);
    events_tx.send(TerminalEvent { job_id, target_id: TargetId::A }).await.unwrap();
    drop(events_tx);
    adjudicator.run(events_rx).await;

    let job = manager.store().get_job(job_id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(retry_rx.try_recv().is_err());
}
