// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forker_core::JobState;
use std::path::PathBuf;

fn manager() -> JobManager {
    JobManager::new(Store::open_in_memory().unwrap())
}

#[test]
fn admit_discovered_creates_a_queued_job() {
    let manager = manager();
    let id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 4096, Utc::now()).unwrap();

    let job = manager.store().get_job(id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.initial_size, 4096);
}

#[test]
fn transition_retrying_applies_once_when_uncontended() {
    let manager = manager();
    let id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 10, Utc::now()).unwrap();

    let new_token = manager
        .transition_retrying(id, |mut job, pair| {
            job.state = JobState::InProgress;
            let entry = StateChangeEntry::for_job(job.id, Some("queued".into()), "in_progress", Utc::now());
            Ok((job, pair, entry))
        })
        .unwrap();

    assert_eq!(new_token, 2);
    assert_eq!(manager.store().get_job(id).unwrap().unwrap().state, JobState::InProgress);
}

#[test]
fn transition_retrying_reloads_past_a_stale_caller_view() {
    let manager = manager();
    let id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 10, Utc::now()).unwrap();

    // Simulate another writer bumping the token between our read and our
    // transition attempt by performing one transition ourselves first.
    manager
        .transition_retrying(id, |mut job, pair| {
            job.state = JobState::InProgress;
            let entry = StateChangeEntry::for_job(job.id, Some("queued".into()), "in_progress", Utc::now());
            Ok((job, pair, entry))
        })
        .unwrap();

    // A second call still succeeds by reloading the now-current token itself.
    let new_token = manager
        .transition_retrying(id, |mut job, pair| {
            job.state = JobState::Partial;
            let entry = StateChangeEntry::for_job(job.id, Some("in_progress".into()), "partial", Utc::now());
            Ok((job, pair, entry))
        })
        .unwrap();

    assert_eq!(new_token, 3);
}

#[test]
fn transition_retrying_surfaces_invariant_violations() {
    let manager = manager();
    let id = manager.admit_discovered(PathBuf::from("/src/slide.svs"), 10, Utc::now()).unwrap();

    let err = manager.transition_retrying(id, |_job, _pair| Err(InvariantViolation::QuarantinedWithoutCause));
    assert!(matches!(err, Err(StoreError::InvariantViolation(_))));
}
