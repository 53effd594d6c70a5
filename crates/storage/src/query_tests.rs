// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::Store;
use forker_core::test_support::sample_job;

#[test]
fn list_jobs_and_counts_by_state_reflect_admitted_jobs() {
    let store = Store::open_in_memory().unwrap();
    store.admit(sample_job("/data/incoming/a.svs", 10)).unwrap();
    store.admit(sample_job("/data/incoming/b.svs", 20)).unwrap();

    let summaries = store.list_jobs().unwrap();
    assert_eq!(summaries.len(), 2);

    let counts = store.counts_by_state().unwrap();
    assert_eq!(counts.get(&JobState::Queued), Some(&2));
}

#[test]
fn job_detail_includes_both_targets() {
    let store = Store::open_in_memory().unwrap();
    let job = sample_job("/data/incoming/a.svs", 10);
    store.admit(job.clone()).unwrap();

    let detail = store.job_detail(job.id).unwrap().unwrap();
    assert_eq!(detail.job.id, job.id);
    assert_eq!(detail.targets.len(), 2);
}

#[test]
fn job_detail_is_none_for_unknown_job() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.job_detail(JobId::new()).unwrap().is_none());
}

#[test]
fn requeue_moves_failed_job_back_to_queued() {
    let store = Store::open_in_memory().unwrap();
    let job = sample_job("/data/incoming/a.svs", 10);
    store.admit(job.clone()).unwrap();
    store
        .transition(job.id, 1, |mut j, targets| {
            j.state = JobState::Failed;
            let entry = StateChangeEntry::for_job(j.id, Some("partial".into()), "failed", Utc::now());
            Ok((j, targets, entry))
        })
        .unwrap();

    let outcome = store.requeue(job.id, 2, "operator retry after disk full").unwrap();
    assert_eq!(outcome, TransitionOutcome::Applied { version_token: 3 });
    assert_eq!(store.get_job(job.id).unwrap().unwrap().state, JobState::Queued);
}

#[test]
fn requeue_rejects_non_terminal_job() {
    let store = Store::open_in_memory().unwrap();
    let job = sample_job("/data/incoming/a.svs", 10);
    store.admit(job.clone()).unwrap();

    let err = store.requeue(job.id, 1, "should not be allowed").unwrap_err();
    assert!(matches!(err, StoreError::NotRequeueable(_)));
}
