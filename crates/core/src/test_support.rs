// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::hash::Sha256Hex;
use crate::job::{Job, JobId};
use crate::target::{CopyState, PermanentCause, RetryableCause, TargetId, TargetOutcome};
use chrono::Utc;

/// Proptest strategies for core state machine types (P1-P7, L1-L2).
pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_target_id() -> impl Strategy<Value = TargetId> {
        prop_oneof![Just(TargetId::A), Just(TargetId::B)]
    }

    pub fn arb_sha256_hex() -> impl Strategy<Value = Sha256Hex> {
        proptest::collection::vec(any::<u8>(), 32..=32).prop_map(|bytes| {
            let mut buf = [0u8; 32];
            buf.copy_from_slice(&bytes);
            Sha256Hex::from_bytes(buf)
        })
    }

    pub fn arb_retryable_cause() -> impl Strategy<Value = RetryableCause> {
        prop_oneof![
            ".*".prop_map(RetryableCause::TransientIo),
            ".*".prop_map(RetryableCause::DestinationWrite),
            ".*".prop_map(RetryableCause::SourceReadTransient),
            Just(RetryableCause::Timeout),
            Just(RetryableCause::Cancelled),
        ]
    }

    pub fn arb_permanent_cause() -> impl Strategy<Value = PermanentCause> {
        prop_oneof![
            (arb_sha256_hex(), arb_sha256_hex())
                .prop_map(|(expected, actual)| PermanentCause::HashMismatch { expected, actual }),
            (0u64..1_000_000, 0u64..1_000_000)
                .prop_map(|(expected, actual)| PermanentCause::Truncation { expected, actual }),
            Just(PermanentCause::SourceMissing),
            Just(PermanentCause::DestinationPermissionDenied),
            Just(PermanentCause::RetriesExhausted),
        ]
    }

    pub fn arb_copy_state() -> impl Strategy<Value = CopyState> {
        prop_oneof![
            Just(CopyState::Pending),
            Just(CopyState::Copying),
            Just(CopyState::Copied),
            Just(CopyState::Verifying),
            Just(CopyState::Verified),
            arb_retryable_cause().prop_map(CopyState::FailedRetryable),
            arb_permanent_cause().prop_map(CopyState::FailedPermanent),
        ]
    }
}

/// A bare [`Job`] in `Discovered` state, for tests that only need an id.
pub fn sample_job(source_path: &str, initial_size: u64) -> Job {
    Job::builder().source_path(source_path).initial_size(initial_size).build()
}

/// A [`TargetOutcome`] pair (A and B) for `job_id`, both `Pending`.
pub fn sample_target_pair(job_id: JobId) -> (TargetOutcome, TargetOutcome) {
    let now = Utc::now();
    (
        TargetOutcome::new(job_id, TargetId::A, now),
        TargetOutcome::new(job_id, TargetId::B, now),
    )
}

/// Advances both targets in a pair to `Verified` against `hash`, for tests
/// that need a job already past the finish line.
pub fn verify_target_pair(
    mut a: TargetOutcome,
    mut b: TargetOutcome,
    hash: &Sha256Hex,
) -> (TargetOutcome, TargetOutcome) {
    a.copy_state = CopyState::Verified;
    a.verified_hash = Some(hash.clone());
    b.copy_state = CopyState::Verified;
    b.verified_hash = Some(hash.clone());
    (a, b)
}
