// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::hash::Sha256Hex;

const HASH_A: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85";
const HASH_B: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

#[test]
fn hash_mismatch_cause_carries_both_digests() {
    let a: Sha256Hex = HASH_A.parse().unwrap();
    let b: Sha256Hex = HASH_B.parse().unwrap();
    let fault: Fault = PermanentCause::HashMismatch { expected: a, actual: b }.into();
    match fault {
        Fault::HashMismatch { expected, actual } => {
            assert_eq!(expected, HASH_A);
            assert_eq!(actual, HASH_B);
        }
        other => panic!("unexpected fault: {other:?}"),
    }
}

#[test]
fn truncation_cause_carries_byte_counts() {
    let fault: Fault = PermanentCause::Truncation { expected: 100, actual: 40 }.into();
    assert!(matches!(fault, Fault::Truncation { expected: 100, actual: 40 }));
}

#[test]
fn retryable_timeout_becomes_destination_io_error() {
    let fault: Fault = RetryableCause::Timeout.into();
    assert!(matches!(fault, Fault::DestinationIoError(_)));
}

#[test]
fn retryable_cancelled_becomes_cancelled_fault() {
    let fault: Fault = RetryableCause::Cancelled.into();
    assert!(matches!(fault, Fault::Cancelled));
}

#[test]
fn invariant_violation_converts_via_from() {
    let violation = InvariantViolation::TokenDidNotIncrease { old: 1, new: 1 };
    let fault: Fault = violation.into();
    assert!(matches!(fault, Fault::InvariantViolation(_)));
}
