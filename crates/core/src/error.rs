// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fault taxonomy surfaced by the core (`spec.md` section 7).

use crate::invariants::InvariantViolation;
use crate::target::{PermanentCause, RetryableCause};
use thiserror::Error;

/// Faults the core can surface to its callers.
///
/// Propagation policy (`spec.md` section 7): retryable faults stay inside
/// the Adjudicator's retry loop; permanent faults produce quarantine (data
/// integrity) or a `Failed` job (operational). `InvariantViolation` is
/// fatal to the *transition* only — it is logged at critical severity and
/// refused, never escalated to process exit. `StoreConflict` is recovered
/// locally by reload-and-retry and should never reach a caller of the
/// public API; it is included here only because low-level store callers
/// see it transiently.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("source file missing: {0}")]
    SourceMissing(String),
    #[error("source file never stabilized: {0}")]
    SourceUnstable(String),
    #[error("destination I/O error: {0}")]
    DestinationIoError(String),
    #[error("destination permission denied after {attempts} attempts")]
    DestinationPermissionDenied { attempts: u32 },
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("truncated copy: expected {expected} bytes, got {actual}")]
    Truncation { expected: u64, actual: u64 },
    #[error("invariant violated: {0}")]
    InvariantViolation(#[from] InvariantViolation),
    #[error("operation cancelled")]
    Cancelled,
    #[error("retry budget exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("store conflict: stale version token {expected}")]
    StoreConflict { expected: u64 },
    #[error("store fault: {0}")]
    StoreFault(String),
}

impl From<RetryableCause> for Fault {
    fn from(cause: RetryableCause) -> Self {
        match cause {
            RetryableCause::TransientIo(msg) => Fault::DestinationIoError(msg),
            RetryableCause::DestinationWrite(msg) => Fault::DestinationIoError(msg),
            RetryableCause::SourceReadTransient(msg) => Fault::SourceUnstable(msg),
            RetryableCause::Timeout => Fault::DestinationIoError("operation timed out".into()),
            RetryableCause::Cancelled => Fault::Cancelled,
        }
    }
}

impl From<PermanentCause> for Fault {
    fn from(cause: PermanentCause) -> Self {
        match cause {
            PermanentCause::HashMismatch { expected, actual } => {
                Fault::HashMismatch { expected: expected.to_hex(), actual: actual.to_hex() }
            }
            PermanentCause::Truncation { expected, actual } => {
                Fault::Truncation { expected, actual }
            }
            PermanentCause::SourceMissing => Fault::SourceMissing("source disappeared".into()),
            PermanentCause::DestinationPermissionDenied => {
                Fault::DestinationPermissionDenied { attempts: 0 }
            }
            PermanentCause::RetriesExhausted => Fault::RetriesExhausted { attempts: 0 },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
