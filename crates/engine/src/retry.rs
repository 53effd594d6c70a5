// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry backoff scheduling (`spec.md` section 4.7): exponential, multiplier
//! 2, capped at `retry_backoff_cap_ms`. The Adjudicator uses the Clock only
//! — no external timer service.

use std::time::Duration;

/// Delay before the `attempt`-th retry (1-indexed: the delay before the
/// first retry after the initial attempt failed).
pub fn backoff_delay(attempt: u32, base_delay_ms: u64, cap_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let delay_ms = base_delay_ms.saturating_mul(factor).min(cap_ms);
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
