// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn first_retry_uses_base_delay() {
    assert_eq!(backoff_delay(1, 500, 300_000), Duration::from_millis(500));
}

#[test]
fn doubles_each_attempt() {
    assert_eq!(backoff_delay(2, 500, 300_000), Duration::from_millis(1_000));
    assert_eq!(backoff_delay(3, 500, 300_000), Duration::from_millis(2_000));
}

#[test]
fn caps_at_the_configured_ceiling() {
    assert_eq!(backoff_delay(20, 500, 300_000), Duration::from_millis(300_000));
}
