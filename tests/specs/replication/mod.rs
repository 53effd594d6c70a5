// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Scenario 4 (unstable source) and scenario 5 (concurrent external reader)
// are deliberately not covered here: both depend on internals this
// black-box harness cannot drive or fake meaningfully (the Stability
// Gate's private polling timers, and `OsFilesystem`'s real file-lock
// based `is_writer_active`). They're covered by
// `forker-engine`'s `stability_gate_tests.rs` and
// `forker-adapters`' `filesystem_tests.rs` instead.

mod crash_recovery;
mod hash_mismatch;
mod happy_path;
mod idempotent_adjudication;
mod retry_budget;
