// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store-local error taxonomy (`spec.md` section 4.1).

use forker_core::InvariantViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
    #[error("schema version {found} is newer than the {supported} this binary understands")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },
    #[error("no job found with id {0}")]
    JobNotFound(String),
    #[error("job {0} is not requeueable from its current state")]
    NotRequeueable(String),
}
