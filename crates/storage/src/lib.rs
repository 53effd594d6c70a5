// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! forker-storage: the single embedded WAL-mode database (`spec.md`
//! section 4.1) — schema, the optimistic-concurrency transition function,
//! startup recovery, and the read-only query surface.

pub mod error;
pub mod prune;
pub mod query;
pub mod recovery;
mod rows;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use query::{JobDetail, JobSummary};
pub use recovery::{RecoveryAction, RecoveryActionKind};
pub use schema::CURRENT_SCHEMA_VERSION;
pub use store::{Store, TransitionOutcome};
