// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit trail (`spec.md` section 3, `StateChangeLog`).

use crate::job::JobId;
use crate::target::TargetId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which aggregate a [`StateChangeEntry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Job,
    Target,
}

crate::simple_display! {
    EntityKind {
        Job => "job",
        Target => "target",
    }
}

/// One row of the append-only `StateChangeLog`.
///
/// Written in the same durable commit as the Job/TargetOutcome update it
/// describes (`spec.md` section 4.1) — never written standalone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeEntry {
    /// Assigned by the store on insert; `None` before persistence.
    pub seq: Option<i64>,
    pub job_id: JobId,
    pub entity_kind: EntityKind,
    /// `Some` for `Target` rows, `None` for `Job` rows.
    pub entity_id: Option<TargetId>,
    pub old_state: Option<String>,
    pub new_state: String,
    pub utc: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub context_json: Option<String>,
}

impl StateChangeEntry {
    pub fn for_job(
        job_id: JobId,
        old_state: Option<String>,
        new_state: impl Into<String>,
        utc: DateTime<Utc>,
    ) -> Self {
        Self {
            seq: None,
            job_id,
            entity_kind: EntityKind::Job,
            entity_id: None,
            old_state,
            new_state: new_state.into(),
            utc,
            duration_ms: None,
            context_json: None,
        }
    }

    pub fn for_target(
        job_id: JobId,
        target_id: TargetId,
        old_state: Option<String>,
        new_state: impl Into<String>,
        utc: DateTime<Utc>,
    ) -> Self {
        Self {
            seq: None,
            job_id,
            entity_kind: EntityKind::Target,
            entity_id: Some(target_id),
            old_state,
            new_state: new_state.into(),
            utc,
            duration_ms: None,
            context_json: None,
        }
    }

    pub fn with_context(mut self, context_json: impl Into<String>) -> Self {
        self.context_json = Some(context_json.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[cfg(test)]
#[path = "state_change_tests.rs"]
mod tests;
