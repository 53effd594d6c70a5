// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message that Copy Workers and the Verifier send the Adjudicator
//! whenever a Target reaches a terminal `CopyState` (`spec.md` section 4.7:
//! "subscribes to Target terminal transitions").

use forker_core::{JobId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalEvent {
    pub job_id: JobId,
    pub target_id: TargetId,
}
