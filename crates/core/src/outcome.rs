// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-unit completion outcome, recorded by the dispatcher and consumed by
//! log-store collaborators.

use serde::{Deserialize, Serialize};

/// How a unit's work finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOutcome {
    Success,
    Failure,
}

impl UnitOutcome {
    /// Stable lowercase label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::Success => "success",
            UnitOutcome::Failure => "failure",
        }
    }
}

impl std::fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
