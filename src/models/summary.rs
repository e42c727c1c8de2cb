//! Per-pass run summaries.

use serde::{Deserialize, Serialize};

/// Which state partition a pass runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Forward,
    Recovery,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Recovery => "recovery",
        }
    }
}

/// Counts reported at the end of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub pass: PassKind,
    /// Targets that were eligible when the pass started.
    pub input: usize,
    pub attempted: usize,
    /// Successes whose record was complete.
    pub complete: usize,
    /// Successes whose record was missing required fields.
    pub incomplete: usize,
    /// Incomplete successes that left an existing complete record in place.
    pub kept_existing: usize,
    pub not_found: usize,
    /// Transient and fatal errors.
    pub failed: usize,
    pub soft_blocks: usize,
    pub batches: usize,
    /// Size of the failed set for this pass's targets when it ended.
    pub residual_failed: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new(pass: PassKind) -> Self {
        Self {
            pass,
            input: 0,
            attempted: 0,
            complete: 0,
            incomplete: 0,
            kept_existing: 0,
            not_found: 0,
            failed: 0,
            soft_blocks: 0,
            batches: 0,
            residual_failed: 0,
            interrupted: false,
        }
    }

    pub fn successes(&self) -> usize {
        self.complete + self.incomplete
    }
}
