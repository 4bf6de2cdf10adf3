//! Cohort decision outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a cohort failed as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CohortFailure {
    /// Some workers completed, but fewer than the minimum quorum.
    InsufficientQuorum { succeeded: usize, required: usize },
    /// No worker completed.
    TotalFailure,
}

/// Cohort status as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CohortStatus {
    Pending,
    Succeeded,
    /// At least the quorum, but not every member, completed.
    Degraded { succeeded: usize, size: usize },
    Failed(CohortFailure),
}

impl CohortStatus {
    pub fn is_decided(&self) -> bool {
        !matches!(self, CohortStatus::Pending)
    }

    pub fn has_result(&self) -> bool {
        matches!(self, CohortStatus::Succeeded | CohortStatus::Degraded { .. })
    }
}

impl fmt::Display for CohortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CohortStatus::Pending => write!(f, "pending"),
            CohortStatus::Succeeded => write!(f, "succeeded"),
            CohortStatus::Degraded { succeeded, size } => {
                write!(f, "degraded ({succeeded}/{size})")
            }
            CohortStatus::Failed(CohortFailure::InsufficientQuorum {
                succeeded,
                required,
            }) => write!(f, "failed (insufficient quorum: {succeeded}/{required})"),
            CohortStatus::Failed(CohortFailure::TotalFailure) => write!(f, "failed (no results)"),
        }
    }
}

/// Counts of member outcomes at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuorumTally {
    pub size: usize,
    pub required: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Members still running when the decision was forced by timeout.
    pub unfinished: usize,
}

impl QuorumTally {
    pub fn decide(&self) -> CohortStatus {
        if self.size > 0 && self.completed >= self.size {
            CohortStatus::Succeeded
        } else if self.completed == 0 {
            CohortStatus::Failed(CohortFailure::TotalFailure)
        } else if self.completed >= self.required {
            CohortStatus::Degraded {
                succeeded: self.completed,
                size: self.size,
            }
        } else {
            CohortStatus::Failed(CohortFailure::InsufficientQuorum {
                succeeded: self.completed,
                required: self.required,
            })
        }
    }
}
