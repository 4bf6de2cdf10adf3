//! Worker lifecycle states and the legal transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a supervised worker.
///
/// ```text
/// (new) ──► Pending ──► Running ──► Completed
///             │  ▲         │
///             │  │         ├──► Failed ──► Retrying ──► Pending
///             │  │         └──► Cancelled      │
///             │  └─────────────────────────────┘
///             └──► Failed | Cancelled (before launch)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl WorkerState {
    /// Completed, Failed and Cancelled are terminal. A Failed worker may still
    /// leave Failed through `Retrying` when its supervisor retries it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::Completed | WorkerState::Failed | WorkerState::Cancelled
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, WorkerState::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Pending => "pending",
            WorkerState::Running => "running",
            WorkerState::Retrying => "retrying",
            WorkerState::Completed => "completed",
            WorkerState::Failed => "failed",
            WorkerState::Cancelled => "cancelled",
        }
    }

    /// Whether `from -> to` is an edge of the lifecycle graph.
    ///
    /// `from == None` means the worker does not exist yet.
    pub fn can_transition(from: Option<WorkerState>, to: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (from, to),
            (None, Pending)
                | (Some(Pending), Running)
                | (Some(Pending), Failed)
                | (Some(Pending), Cancelled)
                | (Some(Running), Completed)
                | (Some(Running), Failed)
                | (Some(Running), Cancelled)
                | (Some(Failed), Retrying)
                | (Some(Retrying), Pending)
                | (Some(Retrying), Cancelled)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
