//! Lifecycle events recorded in the ledger.

use super::failure::FailureRecord;
use super::state::WorkerState;
use crate::core::ids::CohortId;
use crate::validation::ValidatedPayload;
use serde::{Deserialize, Serialize};

/// A single state change of a worker.
///
/// Every event names exactly one target state; the ledger entry that carries
/// it is the unit of durability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Registered {
        cohort_id: CohortId,
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        prompt: String,
    },
    Started {
        attempt: u32,
    },
    Completed {
        raw_output: String,
        payload: ValidatedPayload,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<String>,
        failure: FailureRecord,
    },
    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<String>,
        reason: String,
    },
    RetryScheduled {
        attempt: u32,
        backoff_ms: u64,
    },
    Requeued,
}

impl LifecycleEvent {
    /// State the worker is in after this event applies.
    pub fn target_state(&self) -> WorkerState {
        match self {
            LifecycleEvent::Registered { .. } => WorkerState::Pending,
            LifecycleEvent::Started { .. } => WorkerState::Running,
            LifecycleEvent::Completed { .. } => WorkerState::Completed,
            LifecycleEvent::Failed { .. } => WorkerState::Failed,
            LifecycleEvent::Cancelled { .. } => WorkerState::Cancelled,
            LifecycleEvent::RetryScheduled { .. } => WorkerState::Retrying,
            LifecycleEvent::Requeued => WorkerState::Pending,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Registered { .. } => "registered",
            LifecycleEvent::Started { .. } => "started",
            LifecycleEvent::Completed { .. } => "completed",
            LifecycleEvent::Failed { .. } => "failed",
            LifecycleEvent::Cancelled { .. } => "cancelled",
            LifecycleEvent::RetryScheduled { .. } => "retry_scheduled",
            LifecycleEvent::Requeued => "requeued",
        }
    }

    pub fn is_registration(&self) -> bool {
        matches!(self, LifecycleEvent::Registered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::failure::FailureKind;

    #[test]
    fn test_target_states() {
        assert_eq!(
            LifecycleEvent::Started { attempt: 1 }.target_state(),
            WorkerState::Running
        );
        assert_eq!(LifecycleEvent::Requeued.target_state(), WorkerState::Pending);
        assert_eq!(
            LifecycleEvent::RetryScheduled {
                attempt: 1,
                backoff_ms: 1000
            }
            .target_state(),
            WorkerState::Retrying
        );
    }

    #[test]
    fn test_event_is_tagged_by_type() {
        let event = LifecycleEvent::Failed {
            raw_output: Some("partial".to_string()),
            failure: FailureRecord::new(FailureKind::Timeout, "timed out"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["raw_output"], "partial");
        assert_eq!(json["failure"]["kind"], "timeout");
    }
}
