//! Serializable summary of a decided cohort.

use super::status::{CohortStatus, QuorumTally};
use crate::core::ids::{CheckpointId, CohortId, WorkerId};
use crate::extraction::ExtractionStrategy;
use crate::issue::{Disposition, Issue};
use crate::worker::{FailureRecord, Worker, WorkerState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-worker line of a cohort report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker_id: WorkerId,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub state: WorkerState,
    pub attempts: u32,
    pub raw_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExtractionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    /// Why the worker was cancelled, or that its output is from an earlier
    /// attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl WorkerOutcome {
    pub fn from_worker(worker: &Worker) -> Self {
        Self {
            worker_id: worker.id.clone(),
            role: worker.role.clone(),
            model: worker.model.clone(),
            state: worker.state,
            attempts: worker.attempt,
            raw_bytes: worker.raw_output.as_ref().map_or(0, String::len),
            strategy: worker.payload.as_ref().map(|p| p.strategy),
            confidence: worker.payload.as_ref().map(|p| p.confidence),
            failure: worker.failure.clone(),
            note: worker.cancel_reason.clone().or_else(|| {
                worker
                    .raw_output_attempt
                    .filter(|_| worker.output_is_stale())
                    .map(|attempt| format!("output is from attempt {attempt}"))
            }),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Everything a caller needs to know about a decided cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortReport {
    pub cohort_id: CohortId,
    pub checkpoint_id: CheckpointId,
    pub status: CohortStatus,
    pub tally: QuorumTally,
    pub timed_out: bool,
    pub workers: Vec<WorkerOutcome>,
    /// Roles that did not contribute a completed result.
    pub missing_roles: Vec<String>,
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<WorkerOutcome>,
    pub decided_at: DateTime<Utc>,
}

impl CohortReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, CohortStatus::Degraded { .. })
    }

    pub fn auto_resolved_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.resolution().is_some_and(|r| r.is_auto_applied()))
            .count()
    }

    pub fn escalated_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.resolution().is_some_and(|r| r.is_escalated()))
            .count()
    }

    pub fn count_by_disposition(&self, disposition: Disposition) -> usize {
        self.issues
            .iter()
            .filter(|i| i.disposition() == Some(disposition))
            .count()
    }
}
