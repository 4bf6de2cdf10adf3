//! The worker record and its transition rules.

use super::events::LifecycleEvent;
use super::failure::FailureRecord;
use super::state::WorkerState;
use crate::core::ids::{CohortId, WorkerId};
use crate::ledger::LedgerEntry;
use crate::validation::ValidatedPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an event could not be applied to a worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The worker is already in the event's target state. Callers treat this
    /// as an idempotent no-op.
    #[error("worker {worker_id} already {state}; '{event}' ignored")]
    Duplicate {
        worker_id: WorkerId,
        state: WorkerState,
        event: &'static str,
    },

    #[error("illegal transition for worker {worker_id}: {from} -> {to}")]
    Illegal {
        worker_id: WorkerId,
        from: WorkerState,
        to: WorkerState,
    },

    #[error("sequence gap for worker {worker_id}: expected {expected}, got {actual}")]
    SequenceGap {
        worker_id: WorkerId,
        expected: u64,
        actual: u64,
    },

    #[error("first event for worker {worker_id} must be a registration, got '{event}'")]
    NotRegistered {
        worker_id: WorkerId,
        event: &'static str,
    },
}

impl TransitionError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, TransitionError::Duplicate { .. })
    }
}

/// Current projection of one worker.
///
/// Built by replaying the worker's ledger entries in sequence order; no field
/// changes except through [`Worker::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub cohort_id: CohortId,
    pub role: String,
    pub model: Option<String>,
    pub prompt: String,
    pub state: WorkerState,
    /// Number of attempts started so far.
    pub attempt: u32,
    /// Last non-empty output captured from the sink.
    pub raw_output: Option<String>,
    /// Attempt that produced `raw_output`. Lags `attempt` when a retry
    /// ended without output of its own.
    #[serde(default)]
    pub raw_output_attempt: Option<u32>,
    pub payload: Option<ValidatedPayload>,
    pub failure: Option<FailureRecord>,
    pub cancel_reason: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub last_seq: u64,
}

impl Worker {
    /// Create a worker from its registration entry (sequence 1).
    pub fn register(entry: &LedgerEntry) -> Result<Self, TransitionError> {
        let LifecycleEvent::Registered {
            cohort_id,
            role,
            model,
            prompt,
        } = &entry.event
        else {
            return Err(TransitionError::NotRegistered {
                worker_id: entry.worker_id.clone(),
                event: entry.event.name(),
            });
        };

        if entry.seq != 1 {
            return Err(TransitionError::SequenceGap {
                worker_id: entry.worker_id.clone(),
                expected: 1,
                actual: entry.seq,
            });
        }

        Ok(Self {
            id: entry.worker_id.clone(),
            cohort_id: cohort_id.clone(),
            role: role.clone(),
            model: model.clone(),
            prompt: prompt.clone(),
            state: WorkerState::Pending,
            attempt: 0,
            raw_output: None,
            raw_output_attempt: None,
            payload: None,
            failure: None,
            cancel_reason: None,
            registered_at: entry.timestamp,
            started_at: None,
            finished_at: None,
            updated_at: entry.timestamp,
            last_seq: entry.seq,
        })
    }

    /// Validate `event` against the current state without mutating anything.
    pub fn check(&self, event: &LifecycleEvent) -> Result<(), TransitionError> {
        let to = event.target_state();

        if event.is_registration() || self.state == to {
            return Err(TransitionError::Duplicate {
                worker_id: self.id.clone(),
                state: self.state,
                event: event.name(),
            });
        }

        if !WorkerState::can_transition(Some(self.state), to) {
            return Err(TransitionError::Illegal {
                worker_id: self.id.clone(),
                from: self.state,
                to,
            });
        }

        Ok(())
    }

    /// Sequence number the next entry for this worker must carry.
    pub fn next_seq(&self) -> u64 {
        self.last_seq + 1
    }

    /// Apply a ledger entry. The entry must pass [`Worker::check`] and carry
    /// the next sequence number.
    pub fn apply(&mut self, entry: &LedgerEntry) -> Result<(), TransitionError> {
        self.check(&entry.event)?;

        if entry.seq != self.next_seq() {
            return Err(TransitionError::SequenceGap {
                worker_id: self.id.clone(),
                expected: self.next_seq(),
                actual: entry.seq,
            });
        }

        match &entry.event {
            LifecycleEvent::Registered { .. } => {}
            LifecycleEvent::Started { attempt } => {
                self.attempt = *attempt;
                if self.started_at.is_none() {
                    self.started_at = Some(entry.timestamp);
                }
            }
            LifecycleEvent::Completed {
                raw_output,
                payload,
            } => {
                self.raw_output = Some(raw_output.clone());
                self.raw_output_attempt = Some(self.attempt);
                self.payload = Some(payload.clone());
                self.failure = None;
                self.finished_at = Some(entry.timestamp);
            }
            LifecycleEvent::Failed {
                raw_output,
                failure,
            } => {
                if let Some(raw) = raw_output {
                    self.raw_output = Some(raw.clone());
                    self.raw_output_attempt = Some(self.attempt);
                }
                self.failure = Some(failure.clone());
                self.finished_at = Some(entry.timestamp);
            }
            LifecycleEvent::Cancelled { raw_output, reason } => {
                if let Some(raw) = raw_output {
                    self.raw_output = Some(raw.clone());
                    self.raw_output_attempt = Some(self.attempt);
                }
                self.cancel_reason = Some(reason.clone());
                self.finished_at = Some(entry.timestamp);
            }
            LifecycleEvent::RetryScheduled { .. } => {}
            LifecycleEvent::Requeued => {
                self.finished_at = None;
            }
        }

        self.state = entry.event.target_state();
        self.updated_at = entry.timestamp;
        self.last_seq = entry.seq;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// `raw_output` was captured by an attempt before the current one.
    pub fn output_is_stale(&self) -> bool {
        self.raw_output_attempt.is_some_and(|a| a < self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionStrategy;
    use crate::worker::failure::FailureKind;

    fn registered() -> Worker {
        let entry = LedgerEntry::new(
            WorkerId::from("w-1"),
            1,
            LifecycleEvent::Registered {
                cohort_id: CohortId::from("c-1"),
                role: "claude".to_string(),
                model: None,
                prompt: "review".to_string(),
            },
        );
        Worker::register(&entry).unwrap()
    }

    fn apply(worker: &mut Worker, event: LifecycleEvent) -> Result<(), TransitionError> {
        let entry = LedgerEntry::new(worker.id.clone(), worker.next_seq(), event);
        worker.apply(&entry)
    }

    fn payload() -> ValidatedPayload {
        ValidatedPayload {
            value: serde_json::json!({"issues": []}),
            strategy: ExtractionStrategy::DirectParse,
            confidence: 0.95,
        }
    }

    #[test]
    fn test_register_starts_pending() {
        let worker = registered();
        assert_eq!(worker.state, WorkerState::Pending);
        assert_eq!(worker.last_seq, 1);
        assert!(worker.started_at.is_none());
    }

    #[test]
    fn test_register_requires_registration_event() {
        let entry = LedgerEntry::new(
            WorkerId::from("w-1"),
            1,
            LifecycleEvent::Started { attempt: 1 },
        );
        assert!(matches!(
            Worker::register(&entry),
            Err(TransitionError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_completion_records_payload_and_raw() {
        let mut worker = registered();
        apply(&mut worker, LifecycleEvent::Started { attempt: 1 }).unwrap();
        apply(
            &mut worker,
            LifecycleEvent::Completed {
                raw_output: "raw".to_string(),
                payload: payload(),
            },
        )
        .unwrap();

        assert_eq!(worker.state, WorkerState::Completed);
        assert_eq!(worker.raw_output.as_deref(), Some("raw"));
        assert!(worker.payload.is_some());
        assert!(worker.finished_at.is_some());
    }

    #[test]
    fn test_second_completion_is_duplicate() {
        let mut worker = registered();
        apply(&mut worker, LifecycleEvent::Started { attempt: 1 }).unwrap();
        let done = LifecycleEvent::Completed {
            raw_output: "raw".to_string(),
            payload: payload(),
        };
        apply(&mut worker, done.clone()).unwrap();
        let before = worker.clone();

        let err = apply(&mut worker, done).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(worker, before);
    }

    #[test]
    fn test_completed_cannot_fail() {
        let mut worker = registered();
        apply(&mut worker, LifecycleEvent::Started { attempt: 1 }).unwrap();
        apply(
            &mut worker,
            LifecycleEvent::Completed {
                raw_output: "raw".to_string(),
                payload: payload(),
            },
        )
        .unwrap();

        let err = apply(
            &mut worker,
            LifecycleEvent::Failed {
                raw_output: None,
                failure: FailureRecord::new(FailureKind::Timeout, "late"),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
        assert_eq!(worker.state, WorkerState::Completed);
    }

    #[test]
    fn test_start_timestamp_set_once_across_retries() {
        let mut worker = registered();
        apply(&mut worker, LifecycleEvent::Started { attempt: 1 }).unwrap();
        let first_start = worker.started_at;
        apply(
            &mut worker,
            LifecycleEvent::Failed {
                raw_output: Some("partial".to_string()),
                failure: FailureRecord::new(FailureKind::Timeout, "timed out"),
            },
        )
        .unwrap();
        apply(
            &mut worker,
            LifecycleEvent::RetryScheduled {
                attempt: 1,
                backoff_ms: 1000,
            },
        )
        .unwrap();
        apply(&mut worker, LifecycleEvent::Requeued).unwrap();
        apply(&mut worker, LifecycleEvent::Started { attempt: 2 }).unwrap();

        assert_eq!(worker.started_at, first_start);
        assert_eq!(worker.attempt, 2);
        assert_eq!(worker.raw_output.as_deref(), Some("partial"));
    }

    #[test]
    fn test_retry_without_output_keeps_earlier_attempt_tagged() {
        let mut worker = registered();
        apply(&mut worker, LifecycleEvent::Started { attempt: 1 }).unwrap();
        apply(
            &mut worker,
            LifecycleEvent::Failed {
                raw_output: Some("partial".to_string()),
                failure: FailureRecord::new(FailureKind::Timeout, "timed out"),
            },
        )
        .unwrap();
        assert!(!worker.output_is_stale());
        apply(
            &mut worker,
            LifecycleEvent::RetryScheduled {
                attempt: 1,
                backoff_ms: 1000,
            },
        )
        .unwrap();
        apply(&mut worker, LifecycleEvent::Requeued).unwrap();
        apply(&mut worker, LifecycleEvent::Started { attempt: 2 }).unwrap();
        apply(
            &mut worker,
            LifecycleEvent::Failed {
                raw_output: None,
                failure: FailureRecord::new(FailureKind::CommandNotFound, "gone"),
            },
        )
        .unwrap();

        assert_eq!(worker.raw_output.as_deref(), Some("partial"));
        assert_eq!(worker.raw_output_attempt, Some(1));
        assert!(worker.output_is_stale());
        assert_eq!(
            crate::quorum::WorkerOutcome::from_worker(&worker).note.as_deref(),
            Some("output is from attempt 1")
        );
    }

    #[test]
    fn test_sequence_gap_is_rejected() {
        let mut worker = registered();
        let entry = LedgerEntry::new(worker.id.clone(), 5, LifecycleEvent::Started { attempt: 1 });
        assert!(matches!(
            worker.apply(&entry),
            Err(TransitionError::SequenceGap {
                expected: 2,
                actual: 5,
                ..
            })
        ));
        assert_eq!(worker.state, WorkerState::Pending);
    }

    #[test]
    fn test_failed_keeps_raw_output() {
        let mut worker = registered();
        apply(&mut worker, LifecycleEvent::Started { attempt: 1 }).unwrap();
        apply(
            &mut worker,
            LifecycleEvent::Failed {
                raw_output: Some("{\"count\": number}".to_string()),
                failure: FailureRecord::new(
                    FailureKind::Rejected(crate::validation::RejectionKind::SchemaTemplate),
                    "schema template",
                ),
            },
        )
        .unwrap();
        assert_eq!(worker.state, WorkerState::Failed);
        assert_eq!(worker.raw_output.as_deref(), Some("{\"count\": number}"));
    }
}
