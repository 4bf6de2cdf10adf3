//! Worker state store: an in-memory arena backed by the ledger.
//!
//! Every transition follows the same write path:
//!
//! ```text
//! per-worker lock → check against cached worker → ledger append → project into arena
//! ```
//!
//! The arena is a projection of the ledger and never runs ahead of it. A
//! failed append leaves the arena exactly as it was.

use crate::ports::ledger::{LedgerError, LedgerStore};
use cohort_domain::{
    CohortId, LedgerEntry, LifecycleEvent, TransitionError, Worker, WorkerId, WorkerState, replay,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateStoreError {
    #[error("Unknown worker: {0}")]
    UnknownWorker(WorkerId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("State write task failed: {0}")]
    WriteAborted(String),
}

/// Result of [`StateStore::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The event was appended and projected; carries the new state.
    Applied(WorkerState),
    /// The event repeated a state the worker already reached. Nothing was written.
    Ignored(TransitionError),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// What is known about a worker before it is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDraft {
    pub cohort_id: CohortId,
    pub role: String,
    pub model: Option<String>,
    pub prompt: String,
}

impl WorkerDraft {
    pub fn new(cohort_id: CohortId, role: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            cohort_id,
            role: role.into(),
            model: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

pub struct StateStore {
    ledger: Arc<dyn LedgerStore>,
    arena: RwLock<HashMap<WorkerId, Worker>>,
    locks: Mutex<HashMap<WorkerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl StateStore {
    /// Open the store, rebuilding the arena from every ledger entry.
    pub async fn open(ledger: Arc<dyn LedgerStore>) -> Result<Self, StateStoreError> {
        let entries = ledger.load_all().await?;
        let projection = replay(&entries);

        for anomaly in &projection.anomalies {
            warn!("Ledger entry skipped during recovery: {}", anomaly);
        }
        info!(
            entries = entries.len(),
            applied = projection.applied,
            workers = projection.workers.len(),
            "State store recovered from ledger"
        );

        Ok(Self {
            ledger,
            arena: RwLock::new(projection.workers),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Register a new worker in `Pending`.
    pub async fn register(&self, draft: WorkerDraft) -> Result<WorkerId, StateStoreError> {
        let worker_id = WorkerId::generate();
        let entry = LedgerEntry::new(
            worker_id.clone(),
            1,
            LifecycleEvent::Registered {
                cohort_id: draft.cohort_id,
                role: draft.role,
                model: draft.model,
                prompt: draft.prompt,
            },
        );

        self.ledger.append(&entry).await?;
        let worker = Worker::register(&entry)?;
        debug!(worker_id = %worker_id, role = %worker.role, "Worker registered");
        self.arena
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker_id.clone(), worker);
        Ok(worker_id)
    }

    /// Record one lifecycle event for `worker_id`.
    ///
    /// The write runs on its own task: a caller that stops waiting does not
    /// leave the ledger and arena out of step.
    pub async fn apply(
        self: &Arc<Self>,
        worker_id: &WorkerId,
        event: LifecycleEvent,
    ) -> Result<TransitionOutcome, StateStoreError> {
        let store = Arc::clone(self);
        let worker_id = worker_id.clone();
        tokio::spawn(async move { store.write(&worker_id, event).await })
            .await
            .map_err(|e| StateStoreError::WriteAborted(e.to_string()))?
    }

    async fn write(
        &self,
        worker_id: &WorkerId,
        event: LifecycleEvent,
    ) -> Result<TransitionOutcome, StateStoreError> {
        let lock = self.worker_lock(worker_id);
        let _guard = lock.lock().await;

        let mut worker = self
            .snapshot(worker_id)
            .ok_or_else(|| StateStoreError::UnknownWorker(worker_id.clone()))?;

        match worker.check(&event) {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                warn!(worker_id = %worker_id, "Duplicate transition ignored: {}", e);
                return Ok(TransitionOutcome::Ignored(e));
            }
            Err(e) => {
                warn!(worker_id = %worker_id, "Transition rejected: {}", e);
                return Err(e.into());
            }
        }

        let entry = LedgerEntry::new(worker_id.clone(), worker.next_seq(), event);
        self.ledger.append(&entry).await?;
        worker.apply(&entry)?;

        debug!(
            worker_id = %worker_id,
            seq = entry.seq,
            state = %worker.state,
            "Transition recorded"
        );
        let state = worker.state;
        self.arena
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker_id.clone(), worker);

        // Completed and Cancelled accept no further events, so later writers
        // only read. Their lock can go.
        if matches!(state, WorkerState::Completed | WorkerState::Cancelled) {
            self.locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(worker_id);
        }
        Ok(TransitionOutcome::Applied(state))
    }

    fn worker_lock(&self, worker_id: &WorkerId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(worker_id.clone())
            .or_default()
            .clone()
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Cached copy of one worker.
    pub fn snapshot(&self, worker_id: &WorkerId) -> Option<Worker> {
        self.arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worker_id)
            .cloned()
    }

    /// Cached workers of one cohort, oldest registration first.
    pub fn cohort_workers(&self, cohort_id: &CohortId) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self
            .arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|w| &w.cohort_id == cohort_id)
            .cloned()
            .collect();
        workers.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then(a.id.as_str().cmp(b.id.as_str()))
        });
        workers
    }

    /// Every cached worker, oldest registration first.
    pub fn workers(&self) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self
            .arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        workers.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then(a.id.as_str().cmp(b.id.as_str()))
        });
        workers
    }

    /// State of `worker_id` as recorded in the ledger, bypassing the arena.
    pub async fn read_current_state(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Option<WorkerState>, StateStoreError> {
        let entries = self.ledger.load_all().await?;
        let relevant: Vec<&LedgerEntry> = entries
            .iter()
            .filter(|e| &e.worker_id == worker_id)
            .collect();
        Ok(replay(relevant)
            .workers
            .get(worker_id)
            .map(|w| w.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ledger::MemoryLedger;
    use crate::testing::FlakyLedger;
    use cohort_domain::{ExtractionStrategy, FailureKind, FailureRecord, ValidatedPayload};

    fn draft(role: &str) -> WorkerDraft {
        WorkerDraft::new(CohortId::from("c-1"), role, "review the plan")
    }

    fn completed() -> LifecycleEvent {
        LifecycleEvent::Completed {
            raw_output: "{\"issues\": []}".to_string(),
            payload: ValidatedPayload {
                value: serde_json::json!({"issues": []}),
                strategy: ExtractionStrategy::DirectParse,
                confidence: 0.95,
            },
        }
    }

    #[tokio::test]
    async fn test_register_and_apply() {
        let store = Arc::new(StateStore::open(Arc::new(MemoryLedger::new())).await.unwrap());
        let id = store.register(draft("claude")).await.unwrap();

        let outcome = store
            .apply(&id, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied(WorkerState::Running));

        let worker = store.snapshot(&id).unwrap();
        assert_eq!(worker.state, WorkerState::Running);
        assert_eq!(worker.attempt, 1);
        assert_eq!(store.cohort_workers(&CohortId::from("c-1")).len(), 1);
    }

    #[tokio::test]
    async fn duplicate_completion_is_a_logged_noop() {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(StateStore::open(ledger.clone()).await.unwrap());
        let id = store.register(draft("claude")).await.unwrap();
        store
            .apply(&id, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap();
        store.apply(&id, completed()).await.unwrap();
        let before = store.snapshot(&id).unwrap();
        let entries_before = ledger.len();

        let outcome = store.apply(&id, completed()).await.unwrap();

        assert!(matches!(outcome, TransitionOutcome::Ignored(ref e) if e.is_duplicate()));
        assert_eq!(store.snapshot(&id).unwrap(), before);
        assert_eq!(ledger.len(), entries_before);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_an_error() {
        let store = Arc::new(StateStore::open(Arc::new(MemoryLedger::new())).await.unwrap());
        let id = store.register(draft("claude")).await.unwrap();

        let err = store.apply(&id, completed()).await.unwrap_err();
        assert!(matches!(
            err,
            StateStoreError::Transition(TransitionError::Illegal { .. })
        ));
        assert_eq!(store.snapshot(&id).unwrap().state, WorkerState::Pending);
    }

    #[tokio::test]
    async fn failed_append_leaves_cache_untouched() {
        let ledger = Arc::new(FlakyLedger::new());
        let store = Arc::new(StateStore::open(ledger.clone()).await.unwrap());
        let id = store.register(draft("claude")).await.unwrap();
        let before = store.snapshot(&id).unwrap();

        ledger.set_failing(true);
        let err = store
            .apply(&id, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap_err();

        assert!(matches!(err, StateStoreError::Ledger(_)));
        assert_eq!(store.snapshot(&id).unwrap(), before);
        assert_eq!(
            store.read_current_state(&id).await.unwrap(),
            Some(WorkerState::Pending)
        );

        // The same event succeeds once the ledger recovers.
        ledger.set_failing(false);
        let outcome = store
            .apply(&id, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied(WorkerState::Running));
    }

    #[tokio::test]
    async fn recovery_replays_only_ledger() {
        let ledger = Arc::new(MemoryLedger::new());
        let first = Arc::new(StateStore::open(ledger.clone()).await.unwrap());
        let done = first.register(draft("claude")).await.unwrap();
        let running = first.register(draft("gemini")).await.unwrap();
        first
            .apply(&done, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap();
        first.apply(&done, completed()).await.unwrap();
        first
            .apply(&running, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap();
        let expected_done = first.snapshot(&done).unwrap();
        drop(first);

        let recovered = StateStore::open(ledger.clone()).await.unwrap();

        assert_eq!(recovered.workers().len(), 2);
        assert_eq!(recovered.snapshot(&done).unwrap(), expected_done);
        assert_eq!(
            recovered.snapshot(&running).unwrap().state,
            WorkerState::Running
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers_serialize_per_worker() {
        let store = Arc::new(StateStore::open(Arc::new(MemoryLedger::new())).await.unwrap());
        let id = store.register(draft("claude")).await.unwrap();

        let a = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                store
                    .apply(&id, LifecycleEvent::Started { attempt: 1 })
                    .await
            })
        };
        let b = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                store
                    .apply(&id, LifecycleEvent::Started { attempt: 1 })
                    .await
            })
        };
        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_applied()).count(), 1);
        assert_eq!(store.snapshot(&id).unwrap().last_seq, 2);
    }

    #[tokio::test]
    async fn finished_workers_release_their_lock() {
        let store = Arc::new(StateStore::open(Arc::new(MemoryLedger::new())).await.unwrap());
        let done = store.register(draft("claude")).await.unwrap();
        let failed = store.register(draft("codex")).await.unwrap();

        for id in [&done, &failed] {
            store
                .apply(id, LifecycleEvent::Started { attempt: 1 })
                .await
                .unwrap();
        }
        assert_eq!(store.lock_count(), 2);

        store.apply(&done, completed()).await.unwrap();
        store
            .apply(
                &failed,
                LifecycleEvent::Failed {
                    raw_output: None,
                    failure: FailureRecord::new(FailureKind::Timeout, "timed out"),
                },
            )
            .await
            .unwrap();

        // A failed worker may still be retried
        assert_eq!(store.lock_count(), 1);

        let outcome = store.apply(&done, completed()).await.unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(store.snapshot(&done).unwrap().state, WorkerState::Completed);
    }
}
