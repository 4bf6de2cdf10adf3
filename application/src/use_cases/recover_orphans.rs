//! Recover Orphans use case
//!
//! After a crash the ledger can hold workers that never reached a terminal
//! state. Nothing is supervising them any more, so they are failed through
//! the normal transition path with a systemic `OrphanedRun` classification.

use crate::state_store::{StateStore, StateStoreError};
use cohort_domain::{FailureKind, FailureRecord, LifecycleEvent, WorkerId, WorkerState};
use std::sync::Arc;
use tracing::{info, warn};

/// What a recovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub recovered: Vec<WorkerId>,
    pub terminal: usize,
}

pub struct RecoverOrphansUseCase {
    store: Arc<StateStore>,
}

impl RecoverOrphansUseCase {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self) -> Result<RecoveryReport, StateStoreError> {
        let mut report = RecoveryReport::default();

        for worker in self.store.workers() {
            if worker.is_terminal() {
                report.terminal += 1;
                continue;
            }

            warn!(
                worker_id = %worker.id,
                role = %worker.role,
                state = %worker.state,
                "Orphaned worker found"
            );

            if worker.state == WorkerState::Retrying {
                self.store
                    .apply(&worker.id, LifecycleEvent::Requeued)
                    .await?;
            }
            let failure = FailureRecord::new(
                FailureKind::OrphanedRun,
                format!("worker was left {} by a previous run", worker.state),
            );
            self.store
                .apply(
                    &worker.id,
                    LifecycleEvent::Failed {
                        raw_output: None,
                        failure,
                    },
                )
                .await?;
            report.recovered.push(worker.id);
        }

        info!(
            recovered = report.recovered.len(),
            terminal = report.terminal,
            "Recovery complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ledger::MemoryLedger;
    use crate::state_store::WorkerDraft;
    use cohort_domain::{CohortId, ErrorClass};

    #[tokio::test]
    async fn test_orphans_are_failed_as_systemic() {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(StateStore::open(ledger.clone()).await.unwrap());
        let draft = |role: &str| WorkerDraft::new(CohortId::from("c-1"), role, "p");

        let pending = store.register(draft("a")).await.unwrap();
        let running = store.register(draft("b")).await.unwrap();
        store
            .apply(&running, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap();
        let retrying = store.register(draft("c")).await.unwrap();
        store
            .apply(&retrying, LifecycleEvent::Started { attempt: 1 })
            .await
            .unwrap();
        store
            .apply(
                &retrying,
                LifecycleEvent::Failed {
                    raw_output: Some("partial".into()),
                    failure: FailureRecord::new(FailureKind::Timeout, "timed out"),
                },
            )
            .await
            .unwrap();
        store
            .apply(
                &retrying,
                LifecycleEvent::RetryScheduled {
                    attempt: 1,
                    backoff_ms: 1000,
                },
            )
            .await
            .unwrap();

        // Simulate a restart.
        let store = Arc::new(StateStore::open(ledger).await.unwrap());
        let report = RecoverOrphansUseCase::new(store.clone())
            .execute()
            .await
            .unwrap();

        assert_eq!(report.recovered.len(), 3);
        for id in [&pending, &running, &retrying] {
            let worker = store.snapshot(id).unwrap();
            assert_eq!(worker.state, WorkerState::Failed);
            let failure = worker.failure.unwrap();
            assert_eq!(failure.kind, FailureKind::OrphanedRun);
            assert_eq!(failure.class, ErrorClass::Systemic);
        }
        assert_eq!(
            store.snapshot(&retrying).unwrap().raw_output.as_deref(),
            Some("partial")
        );

        let again = RecoverOrphansUseCase::new(store).execute().await.unwrap();
        assert!(again.recovered.is_empty());
        assert_eq!(again.terminal, 3);
    }
}
