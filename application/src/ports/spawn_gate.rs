//! Spawn admission port
//!
//! Workers ask the gate before launching. The default gate admits everyone;
//! a bounded gate caps how many workers run at once across cohorts.

use async_trait::async_trait;
use cohort_domain::CohortId;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Held for as long as an admitted worker runs.
#[derive(Debug)]
pub struct SpawnPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl SpawnPermit {
    pub fn unbounded() -> Self {
        Self { _permit: None }
    }
}

#[async_trait]
pub trait SpawnGate: Send + Sync {
    /// Wait until a worker of `role` in `cohort_id` may launch.
    async fn admit(&self, cohort_id: &CohortId, role: &str) -> SpawnPermit;
}

/// Admits every worker immediately.
pub struct OpenGate;

#[async_trait]
impl SpawnGate for OpenGate {
    async fn admit(&self, _cohort_id: &CohortId, _role: &str) -> SpawnPermit {
        SpawnPermit::unbounded()
    }
}

/// Admits at most `limit` concurrent workers.
pub struct BoundedGate {
    semaphore: Arc<Semaphore>,
}

impl BoundedGate {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl SpawnGate for BoundedGate {
    async fn admit(&self, _cohort_id: &CohortId, _role: &str) -> SpawnPermit {
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => SpawnPermit {
                _permit: Some(permit),
            },
            // The semaphore is never closed; fall back to admitting.
            Err(_) => SpawnPermit::unbounded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_gate_releases_on_drop() {
        let gate = BoundedGate::new(1);
        let cohort = CohortId::from("c-1");
        let permit = gate.admit(&cohort, "a").await;
        assert_eq!(gate.available(), 0);
        drop(permit);
        assert_eq!(gate.available(), 1);
    }
}
