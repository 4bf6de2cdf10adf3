//! Ledger entry: the unit of durability.

use crate::core::ids::WorkerId;
use crate::worker::LifecycleEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One appended lifecycle event for one worker.
///
/// `seq` is strictly increasing per worker starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub worker_id: WorkerId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: LifecycleEvent,
}

impl LedgerEntry {
    pub fn new(worker_id: WorkerId, seq: u64, event: LifecycleEvent) -> Self {
        Self {
            worker_id,
            seq,
            timestamp: Utc::now(),
            event,
        }
    }
}
