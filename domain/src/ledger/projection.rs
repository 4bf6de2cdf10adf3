//! Rebuild worker records from ledger entries.

use super::entry::LedgerEntry;
use crate::core::ids::WorkerId;
use crate::worker::{TransitionError, Worker};
use std::collections::HashMap;

/// Result of replaying a ledger.
#[derive(Debug, Default)]
pub struct Replay {
    pub workers: HashMap<WorkerId, Worker>,
    /// Entries that could not be applied. Replay continues past them.
    pub anomalies: Vec<TransitionError>,
    pub applied: usize,
}

/// Replay entries in ledger order.
///
/// Duplicate events are skipped silently (they can only appear if a write was
/// retried after a successful append). Any other rejection is reported as an
/// anomaly and the entry is skipped.
pub fn replay<'a, I>(entries: I) -> Replay
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut replay = Replay::default();

    for entry in entries {
        let result = match replay.workers.get_mut(&entry.worker_id) {
            Some(worker) => worker.apply(entry),
            None => Worker::register(entry).map(|worker| {
                replay.workers.insert(entry.worker_id.clone(), worker);
            }),
        };

        match result {
            Ok(()) => replay.applied += 1,
            Err(e) if e.is_duplicate() => {}
            Err(e) => replay.anomalies.push(e),
        }
    }

    replay
}
