//! Ledger port
//!
//! The ledger is the durable, append-only record of lifecycle events. It is
//! the source of truth for worker state; every cache is a projection of it.

use async_trait::async_trait;
use cohort_domain::LedgerEntry;
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(String),

    #[error("Ledger serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt ledger line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

/// Append-only store of lifecycle events
///
/// `append` returns only after the entry is durable. `load_all` returns every
/// entry in append order.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// In-memory ledger for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Io("ledger mutex poisoned".to_string()))?;
        entries.push(entry.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Io("ledger mutex poisoned".to_string()))?;
        Ok(entries.clone())
    }
}
