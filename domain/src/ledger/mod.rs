//! Append-only lifecycle ledger model.
//!
//! The ledger is the source of truth for worker state. Any in-memory view is a
//! projection rebuilt with [`replay`].

pub mod entry;
pub mod projection;

pub use entry::LedgerEntry;
pub use projection::{Replay, replay};
