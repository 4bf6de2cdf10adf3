//! Durable ledger adapters

mod jsonl_ledger;

pub use jsonl_ledger::JsonlLedger;
