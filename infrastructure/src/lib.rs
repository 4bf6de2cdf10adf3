//! Infrastructure layer for cohort
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: local process execution, the JSONL ledger,
//! the decision log, and configuration file loading.

pub mod config;
pub mod execution;
pub mod ledger;
pub mod logging;

// Re-export commonly used types
pub use config::{
    ConfigLoader, FileChannelConfig, FileCohortConfig, FileConfig, FileLedgerConfig,
    FileOutputConfig, FileOutputFormat, FileRetryConfig, FileSupervisorConfig,
    FileValidationConfig, FileWorkerConfig,
};
pub use execution::ProcessBackend;
pub use ledger::JsonlLedger;
pub use logging::JsonlDecisionLog;
