//! Ledger configuration from TOML (`[ledger]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw ledger configuration from TOML
///
/// ```toml
/// [ledger]
/// path = ".cohort/ledger.jsonl"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLedgerConfig {
    /// JSONL ledger file, relative to the working directory unless absolute
    pub path: PathBuf,
}

impl Default for FileLedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".cohort").join("ledger.jsonl"),
        }
    }
}
