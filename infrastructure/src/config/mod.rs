//! Configuration file loading for cohort
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `COHORT_*` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./cohort.toml` or `./.cohort.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/cohort/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    FileChannelConfig, FileCohortConfig, FileConfig, FileLedgerConfig, FileOutputConfig,
    FileOutputFormat, FileRetryConfig, FileSupervisorConfig, FileValidationConfig,
    FileWorkerConfig,
};
pub use loader::ConfigLoader;
