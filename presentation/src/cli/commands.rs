//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for cohort reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Full report as JSON
    Json,
}

impl From<OutputFormat> for cohort_domain::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => cohort_domain::OutputFormat::Text,
            OutputFormat::Json => cohort_domain::OutputFormat::Json,
        }
    }
}

/// CLI arguments for cohort
#[derive(Parser, Debug)]
#[command(name = "cohort")]
#[command(author, version, about = "Multi-agent supervisor - run a cohort of AI CLIs and merge their findings")]
#[command(long_about = r#"
Cohort runs the same review prompt through several AI CLI workers at once,
supervises each process until it has produced a complete, validated answer,
and merges the answers into issues with a decided disposition.

Every worker transition is appended to a ledger, so `status` and `recover`
work after a crash.

Configuration files are loaded from (in priority order):
1. COHORT_* environment variables (COHORT_CHANNEL__POLL_INTERVAL_MS=250)
2. --config <path>     Explicit config file
3. ./cohort.toml       Project-level config
4. ~/.config/cohort/config.toml   Global config

Example:
  cohort run "Review the migration plan in PLAN.md"
  cohort run -r claude -r codex --prompt-file review.txt
  cohort status
  cohort recover
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Report format (defaults to [output].format, then text)
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one cohort and print its report
    Run(RunArgs),

    /// Show the state of every worker recorded in the ledger
    Status {
        /// Only show workers of this cohort
        #[arg(long, value_name = "COHORT_ID")]
        cohort: Option<String>,
    },

    /// Mark workers left running by a crashed process as failed
    Recover,
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Prompt sent to every worker
    pub prompt: Option<String>,

    /// Read a prompt from a file; repeat once per role for per-role prompts
    #[arg(long, value_name = "PATH", conflicts_with = "prompt")]
    pub prompt_file: Vec<PathBuf>,

    /// Worker roles to run (defaults to [cohort].roles)
    #[arg(short, long = "role", value_name = "ROLE")]
    pub roles: Vec<String>,

    /// Checkpoint label recorded on the cohort
    #[arg(long, value_name = "ID")]
    pub checkpoint: Option<String>,

    /// Quorum rule override: auto, majority, unanimous, atleast:N, N%
    #[arg(long, value_name = "RULE")]
    pub quorum: Option<String>,

    /// Overall cohort timeout override in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Append auto-applied answers to this JSONL file
    #[arg(long, value_name = "PATH")]
    pub decisions: Option<PathBuf>,
}
