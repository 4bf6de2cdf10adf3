//! Worker profiles from TOML (`[workers.<role>]` sections)

use cohort_application::{WorkerCatalog, WorkerProfile};
use cohort_domain::{ConfigIssue, ConfigIssueCode, InvocationSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw worker configuration from TOML
///
/// The prompt is appended as the final argument when a cohort runs.
///
/// # Example
///
/// ```toml
/// [workers.claude]
/// command = "claude"
/// args = ["-p", "--output-format", "text"]
/// model = "claude-sonnet-4.5"
///
/// [workers.codex]
/// command = "codex"
/// args = ["exec", "--skip-git-repo-check"]
/// env = { CODEX_QUIET_MODE = "1" }
/// enabled = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWorkerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Model label recorded on every worker of this role
    pub model: Option<String>,
    pub enabled: bool,
    pub working_dir: Option<PathBuf>,
}

impl Default for FileWorkerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            model: None,
            enabled: true,
            working_dir: None,
        }
    }
}

impl FileWorkerConfig {
    pub fn to_profile(&self, role: &str) -> WorkerProfile {
        let mut invocation = InvocationSpec::new(self.command.trim()).with_args(self.args.clone());
        invocation.env = self.env.clone();
        invocation.working_dir = self.working_dir.clone();

        let mut profile = WorkerProfile::new(role, invocation);
        if let Some(model) = &self.model {
            profile = profile.with_model(model);
        }
        if !self.enabled {
            profile = profile.disabled();
        }
        profile
    }
}

/// Validate every worker section.
pub fn validate_workers(workers: &BTreeMap<String, FileWorkerConfig>) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    for (role, worker) in workers {
        if worker.command.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyCommand { role: role.clone() },
                format!("workers.{}: command cannot be empty", role),
            ));
        }
        if let Some(dir) = &worker.working_dir
            && !dir.is_dir()
        {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange {
                    field: format!("workers.{}.working_dir", role),
                    value: dir.display().to_string(),
                },
                format!(
                    "workers.{}.working_dir: {} is not a directory",
                    role,
                    dir.display()
                ),
            ));
        }
    }
    issues
}

/// Build the worker catalog from every worker section.
pub fn to_catalog(workers: &BTreeMap<String, FileWorkerConfig>) -> WorkerCatalog {
    workers
        .iter()
        .fold(WorkerCatalog::new(), |catalog, (role, worker)| {
            catalog.with(worker.to_profile(role))
        })
}
