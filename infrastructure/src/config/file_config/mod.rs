//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and converted into application parameters
//! before any use case sees them.

mod channel;
mod cohort;
mod ledger;
mod output;
mod retry;
mod validation;
mod workers;

pub use channel::FileChannelConfig;
pub use cohort::FileCohortConfig;
pub use ledger::FileLedgerConfig;
pub use output::{FileOutputConfig, FileOutputFormat};
pub use retry::{FileRetryConfig, FileSupervisorConfig};
pub use validation::FileValidationConfig;
pub use workers::FileWorkerConfig;

use cohort_application::{CohortSettings, WorkerCatalog};
use cohort_domain::{ConfigIssue, ConfigIssueCode, WrapperProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Cohort size, membership and quorum
    pub cohort: FileCohortConfig,
    /// Completion detection tuning
    pub channel: FileChannelConfig,
    /// Output acceptance rules
    pub validation: FileValidationConfig,
    /// Backoff for retryable failures
    pub retry: FileRetryConfig,
    /// State write deadline
    pub supervisor: FileSupervisorConfig,
    /// Durable event log location
    pub ledger: FileLedgerConfig,
    /// Output settings
    pub output: FileOutputConfig,
    /// Launch recipes keyed by role
    pub workers: BTreeMap<String, FileWorkerConfig>,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    ///
    /// This is the single entry point for config validation. It checks:
    /// 1. Each section on its own (zero values, unknown enum strings)
    /// 2. Worker profiles (empty commands)
    /// 3. Cross-section references (cohort roles and secondary role must
    ///    name configured, enabled workers)
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        // 1. Sections
        issues.extend(self.cohort.validate());
        issues.extend(self.channel.validate());
        issues.extend(self.validation.validate());
        issues.extend(self.retry.validate());
        issues.extend(self.supervisor.validate());

        // 2. Workers
        issues.extend(workers::validate_workers(&self.workers));

        // 3. References
        for role in &self.cohort.roles {
            match self.workers.get(role) {
                None => issues.push(ConfigIssue::error(
                    ConfigIssueCode::UnknownRole {
                        field: "cohort.roles".to_string(),
                        role: role.clone(),
                    },
                    format!("cohort.roles: '{}' has no [workers.{}] section", role, role),
                )),
                Some(worker) if !worker.enabled => issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownRole {
                        field: "cohort.roles".to_string(),
                        role: role.clone(),
                    },
                    format!(
                        "cohort.roles: '{}' is disabled and will always fail",
                        role
                    ),
                )),
                Some(_) => {}
            }
        }

        if let Some(role) = &self.cohort.secondary_role
            && !self.workers.get(role).is_some_and(|w| w.enabled)
        {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::UnknownRole {
                    field: "cohort.secondary_role".to_string(),
                    role: role.clone(),
                },
                format!(
                    "cohort.secondary_role: '{}' is not an enabled worker; split answers will be escalated",
                    role
                ),
            ));
        }

        if self.cohort.roles.is_empty() && !self.workers.is_empty() {
            let enabled = self.member_candidates().len();
            if enabled < self.cohort.size {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::OutOfRange {
                        field: "cohort.size".to_string(),
                        value: self.cohort.size.to_string(),
                    },
                    format!(
                        "cohort.size is {} but only {} enabled workers are configured",
                        self.cohort.size, enabled
                    ),
                ));
            }
        }

        issues
    }

    /// Roles a cohort is started with when the caller names none.
    ///
    /// Explicit `cohort.roles` win; otherwise the first `cohort.size` enabled
    /// workers in name order, leaving out the secondary validator.
    pub fn cohort_roles(&self) -> Vec<String> {
        if !self.cohort.roles.is_empty() {
            return self.cohort.roles.clone();
        }
        self.member_candidates()
            .into_iter()
            .take(self.cohort.size)
            .collect()
    }

    fn member_candidates(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|(role, worker)| {
                worker.enabled && self.cohort.secondary_role.as_deref() != Some(role.as_str())
            })
            .map(|(role, _)| role.clone())
            .collect()
    }

    pub fn catalog(&self) -> WorkerCatalog {
        workers::to_catalog(&self.workers)
    }

    /// Convert into the parameters the coordinator runs with.
    pub fn to_settings(&self) -> (CohortSettings, Vec<ConfigIssue>) {
        let (cohort, issues) = self.cohort.to_params();
        let settings = CohortSettings {
            channel: self.channel.to_params(),
            validation: self.validation.to_rules(),
            retry: self.retry.to_policy(),
            supervisor: self.supervisor.to_params(),
            cohort,
            wrapper: WrapperProfile::default(),
        };
        (settings, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_domain::{OutputFormat, QuorumRule};
    use std::time::Duration;

    const FULL: &str = r#"
[cohort]
roles = ["claude", "codex"]
quorum = "unanimous"
overall_timeout_secs = 300
secondary_role = "judge"

[channel]
quiescence_secs = 3
poll_interval_ms = 250

[retry]
max_attempts = 2

[ledger]
path = "/var/lib/cohort/ledger.jsonl"

[output]
format = "json"
color = false

[workers.claude]
command = "claude"
args = ["-p"]

[workers.codex]
command = "codex"
args = ["exec"]

[workers.judge]
command = "claude"
args = ["-p", "--model", "opus"]
"#;

    #[test]
    fn test_deserialize_full_config() {
        let config: FileConfig = toml::from_str(FULL).unwrap();
        assert_eq!(config.cohort.roles, vec!["claude", "codex"]);
        assert_eq!(config.channel.quiescence_secs, 3);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(
            config.ledger.path,
            std::path::PathBuf::from("/var/lib/cohort/ledger.jsonl")
        );
        assert_eq!(config.output.format, Some(OutputFormat::Json));
        assert!(!config.output.color);
        assert_eq!(config.workers.len(), 3);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_to_settings() {
        let config: FileConfig = toml::from_str(FULL).unwrap();
        let (settings, issues) = config.to_settings();
        assert!(issues.is_empty());
        assert_eq!(settings.cohort.quorum, QuorumRule::Unanimous);
        assert_eq!(settings.cohort.overall_timeout, Duration::from_secs(300));
        assert_eq!(settings.cohort.secondary_role.as_deref(), Some("judge"));
        assert_eq!(settings.channel.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.retry.max_attempts, 2);
    }

    #[test]
    fn test_default_config() {
        let config = FileConfig::default();
        assert_eq!(config.cohort.size, 3);
        assert!(config.workers.is_empty());
        assert!(config.output.color);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_cohort_roles_skip_disabled_and_secondary() {
        let config: FileConfig = toml::from_str(
            r#"
[cohort]
size = 2
secondary_role = "judge"

[workers.alpha]
command = "a"

[workers.beta]
command = "b"
enabled = false

[workers.gamma]
command = "c"

[workers.judge]
command = "j"
"#,
        )
        .unwrap();
        assert_eq!(config.cohort_roles(), vec!["alpha", "gamma"]);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_reports_missing_worker() {
        let config: FileConfig = toml::from_str(
            r#"
[cohort]
roles = ["claude", "ghost"]

[workers.claude]
command = "claude"
"#,
        )
        .unwrap();
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
        assert_eq!(
            issues[0].code,
            ConfigIssueCode::UnknownRole {
                field: "cohort.roles".to_string(),
                role: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_validate_warns_on_disabled_member() {
        let config: FileConfig = toml::from_str(
            r#"
[cohort]
roles = ["claude"]

[workers.claude]
command = "claude"
enabled = false
"#,
        )
        .unwrap();
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_error());
    }

    #[test]
    fn test_validate_collects_issues_across_sections() {
        let config: FileConfig = toml::from_str(
            r#"
[cohort]
size = 0
quorum = "most"

[channel]
quiescence_secs = 900
invocation_timeout_secs = 600
"#,
        )
        .unwrap();
        let issues = config.validate();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues.iter().filter(|i| i.is_error()).count(), 2);
    }
}
