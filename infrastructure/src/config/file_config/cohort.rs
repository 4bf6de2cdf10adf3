//! Cohort configuration from TOML (`[cohort]` section)

use cohort_application::CohortParams;
use cohort_domain::{ConfigIssue, ConfigIssueCode, QuorumRule, Severity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw cohort configuration from TOML
///
/// # Example
///
/// ```toml
/// [cohort]
/// size = 3
/// roles = ["claude", "gemini", "codex"]   # empty = first `size` enabled workers
/// quorum = "auto"                          # "auto", "majority", "unanimous", "atleast:N", "N%"
/// overall_timeout_secs = 900
/// secondary_role = "judge"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCohortConfig {
    /// Number of workers per cohort when `roles` is empty
    pub size: usize,
    /// Explicit member roles
    pub roles: Vec<String>,
    /// Quorum rule string
    pub quorum: String,
    pub overall_timeout_secs: u64,
    /// Seconds cancelled members get to stop after the overall timeout
    pub cancel_grace_secs: u64,
    pub notification_capacity: usize,
    /// Worker role used for secondary validation
    pub secondary_role: Option<String>,
}

impl Default for FileCohortConfig {
    fn default() -> Self {
        Self {
            size: 3,
            roles: Vec::new(),
            quorum: "auto".to_string(),
            overall_timeout_secs: 900,
            cancel_grace_secs: 10,
            notification_capacity: 64,
            secondary_role: None,
        }
    }
}

impl FileCohortConfig {
    /// Parse the quorum string, falling back to `auto` with a warning.
    pub fn parse_quorum(&self) -> (QuorumRule, Vec<ConfigIssue>) {
        match self.quorum.parse::<QuorumRule>() {
            Ok(rule) => (rule, vec![]),
            Err(reason) => {
                let issue = ConfigIssue {
                    severity: Severity::Warning,
                    code: ConfigIssueCode::InvalidEnumValue {
                        field: "cohort.quorum".to_string(),
                        value: self.quorum.clone(),
                        valid_values: vec![
                            "auto".to_string(),
                            "majority".to_string(),
                            "unanimous".to_string(),
                            "atleast:N".to_string(),
                            "N%".to_string(),
                        ],
                    },
                    message: format!("cohort.quorum: {}, falling back to 'auto'", reason),
                };
                (QuorumRule::Auto, vec![issue])
            }
        }
    }

    /// Number of members a cohort started from this config will have.
    pub fn effective_size(&self) -> usize {
        if self.roles.is_empty() {
            self.size
        } else {
            self.roles.len()
        }
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.parse_quorum().1;

        if self.size == 0 && self.roles.is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroValue {
                    field: "cohort.size".to_string(),
                },
                "cohort.size must be at least 1",
            ));
        }
        if self.overall_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroValue {
                    field: "cohort.overall_timeout_secs".to_string(),
                },
                "cohort.overall_timeout_secs must be at least 1",
            ));
        }
        if self.notification_capacity == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroValue {
                    field: "cohort.notification_capacity".to_string(),
                },
                "cohort.notification_capacity must be at least 1",
            ));
        }

        let (rule, _) = self.parse_quorum();
        let size = self.effective_size();
        if let QuorumRule::AtLeast(required) = rule
            && size > 0
            && required > size
        {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::QuorumExceedsCohort { required, size },
                format!(
                    "cohort.quorum: asks for {} of {} members, clamped to {}",
                    required, size, size
                ),
            ));
        }

        issues
    }

    pub fn to_params(&self) -> (CohortParams, Vec<ConfigIssue>) {
        let (quorum, issues) = self.parse_quorum();
        let params = CohortParams {
            quorum,
            overall_timeout: Duration::from_secs(self.overall_timeout_secs),
            cancel_grace: Duration::from_secs(self.cancel_grace_secs),
            notification_capacity: self.notification_capacity.max(1),
            secondary_role: self.secondary_role.clone(),
        };
        (params, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_params() {
        let (params, issues) = FileCohortConfig::default().to_params();
        assert!(issues.is_empty());
        assert_eq!(params, CohortParams::default());
    }

    #[test]
    fn test_parse_quorum_variants() {
        let mut config = FileCohortConfig::default();
        for (raw, expected) in [
            ("majority", QuorumRule::Majority),
            ("atleast:2", QuorumRule::AtLeast(2)),
            ("75%", QuorumRule::Percentage(75)),
        ] {
            config.quorum = raw.to_string();
            assert_eq!(config.parse_quorum().0, expected);
        }
    }

    #[test]
    fn test_unknown_quorum_falls_back_with_warning() {
        let config = FileCohortConfig {
            quorum: "most".to_string(),
            ..Default::default()
        };
        let (rule, issues) = config.parse_quorum();
        assert_eq!(rule, QuorumRule::Auto);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_zero_size_is_error() {
        let config = FileCohortConfig {
            size: 0,
            ..Default::default()
        };
        assert!(config.validate().iter().any(|i| i.is_error()));
    }

    #[test]
    fn test_quorum_larger_than_roles_is_warned() {
        let config = FileCohortConfig {
            roles: vec!["a".to_string(), "b".to_string()],
            quorum: "atleast:3".to_string(),
            ..Default::default()
        };
        let issues = config.validate();
        assert!(matches!(
            issues[0].code,
            ConfigIssueCode::QuorumExceedsCohort {
                required: 3,
                size: 2
            }
        ));
    }
}
