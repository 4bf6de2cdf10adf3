//! Retry and supervisor configuration from TOML (`[retry]`, `[supervisor]`)

use cohort_application::{RetryPolicy, SupervisorParams};
use cohort_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw retry configuration from TOML
///
/// # Example
///
/// ```toml
/// [retry]
/// max_attempts = 3
/// initial_backoff_ms = 1000
/// max_backoff_ms = 30000
/// multiplier = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for FileRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl FileRetryConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.max_attempts == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::ZeroValue {
                    field: "retry.max_attempts".to_string(),
                },
                "retry.max_attempts: 0 is treated as 1 (no retries)",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange {
                    field: "retry.multiplier".to_string(),
                    value: self.multiplier.to_string(),
                },
                format!(
                    "retry.multiplier: {} is below 1.0, falling back to 1.0",
                    self.multiplier
                ),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange {
                    field: "retry.max_backoff_ms".to_string(),
                    value: self.max_backoff_ms.to_string(),
                },
                "retry.max_backoff_ms is shorter than retry.initial_backoff_ms; every wait is capped",
            ));
        }
        issues
    }

    pub fn to_policy(&self) -> RetryPolicy {
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        RetryPolicy {
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier,
            ..RetryPolicy::default()
                .with_max_attempts(self.max_attempts)
                .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
        }
    }
}

/// Raw supervisor configuration from TOML
///
/// ```toml
/// [supervisor]
/// record_timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSupervisorConfig {
    /// A state write slower than this marks the worker stuck
    pub record_timeout_secs: u64,
}

impl Default for FileSupervisorConfig {
    fn default() -> Self {
        Self {
            record_timeout_secs: 30,
        }
    }
}

impl FileSupervisorConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        if self.record_timeout_secs == 0 {
            return vec![ConfigIssue::error(
                ConfigIssueCode::ZeroValue {
                    field: "supervisor.record_timeout_secs".to_string(),
                },
                "supervisor.record_timeout_secs must be at least 1",
            )];
        }
        vec![]
    }

    pub fn to_params(&self) -> SupervisorParams {
        SupervisorParams {
            record_timeout: Duration::from_secs(self.record_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_application() {
        assert_eq!(FileRetryConfig::default().to_policy(), RetryPolicy::default());
        assert_eq!(
            FileSupervisorConfig::default().to_params(),
            SupervisorParams::default()
        );
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let config = FileRetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.to_policy().max_attempts, 1);
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_shrinking_multiplier_is_clamped() {
        let config = FileRetryConfig {
            multiplier: 0.5,
            ..Default::default()
        };
        assert_eq!(config.to_policy().multiplier, 1.0);
        assert!(!config.validate().is_empty());
    }

    #[test]
    fn test_zero_record_timeout_is_error() {
        let config = FileSupervisorConfig {
            record_timeout_secs: 0,
        };
        assert!(config.validate()[0].is_error());
    }
}
