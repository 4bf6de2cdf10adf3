//! Execution channel configuration from TOML (`[channel]` section)

use cohort_application::ChannelParams;
use cohort_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw channel configuration from TOML
///
/// # Example
///
/// ```toml
/// [channel]
/// invocation_timeout_secs = 600
/// quiescence_secs = 2
/// min_sink_bytes = 1000
/// large_input_threshold = 1000
/// poll_interval_ms = 500
/// post_signal_timeout_secs = 60
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileChannelConfig {
    pub invocation_timeout_secs: u64,
    /// Sink must stop growing for this long before it is read
    pub quiescence_secs: u64,
    pub min_sink_bytes: u64,
    /// Inputs longer than this go through a wrapper script
    pub large_input_threshold: usize,
    pub poll_interval_ms: u64,
    pub post_signal_timeout_secs: u64,
}

impl Default for FileChannelConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_secs: 600,
            quiescence_secs: 2,
            min_sink_bytes: 1000,
            large_input_threshold: 1000,
            poll_interval_ms: 500,
            post_signal_timeout_secs: 60,
        }
    }
}

impl FileChannelConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for (field, value) in [
            ("channel.invocation_timeout_secs", self.invocation_timeout_secs),
            ("channel.poll_interval_ms", self.poll_interval_ms),
            ("channel.post_signal_timeout_secs", self.post_signal_timeout_secs),
        ] {
            if value == 0 {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::ZeroValue {
                        field: field.to_string(),
                    },
                    format!("{} must be at least 1", field),
                ));
            }
        }

        if self.quiescence_secs >= self.invocation_timeout_secs {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::OutOfRange {
                    field: "channel.quiescence_secs".to_string(),
                    value: self.quiescence_secs.to_string(),
                },
                format!(
                    "channel.quiescence_secs ({}) must be shorter than channel.invocation_timeout_secs ({})",
                    self.quiescence_secs, self.invocation_timeout_secs
                ),
            ));
        }

        issues
    }

    pub fn to_params(&self) -> ChannelParams {
        ChannelParams::default()
            .with_invocation_timeout(Duration::from_secs(self.invocation_timeout_secs))
            .with_quiescence_window(Duration::from_secs(self.quiescence_secs))
            .with_min_sink_bytes(self.min_sink_bytes)
            .with_large_input_threshold(self.large_input_threshold)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms.max(1)))
            .with_post_signal_timeout(Duration::from_secs(self.post_signal_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_params() {
        assert_eq!(FileChannelConfig::default().to_params(), ChannelParams::default());
        assert!(FileChannelConfig::default().validate().is_empty());
    }

    #[test]
    fn test_quiescence_must_be_shorter_than_timeout() {
        let config = FileChannelConfig {
            quiescence_secs: 30,
            invocation_timeout_secs: 30,
            ..Default::default()
        };
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
    }

    #[test]
    fn test_zero_poll_interval_is_error() {
        let config = FileChannelConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().iter().any(|i| matches!(
            &i.code,
            ConfigIssueCode::ZeroValue { field } if field == "channel.poll_interval_ms"
        )));
    }
}
