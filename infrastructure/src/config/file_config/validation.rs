//! Output validation configuration from TOML (`[validation]` section)

use cohort_domain::{ConfigIssue, ConfigIssueCode, ValidationRules};
use serde::{Deserialize, Serialize};

/// Raw validation configuration from TOML
///
/// Pattern lists extend the built-in ones instead of replacing them.
///
/// # Example
///
/// ```toml
/// [validation]
/// min_payload_bytes = 500
/// marker_field = "issues"
/// corruption_patterns = ["Approve this command?"]
/// banner_markers = ["Welcome to MyCLI"]
/// detect_shell_prompt = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileValidationConfig {
    pub min_payload_bytes: usize,
    /// Top-level field every accepted payload must carry
    pub marker_field: String,
    /// Extra interactive-terminal patterns
    pub corruption_patterns: Vec<String>,
    /// Extra CLI startup banners
    pub banner_markers: Vec<String>,
    pub detect_shell_prompt: bool,
}

impl Default for FileValidationConfig {
    fn default() -> Self {
        let rules = ValidationRules::default();
        Self {
            min_payload_bytes: rules.min_payload_bytes,
            marker_field: rules.marker_field,
            corruption_patterns: Vec::new(),
            banner_markers: Vec::new(),
            detect_shell_prompt: rules.detect_shell_prompt,
        }
    }
}

impl FileValidationConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.marker_field.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroValue {
                    field: "validation.marker_field".to_string(),
                },
                "validation.marker_field cannot be empty",
            ));
        }
        if self
            .corruption_patterns
            .iter()
            .chain(&self.banner_markers)
            .any(|p| p.is_empty())
        {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange {
                    field: "validation.corruption_patterns".to_string(),
                    value: "\"\"".to_string(),
                },
                "validation: empty patterns match everything and are ignored",
            ));
        }
        issues
    }

    pub fn to_rules(&self) -> ValidationRules {
        let mut rules = ValidationRules::default()
            .with_min_payload_bytes(self.min_payload_bytes)
            .with_marker_field(self.marker_field.trim());
        rules.detect_shell_prompt = self.detect_shell_prompt;

        let extra = |base: &mut Vec<String>, more: &[String]| {
            for pattern in more {
                if !pattern.is_empty() && !base.contains(pattern) {
                    base.push(pattern.clone());
                }
            }
        };
        extra(&mut rules.corruption_patterns, &self.corruption_patterns);
        extra(&mut rules.banner_markers, &self.banner_markers);
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_rules() {
        assert_eq!(
            FileValidationConfig::default().to_rules(),
            ValidationRules::default()
        );
    }

    #[test]
    fn test_extra_patterns_extend_builtins() {
        let config = FileValidationConfig {
            corruption_patterns: vec!["Approve this command?".to_string(), String::new()],
            ..Default::default()
        };
        let rules = config.to_rules();
        let builtin = ValidationRules::default().corruption_patterns.len();
        assert_eq!(rules.corruption_patterns.len(), builtin + 1);
        assert!(
            rules
                .corruption_patterns
                .contains(&"Approve this command?".to_string())
        );
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_empty_marker_field_is_error() {
        let config = FileValidationConfig {
            marker_field: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate()[0].is_error());
    }
}
