//! Tunable validation rules.

use serde::{Deserialize, Serialize};

/// Rules applied by the [`ResultValidator`](super::ResultValidator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Payloads smaller than this are treated as incomplete.
    pub min_payload_bytes: usize,
    /// Top-level field every accepted payload must carry.
    pub marker_field: String,
    /// Substrings that mean the sink captured interactive terminal content.
    pub corruption_patterns: Vec<String>,
    /// Startup banners printed by worker CLIs before any answer.
    pub banner_markers: Vec<String>,
    /// Treat a `user@host:...$` line as corruption.
    pub detect_shell_prompt: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_payload_bytes: 500,
            marker_field: "issues".to_string(),
            corruption_patterns: vec![
                "How do you want to proceed".to_string(),
                "Do you want to proceed?".to_string(),
                "Press Enter to continue".to_string(),
                "codex\n\nShort answer:".to_string(),
            ],
            banner_markers: vec![
                "OpenAI Codex v".to_string(),
                "User instructions:".to_string(),
                "Loaded cached credentials".to_string(),
            ],
            detect_shell_prompt: true,
        }
    }
}

impl ValidationRules {
    pub fn with_min_payload_bytes(mut self, bytes: usize) -> Self {
        self.min_payload_bytes = bytes;
        self
    }

    pub fn with_marker_field(mut self, field: impl Into<String>) -> Self {
        self.marker_field = field.into();
        self
    }
}
