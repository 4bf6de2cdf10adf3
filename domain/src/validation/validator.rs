//! Ordered acceptance checks for extracted payloads.

use super::rejection::{Rejection, RejectionKind};
use super::rules::ValidationRules;
use super::template::is_schema_template;
use crate::extraction::{Candidate, ExtractionStrategy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static SHELL_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[A-Za-z0-9._-]+@[A-Za-z0-9._-]+:[^\n]*[$#]\s*$")
        .expect("SHELL_PROMPT regex should compile")
});

/// A payload that passed every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPayload {
    pub value: Value,
    pub strategy: ExtractionStrategy,
    pub confidence: f32,
}

/// Runs the acceptance checks in a fixed order and reports the first failure.
///
/// 1. corruption in the raw sink
/// 2. banner-only output
/// 3. size floor
/// 4. schema template echo
/// 5. structural parse
#[derive(Debug, Clone, Default)]
pub struct ResultValidator {
    rules: ValidationRules,
}

impl ResultValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub fn validate(
        &self,
        raw: &str,
        candidate: &Candidate,
    ) -> Result<ValidatedPayload, Rejection> {
        self.check_corruption(raw)?;
        self.check_headers_only(raw)?;

        let text = candidate.text.as_str();
        if text.len() < self.rules.min_payload_bytes {
            return Err(Rejection::new(
                RejectionKind::TooSmall,
                format!(
                    "{} bytes, need at least {}",
                    text.len(),
                    self.rules.min_payload_bytes
                ),
            ));
        }

        if is_schema_template(text) {
            return Err(Rejection::new(
                RejectionKind::SchemaTemplate,
                "payload contains type placeholders instead of values",
            ));
        }

        let value = self.check_structure(text)?;
        Ok(ValidatedPayload {
            value,
            strategy: candidate.strategy,
            confidence: candidate.confidence,
        })
    }

    fn check_corruption(&self, raw: &str) -> Result<(), Rejection> {
        if let Some(pattern) = self
            .rules
            .corruption_patterns
            .iter()
            .find(|p| raw.contains(p.as_str()))
        {
            return Err(Rejection::new(
                RejectionKind::Corruption,
                format!("output contains interactive prompt {pattern:?}"),
            ));
        }

        if self.rules.detect_shell_prompt
            && let Some(m) = SHELL_PROMPT.find(raw)
        {
            return Err(Rejection::new(
                RejectionKind::Corruption,
                format!("output contains shell prompt {:?}", m.as_str().trim()),
            ));
        }

        Ok(())
    }

    fn check_headers_only(&self, raw: &str) -> Result<(), Rejection> {
        let has_banner = self
            .rules
            .banner_markers
            .iter()
            .any(|b| raw.contains(b.as_str()));
        let marker = format!("\"{}\"", self.rules.marker_field);

        if has_banner && !raw.contains('{') && !raw.contains(&marker) {
            return Err(Rejection::new(
                RejectionKind::HeadersOnly,
                "output holds only the tool banner",
            ));
        }
        Ok(())
    }

    fn check_structure(&self, text: &str) -> Result<Value, Rejection> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Rejection::new(RejectionKind::Structural, format!("parse error: {e}")))?;

        let Value::Object(map) = &value else {
            return Err(Rejection::new(
                RejectionKind::Structural,
                "payload is not a JSON object",
            ));
        };

        if !map.contains_key(&self.rules.marker_field) {
            return Err(Rejection::new(
                RejectionKind::Structural,
                format!("missing required field '{}'", self.rules.marker_field),
            ));
        }

        Ok(value)
    }
}
