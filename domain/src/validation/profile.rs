//! Cheap diagnostics over captured output, used for logging.

use super::template::is_schema_template;
use std::time::Duration;

const SUSPICIOUS_ELAPSED: Duration = Duration::from_secs(30);
const SUSPICIOUS_BYTES: usize = 1000;
const PREVIEW_CHARS: usize = 120;

/// Shape of a captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputProfile {
    pub bytes: usize,
    pub lines: usize,
    pub starts_with_structure: bool,
    pub has_structure: bool,
    pub has_fence: bool,
    pub has_type_tokens: bool,
    pub has_template_vars: bool,
    pub head: String,
    pub tail: String,
}

impl OutputProfile {
    pub fn of(raw: &str) -> Self {
        let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
        let head = lines.next().map(preview).unwrap_or_default();
        let tail = raw
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(preview)
            .unwrap_or_default();

        Self {
            bytes: raw.len(),
            lines: raw.lines().count(),
            starts_with_structure: raw.trim_start().starts_with(['{', '[']),
            has_structure: raw.contains('{'),
            has_fence: raw.contains("```"),
            has_type_tokens: is_schema_template(raw),
            has_template_vars: raw.contains("${"),
            head,
            tail,
        }
    }

    /// Fast, small completions usually mean the tool bailed out early.
    pub fn is_suspicious(&self, elapsed: Duration) -> bool {
        elapsed < SUSPICIOUS_ELAPSED && self.bytes < SUSPICIOUS_BYTES
    }
}

fn preview(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
