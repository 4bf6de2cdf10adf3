//! Removal of CLI transcript chrome around a worker's answer.

use serde::{Deserialize, Serialize};

/// Line markers that frame a tool's answer inside its transcript.
///
/// The answer starts on the line after the last `response_markers` hit and
/// ends before the first `footer_markers` hit that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperProfile {
    pub response_markers: Vec<String>,
    pub footer_markers: Vec<String>,
}

impl Default for WrapperProfile {
    fn default() -> Self {
        Self {
            response_markers: vec!["] codex".to_string()],
            footer_markers: vec!["] tokens used:".to_string(), "] thinking".to_string()],
        }
    }
}

impl WrapperProfile {
    /// A profile that never strips anything.
    pub fn none() -> Self {
        Self {
            response_markers: Vec::new(),
            footer_markers: Vec::new(),
        }
    }

    /// Return the answer body, or `None` when no response marker is present.
    pub fn strip<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let (idx, marker) = self
            .response_markers
            .iter()
            .filter_map(|m| raw.rfind(m.as_str()).map(|i| (i, m)))
            .max_by_key(|(i, _)| *i)?;

        let after = &raw[idx + marker.len()..];
        let mut body = match after.find('\n') {
            Some(nl) => &after[nl + 1..],
            None => "",
        };

        for footer in &self.footer_markers {
            if let Some(i) = body.find(footer.as_str()) {
                let line_start = body[..i].rfind('\n').map_or(0, |n| n + 1);
                body = &body[..line_start];
            }
        }

        let body = body.trim();
        if body.is_empty() { None } else { Some(body) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = "\
[2025-10-01T10:00:00] OpenAI Codex v0.44.0
User instructions:
Return {\"issues\": [...]}
[2025-10-01T10:00:05] thinking
considering
[2025-10-01T10:00:09] codex
{\"issues\": []}
[2025-10-01T10:00:10] tokens used: 1234
";

    #[test]
    fn test_strips_banner_and_footer() {
        let body = WrapperProfile::default().strip(TRANSCRIPT).unwrap();
        assert_eq!(body, "{\"issues\": []}");
    }

    #[test]
    fn test_no_marker_returns_none() {
        assert!(WrapperProfile::default().strip("{\"issues\": []}").is_none());
        assert!(WrapperProfile::none().strip(TRANSCRIPT).is_none());
    }
}
