//! Structured payload extraction from noisy worker output.

use super::scan::{balanced_end, enclosing_openers, fenced_blocks, object_regions};
use super::strategy::ExtractionStrategy;
use super::wrapper::WrapperProfile;
use serde_json::Value;

/// How far back from the marker field the marker scan looks for an opener.
const MARKER_WINDOW_BYTES: usize = 10 * 1024;

/// Text the extractor believes holds the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub strategy: ExtractionStrategy,
    pub confidence: f32,
}

impl Candidate {
    fn new(text: impl Into<String>, strategy: ExtractionStrategy) -> Self {
        Self {
            text: text.into(),
            strategy,
            confidence: strategy.confidence(),
        }
    }
}

/// Extraction result. Always yields a candidate so validation can run.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub candidate: Candidate,
    pub warnings: Vec<String>,
    pub unwrapped: bool,
}

/// Ordered cascade of extraction strategies.
///
/// Each strategy is pure and returns `None` to hand over to the next one.
#[derive(Debug, Clone)]
pub struct OutputExtractor {
    marker_field: String,
    wrapper: WrapperProfile,
}

impl OutputExtractor {
    pub fn new(marker_field: impl Into<String>) -> Self {
        Self {
            marker_field: marker_field.into(),
            wrapper: WrapperProfile::default(),
        }
    }

    pub fn with_wrapper(mut self, wrapper: WrapperProfile) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn marker_field(&self) -> &str {
        &self.marker_field
    }

    pub fn extract(&self, raw: &str) -> Extraction {
        let mut warnings = Vec::new();
        let (text, unwrapped) = match self.wrapper.strip(raw) {
            Some(body) => (body, true),
            None => (raw.trim(), false),
        };

        for strategy in ExtractionStrategy::CASCADE {
            if let Some(found) = self.run(strategy, text, &mut warnings) {
                if strategy == ExtractionStrategy::MarkerScan {
                    warnings.push(format!(
                        "payload located by '{}' marker scan; surrounding output may be truncated",
                        self.marker_field
                    ));
                }
                return Extraction {
                    candidate: Candidate::new(found, strategy),
                    warnings,
                    unwrapped,
                };
            }
        }

        warnings.push("no structured payload found in output".to_string());
        Extraction {
            candidate: Candidate::new(text, ExtractionStrategy::Unextracted),
            warnings,
            unwrapped,
        }
    }

    fn run(
        &self,
        strategy: ExtractionStrategy,
        text: &str,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        match strategy {
            ExtractionStrategy::DirectParse => direct_parse(text),
            ExtractionStrategy::FencedBlock => fenced_block(text, warnings),
            ExtractionStrategy::BracketScan => bracket_scan(text),
            ExtractionStrategy::MarkerScan => marker_scan(text, &self.marker_field),
            ExtractionStrategy::Unextracted => None,
        }
    }
}

fn parses(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok()
}

fn direct_parse(text: &str) -> Option<String> {
    match parses(text)? {
        Value::Object(_) | Value::Array(_) => Some(text.to_string()),
        _ => None,
    }
}

fn fenced_block(text: &str, warnings: &mut Vec<String>) -> Option<String> {
    let blocks = fenced_blocks(text);
    if blocks.len() > 1 {
        warnings.push(format!(
            "{} fenced blocks in output; using the last parseable one",
            blocks.len()
        ));
    }

    blocks
        .iter()
        .rev()
        .map(|b| b.trim())
        .find(|b| parses(b).is_some())
        .map(str::to_string)
}

fn bracket_scan(text: &str) -> Option<String> {
    object_regions(text)
        .into_iter()
        .rev()
        .map(|(s, e)| &text[s..e])
        .find(|region| matches!(parses(region), Some(Value::Object(_))))
        .map(str::to_string)
}

fn marker_scan(text: &str, marker_field: &str) -> Option<String> {
    let needle = format!("\"{marker_field}\"");

    for (pos, _) in text.rmatch_indices(needle.as_str()) {
        for start in enclosing_openers(text, pos, MARKER_WINDOW_BYTES) {
            let Some(end) = balanced_end(text, start) else {
                continue;
            };
            let candidate = &text[start..end];
            if let Some(Value::Object(map)) = parses(candidate)
                && map.contains_key(marker_field)
            {
                return Some(candidate.to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> OutputExtractor {
        OutputExtractor::new("issues")
    }

    #[test]
    fn test_direct_parse_first() {
        let extraction = extractor().extract("  {\"issues\": []}  ");
        assert_eq!(extraction.candidate.strategy, ExtractionStrategy::DirectParse);
        assert_eq!(extraction.candidate.text, "{\"issues\": []}");
        assert_eq!(extraction.candidate.confidence, 0.95);
    }

    #[test]
    fn returns_last_fenced_block() {
        let raw = "Here is a draft:\n```json\n{\"issues\": [{\"id\": \"draft\"}]}\n```\n\
                   Revised answer:\n```json\n{\"issues\": [{\"id\": \"final\"}]}\n```\n";
        let extraction = extractor().extract(raw);

        assert_eq!(extraction.candidate.strategy, ExtractionStrategy::FencedBlock);
        assert_eq!(
            extraction.candidate.text,
            "{\"issues\": [{\"id\": \"final\"}]}"
        );
        assert!(!extraction.warnings.is_empty());
    }

    #[test]
    fn test_unparseable_last_fence_falls_back_to_earlier_block() {
        let raw = "```json\n{\"issues\": []}\n```\n```\nnot json\n```\n";
        let extraction = extractor().extract(raw);
        assert_eq!(extraction.candidate.strategy, ExtractionStrategy::FencedBlock);
        assert_eq!(extraction.candidate.text, "{\"issues\": []}");
    }

    #[test]
    fn test_bracket_scan_without_fences() {
        let raw = "Analysis complete. Result: {\"issues\": [{\"id\": \"a\"}]} Done.";
        let extraction = extractor().extract(raw);
        assert_eq!(extraction.candidate.strategy, ExtractionStrategy::BracketScan);
        assert_eq!(extraction.candidate.text, "{\"issues\": [{\"id\": \"a\"}]}");
    }

    #[test]
    fn test_bracket_scan_prefers_last_object() {
        let raw = "Example {\"x\": 1} then answer {\"issues\": []}";
        let extraction = extractor().extract(raw);
        assert_eq!(extraction.candidate.text, "{\"issues\": []}");
    }

    #[test]
    fn test_marker_scan_finds_object_inside_malformed_envelope() {
        // The outer literal balances but does not parse, so the bracket scan
        // never looks inside it.
        let raw = "Result: {\"summary\": unquoted text, \"result\": {\"issues\": [{\"id\": \"x\"}]}}";
        let extraction = extractor().extract(raw);
        assert_eq!(extraction.candidate.strategy, ExtractionStrategy::MarkerScan);
        assert_eq!(extraction.candidate.text, "{\"issues\": [{\"id\": \"x\"}]}");
    }

    #[test]
    fn test_no_payload_is_unextracted() {
        let extraction = extractor().extract("I could not complete the task.");
        assert_eq!(extraction.candidate.strategy, ExtractionStrategy::Unextracted);
        assert_eq!(extraction.candidate.confidence, 0.0);
        assert_eq!(extraction.candidate.text, "I could not complete the task.");
    }

    #[test]
    fn test_wrapper_is_stripped_before_cascade() {
        let raw = "[t] OpenAI Codex v0.44\nUser instructions:\nreturn {\"issues\": [...]}\n\
                   [t] codex\n{\"issues\": []}\n[t] tokens used: 99\n";
        let extraction = extractor().extract(raw);
        assert!(extraction.unwrapped);
        assert_eq!(extraction.candidate.strategy, ExtractionStrategy::DirectParse);
    }
}
