//! Extraction strategies and their confidence ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a structured payload was located inside raw worker output.
///
/// Variants are listed in the order the extractor tries them. Confidence is
/// strictly decreasing along that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// The whole (unwrapped) output parsed as JSON.
    DirectParse,
    /// Last fenced code block whose contents parse.
    FencedBlock,
    /// Last balanced top-level `{...}` literal that parses.
    BracketScan,
    /// Object enclosing the last occurrence of the payload marker field.
    MarkerScan,
    /// Nothing parsed; the cleaned text is handed to the validator as-is.
    Unextracted,
}

impl ExtractionStrategy {
    pub const CASCADE: [ExtractionStrategy; 4] = [
        ExtractionStrategy::DirectParse,
        ExtractionStrategy::FencedBlock,
        ExtractionStrategy::BracketScan,
        ExtractionStrategy::MarkerScan,
    ];

    pub fn confidence(&self) -> f32 {
        match self {
            ExtractionStrategy::DirectParse => 0.95,
            ExtractionStrategy::FencedBlock => 0.90,
            ExtractionStrategy::BracketScan => 0.85,
            ExtractionStrategy::MarkerScan => 0.80,
            ExtractionStrategy::Unextracted => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStrategy::DirectParse => "direct_parse",
            ExtractionStrategy::FencedBlock => "fenced_block",
            ExtractionStrategy::BracketScan => "bracket_scan",
            ExtractionStrategy::MarkerScan => "marker_scan",
            ExtractionStrategy::Unextracted => "unextracted",
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_monotonic_along_cascade() {
        let confidences: Vec<f32> = ExtractionStrategy::CASCADE
            .iter()
            .map(|s| s.confidence())
            .collect();
        assert!(confidences.windows(2).all(|w| w[0] > w[1]));
        assert!(
            ExtractionStrategy::MarkerScan.confidence()
                > ExtractionStrategy::Unextracted.confidence()
        );
    }
}
