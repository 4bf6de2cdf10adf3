//! Minimum-quorum rules for a cohort.

use serde::{Deserialize, Serialize};

/// Rule for the minimum number of completed workers a cohort needs.
///
/// - `Auto`: two when the cohort has three or more members, otherwise all
/// - `Majority`: more than half
/// - `Unanimous`: every member
/// - `AtLeast(n)`: at least n members
/// - `Percentage(p)`: at least p% of members
///
/// Every rule is clamped to `1..=size`.
///
/// # Example
///
/// ```
/// use cohort_domain::quorum::QuorumRule;
///
/// assert_eq!(QuorumRule::Auto.required(3), 2);
/// assert_eq!(QuorumRule::Auto.required(2), 2);
/// assert!(QuorumRule::Auto.is_satisfied(2, 3));
/// assert!(!QuorumRule::Unanimous.is_satisfied(2, 3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuorumRule {
    #[default]
    Auto,
    Majority,
    Unanimous,
    AtLeast(usize),
    Percentage(u8),
}

impl QuorumRule {
    /// Minimum completed workers for a cohort of `size`.
    pub fn required(&self, size: usize) -> usize {
        if size == 0 {
            return 0;
        }

        let raw = match self {
            QuorumRule::Auto => {
                if size >= 3 {
                    2
                } else {
                    size
                }
            }
            QuorumRule::Majority => size / 2 + 1,
            QuorumRule::Unanimous => size,
            QuorumRule::AtLeast(n) => *n,
            QuorumRule::Percentage(p) => (size as f64 * (*p as f64 / 100.0)).ceil() as usize,
        };
        raw.clamp(1, size)
    }

    pub fn is_satisfied(&self, completed: usize, size: usize) -> bool {
        size > 0 && completed >= self.required(size)
    }

    pub fn description(&self) -> String {
        match self {
            QuorumRule::Auto => "auto (2 of 3+, otherwise all)".to_string(),
            QuorumRule::Majority => "majority (more than half)".to_string(),
            QuorumRule::Unanimous => "unanimous (all must complete)".to_string(),
            QuorumRule::AtLeast(n) => format!("at least {} completed", n),
            QuorumRule::Percentage(p) => format!("at least {}% completed", p),
        }
    }
}

impl std::fmt::Display for QuorumRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::str::FromStr for QuorumRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(QuorumRule::Auto),
            "majority" => Ok(QuorumRule::Majority),
            "unanimous" | "all" => Ok(QuorumRule::Unanimous),
            s if s.starts_with("atleast:") || s.starts_with("at_least:") => {
                let n: usize = s
                    .split(':')
                    .nth(1)
                    .ok_or("Missing number after atleast:")?
                    .parse()
                    .map_err(|_| "Invalid number for atleast")?;
                Ok(QuorumRule::AtLeast(n))
            }
            s if s.starts_with("percentage:") || s.ends_with('%') => {
                let num_str = s.trim_start_matches("percentage:").trim_end_matches('%');
                let p: u8 = num_str.parse().map_err(|_| "Invalid percentage")?;
                if p > 100 {
                    return Err(format!("Percentage out of range: {}", p));
                }
                Ok(QuorumRule::Percentage(p))
            }
            _ => Err(format!(
                "Unknown quorum rule: {}. Valid: auto, majority, unanimous, atleast:N, percentage:N or N%",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_rule() {
        assert_eq!(QuorumRule::Auto.required(3), 2);
        assert_eq!(QuorumRule::Auto.required(5), 2);
        assert_eq!(QuorumRule::Auto.required(2), 2);
        assert_eq!(QuorumRule::Auto.required(1), 1);
    }

    #[test]
    fn test_majority_rule() {
        assert_eq!(QuorumRule::Majority.required(3), 2);
        assert_eq!(QuorumRule::Majority.required(4), 3);
    }

    #[test]
    fn test_rules_clamp_to_size() {
        assert_eq!(QuorumRule::AtLeast(5).required(3), 3);
        assert_eq!(QuorumRule::AtLeast(0).required(3), 1);
        assert_eq!(QuorumRule::Percentage(75).required(5), 4);
        assert_eq!(QuorumRule::Percentage(0).required(5), 1);
    }

    #[test]
    fn test_zero_size() {
        assert_eq!(QuorumRule::Auto.required(0), 0);
        assert!(!QuorumRule::Auto.is_satisfied(0, 0));
        assert!(!QuorumRule::AtLeast(1).is_satisfied(0, 0));
    }

    #[test]
    fn test_parse_rule() {
        assert_eq!("auto".parse::<QuorumRule>().ok(), Some(QuorumRule::Auto));
        assert_eq!("majority".parse::<QuorumRule>().ok(), Some(QuorumRule::Majority));
        assert_eq!("all".parse::<QuorumRule>().ok(), Some(QuorumRule::Unanimous));
        assert_eq!("atleast:2".parse::<QuorumRule>().ok(), Some(QuorumRule::AtLeast(2)));
        assert_eq!("80%".parse::<QuorumRule>().ok(), Some(QuorumRule::Percentage(80)));
        assert!("150%".parse::<QuorumRule>().is_err());
        assert!("most".parse::<QuorumRule>().is_err());
    }

    #[test]
    fn test_default() {
        assert_eq!(QuorumRule::default(), QuorumRule::Auto);
    }
}
