//! Issue entity and its classification types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How much an issue matters if answered wrongly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    Minor,
    Important,
    Critical,
}

impl Magnitude {
    /// Lenient parse of the labels workers tend to emit.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "minor" | "low" | "trivial" | "nit" => Some(Magnitude::Minor),
            "important" | "medium" | "major" | "moderate" => Some(Magnitude::Important),
            "critical" | "high" | "blocker" | "severe" => Some(Magnitude::Critical),
            _ => None,
        }
    }
}

/// Who can resolve an issue. Ordered from least to most conservative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolvability {
    AutoFix,
    SuggestFix,
    NeedHuman,
}

impl Resolvability {
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "autofix" | "auto" => Some(Resolvability::AutoFix),
            "suggestfix" | "suggest" => Some(Resolvability::SuggestFix),
            "needhuman" | "human" | "manual" => Some(Resolvability::NeedHuman),
            _ => None,
        }
    }
}

/// Agreement level across the cohort's answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// What the coordinator does with an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoResolvable,
    NeedsSecondaryValidation,
    Escalate,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::AutoResolvable => write!(f, "auto-resolvable"),
            Disposition::NeedsSecondaryValidation => write!(f, "needs-secondary-validation"),
            Disposition::Escalate => write!(f, "escalate"),
        }
    }
}

/// The higher-authority worker's verdict on one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryVerdict {
    pub issue_id: String,
    pub agrees_with_majority: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_answer: Option<String>,
}

/// Outcome of the resolution step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    AutoApplied {
        answer: String,
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verdict: Option<SecondaryVerdict>,
    },
    Escalated {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verdict: Option<SecondaryVerdict>,
    },
}

impl Resolution {
    pub fn is_auto_applied(&self) -> bool {
        matches!(self, Resolution::AutoApplied { .. })
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, Resolution::Escalated { .. })
    }
}

/// One worker's answer to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAnswer {
    pub role: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssueError {
    #[error("issue {0} already has a disposition")]
    AlreadyDisposed(String),

    #[error("issue {0} is already resolved")]
    AlreadyResolved(String),

    #[error("issue {0} has no disposition yet")]
    NotDisposed(String),
}

/// A finding merged across the cohort.
///
/// The disposition is set once; the resolution is set once by the
/// resolution step. Issues are never removed from a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
    pub magnitude: Magnitude,
    pub resolvability: Resolvability,
    pub confidence: Confidence,
    pub answers: Vec<WorkerAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub majority_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    disposition: Option<Disposition>,
    resolution: Option<Resolution>,
}

impl Issue {
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        magnitude: Magnitude,
        resolvability: Resolvability,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            context: String::new(),
            magnitude,
            resolvability,
            confidence: Confidence::Low,
            answers: Vec::new(),
            majority_answer: None,
            suggested_fix: None,
            disposition: None,
            resolution: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Attach the cohort's answers and the agreement computed over them.
    pub fn with_answers(
        mut self,
        answers: Vec<WorkerAnswer>,
        confidence: Confidence,
        majority_answer: Option<String>,
    ) -> Self {
        self.answers = answers;
        self.confidence = confidence;
        self.majority_answer = majority_answer;
        self
    }

    pub fn with_suggested_fix(mut self, fix: Option<String>) -> Self {
        self.suggested_fix = fix;
        self
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn assign_disposition(&mut self, disposition: Disposition) -> Result<(), IssueError> {
        if self.disposition.is_some() {
            return Err(IssueError::AlreadyDisposed(self.id.clone()));
        }
        self.disposition = Some(disposition);
        Ok(())
    }

    pub fn resolve(&mut self, resolution: Resolution) -> Result<(), IssueError> {
        if self.disposition.is_none() {
            return Err(IssueError::NotDisposed(self.id.clone()));
        }
        if self.resolution.is_some() {
            return Err(IssueError::AlreadyResolved(self.id.clone()));
        }
        self.resolution = Some(resolution);
        Ok(())
    }

    /// Answers that differ from the majority, formatted `role: answer`.
    pub fn dissent(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter(|a| self.majority_answer.as_deref() != Some(a.answer.as_str()))
            .map(|a| format!("{}: {}", a.role, a.answer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Issue {
        Issue::new("ISSUE-1", "Timeout?", Magnitude::Minor, Resolvability::AutoFix).with_answers(
            vec![],
            Confidence::High,
            Some("30s".to_string()),
        )
    }

    #[test]
    fn test_magnitude_parse() {
        assert_eq!(Magnitude::parse("Critical"), Some(Magnitude::Critical));
        assert_eq!(Magnitude::parse("major"), Some(Magnitude::Important));
        assert_eq!(Magnitude::parse("?"), None);
        assert!(Magnitude::Critical > Magnitude::Minor);
    }

    #[test]
    fn test_resolvability_parse() {
        assert_eq!(Resolvability::parse("auto-fix"), Some(Resolvability::AutoFix));
        assert_eq!(Resolvability::parse("suggest_fix"), Some(Resolvability::SuggestFix));
        assert_eq!(Resolvability::parse("need-human"), Some(Resolvability::NeedHuman));
        assert!(Resolvability::NeedHuman > Resolvability::AutoFix);
    }

    #[test]
    fn test_disposition_is_set_once() {
        let mut issue = issue();
        issue.assign_disposition(Disposition::AutoResolvable).unwrap();
        assert_eq!(
            issue.assign_disposition(Disposition::Escalate),
            Err(IssueError::AlreadyDisposed("ISSUE-1".to_string()))
        );
        assert_eq!(issue.disposition(), Some(Disposition::AutoResolvable));
    }

    #[test]
    fn test_resolution_requires_disposition_and_is_set_once() {
        let mut issue = issue();
        let escalate = Resolution::Escalated {
            reason: "x".to_string(),
            verdict: None,
        };
        assert!(issue.resolve(escalate.clone()).is_err());
        issue.assign_disposition(Disposition::Escalate).unwrap();
        issue.resolve(escalate.clone()).unwrap();
        assert!(issue.resolve(escalate).is_err());
    }

    #[test]
    fn test_resolvability_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Resolvability::NeedHuman).unwrap(),
            "\"need-human\""
        );
    }
}
