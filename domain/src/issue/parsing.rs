//! Reading issues and verdicts out of validated payloads.

use super::entity::{Issue, Magnitude, Resolvability, SecondaryVerdict};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Field carrying the secondary validator's verdicts.
pub const VERDICTS_FIELD: &str = "validations";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssueParseError {
    #[error("payload has no '{0}' field")]
    MissingField(String),

    #[error("'{0}' is not an array")]
    NotAnArray(String),
}

/// One issue as a single worker reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedIssue {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub magnitude: Magnitude,
    pub resolvability: Resolvability,
    pub reasoning: Option<String>,
    pub context: Option<String>,
    pub suggested_fix: Option<String>,
}

/// Parse the issue list under `field`.
///
/// Entries that are not objects are skipped. Missing ids are numbered by
/// position; unknown magnitude and resolvability labels fall back to
/// `Important` and `SuggestFix`.
pub fn parse_reported_issues(
    payload: &Value,
    field: &str,
) -> Result<Vec<ReportedIssue>, IssueParseError> {
    let items = payload
        .get(field)
        .ok_or_else(|| IssueParseError::MissingField(field.to_string()))?
        .as_array()
        .ok_or_else(|| IssueParseError::NotAnArray(field.to_string()))?;

    Ok(items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| item.as_object().map(|obj| reported_issue(idx, obj)))
        .collect())
}

fn reported_issue(idx: usize, obj: &Map<String, Value>) -> ReportedIssue {
    ReportedIssue {
        id: text_field(obj, &["id", "issue_id"]).unwrap_or_else(|| format!("ISSUE-{}", idx + 1)),
        question: text_field(obj, &["question", "title", "description"]).unwrap_or_default(),
        answer: text_field(obj, &["answer", "recommendation", "resolution"]).unwrap_or_default(),
        magnitude: text_field(obj, &["magnitude", "severity"])
            .and_then(|m| Magnitude::parse(&m))
            .unwrap_or(Magnitude::Important),
        resolvability: text_field(obj, &["resolvability"])
            .and_then(|r| Resolvability::parse(&r))
            .unwrap_or(Resolvability::SuggestFix),
        reasoning: text_field(obj, &["reasoning", "rationale"]),
        context: text_field(obj, &["context"]),
        suggested_fix: text_field(obj, &["suggested_fix", "fix"]),
    }
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Parse the verdict list from a secondary validator payload. Malformed
/// entries are dropped, which leaves their issues without a verdict.
pub fn parse_verdicts(payload: &Value) -> Vec<SecondaryVerdict> {
    payload
        .get(VERDICTS_FIELD)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let mut item = item.clone();
                    if let Some(Value::Number(n)) = item.get("issue_id") {
                        let id = n.to_string();
                        item["issue_id"] = Value::String(id);
                    }
                    serde_json::from_value(item).ok()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Request document handed to the secondary validator.
pub fn secondary_request(issues: &[&Issue]) -> Value {
    let issues: Vec<Value> = issues
        .iter()
        .map(|issue| {
            json!({
                "issue_id": issue.id,
                "question": issue.question,
                "context": issue.context,
                "magnitude": issue.magnitude,
                "majority_answer": issue.majority_answer,
                "answers": issue.answers,
            })
        })
        .collect();

    json!({
        "task": "validate_majority",
        "instructions": "For each issue decide whether the majority answer is correct. \
                         Respond with a JSON object of the form \
                         {\"validations\": [{\"issue_id\", \"agrees_with_majority\", \
                         \"reasoning\", \"recommended_answer\"}]}.",
        "issues": issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::entity::Confidence;

    #[test]
    fn test_parses_issue_fields() {
        let payload = json!({
            "issues": [
                {"id": "A", "question": "q", "answer": "a", "severity": "critical",
                 "resolvability": "need-human", "reasoning": "r"},
                "not an object",
                {"question": "second"}
            ]
        });
        let issues = parse_reported_issues(&payload, "issues").unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].magnitude, Magnitude::Critical);
        assert_eq!(issues[0].resolvability, Resolvability::NeedHuman);
        assert_eq!(issues[0].reasoning.as_deref(), Some("r"));
        assert_eq!(issues[1].id, "ISSUE-3");
        assert_eq!(issues[1].magnitude, Magnitude::Important);
        assert_eq!(issues[1].resolvability, Resolvability::SuggestFix);
    }

    #[test]
    fn test_missing_field_is_error() {
        assert_eq!(
            parse_reported_issues(&json!({}), "issues"),
            Err(IssueParseError::MissingField("issues".to_string()))
        );
        assert_eq!(
            parse_reported_issues(&json!({"issues": {}}), "issues"),
            Err(IssueParseError::NotAnArray("issues".to_string()))
        );
    }

    #[test]
    fn test_parses_verdicts_and_skips_malformed() {
        let payload = json!({
            "validations": [
                {"issue_id": "A", "agrees_with_majority": true, "reasoning": "fine"},
                {"issue_id": 7, "agrees_with_majority": false, "recommended_answer": "no"},
                {"issue_id": "C"}
            ]
        });
        let verdicts = parse_verdicts(&payload);
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts[0].agrees_with_majority);
        assert_eq!(verdicts[1].issue_id, "7");
        assert_eq!(verdicts[1].recommended_answer.as_deref(), Some("no"));
    }

    #[test]
    fn test_secondary_request_lists_issues() {
        let issue = Issue::new("A", "q", Magnitude::Minor, Resolvability::SuggestFix).with_answers(
            vec![],
            Confidence::Medium,
            Some("yes".to_string()),
        );
        let request = secondary_request(&[&issue]);
        assert_eq!(request["issues"][0]["issue_id"], "A");
        assert_eq!(request["issues"][0]["majority_answer"], "yes");
    }
}
