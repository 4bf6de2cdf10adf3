//! Merging per-worker issues and deciding dispositions.

use super::entity::{Confidence, Disposition, Issue, Magnitude, Resolvability, WorkerAnswer};
use super::parsing::ReportedIssue;
use std::collections::HashMap;

/// Agreement computed over one issue's answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    pub confidence: Confidence,
    pub majority: Option<String>,
}

fn normalize(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

/// Classify agreement.
///
/// Every cohort member giving the same answer is `High`; a strict majority of
/// at least two answers is `Medium`; anything else is `Low`. Blank answers do
/// not vote.
pub fn classify_agreement(answers: &[WorkerAnswer], cohort_size: usize) -> Agreement {
    let mut groups: Vec<(String, &str, usize)> = Vec::new();
    let mut voters = 0usize;

    for answer in answers.iter().filter(|a| !a.answer.trim().is_empty()) {
        voters += 1;
        let key = normalize(&answer.answer);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some(group) => group.2 += 1,
            None => groups.push((key, answer.answer.as_str(), 1)),
        }
    }

    let top = groups.iter().fold(None::<&(String, &str, usize)>, |best, g| match best {
        Some(b) if b.2 >= g.2 => Some(b),
        _ => Some(g),
    });

    let Some((_, text, count)) = top else {
        return Agreement {
            confidence: Confidence::Low,
            majority: None,
        };
    };

    let confidence = if *count == cohort_size && *count == voters {
        Confidence::High
    } else if *count >= 2 && count * 2 > voters {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Agreement {
        majority: (confidence != Confidence::Low).then(|| text.to_string()),
        confidence,
    }
}

/// Disposition policy.
///
/// | confidence | magnitude | resolvability | disposition |
/// |---|---|---|---|
/// | High | Minor | AutoFix, SuggestFix | auto-resolvable |
/// | High | Important | AutoFix | auto-resolvable |
/// | Medium | Minor | AutoFix | auto-resolvable |
/// | Medium | any other | any other | needs secondary validation |
/// | otherwise | | | escalate |
pub fn decide_disposition(
    confidence: Confidence,
    magnitude: Magnitude,
    resolvability: Resolvability,
) -> Disposition {
    use Confidence::*;
    use Magnitude::*;
    use Resolvability::*;

    match (confidence, magnitude, resolvability) {
        (High, Minor, AutoFix | SuggestFix)
        | (High, Important, AutoFix)
        | (Medium, Minor, AutoFix) => Disposition::AutoResolvable,
        (Medium, _, _) => Disposition::NeedsSecondaryValidation,
        _ => Disposition::Escalate,
    }
}

/// Merge issues reported by each completed worker, keyed by issue id.
///
/// Magnitude takes the most severe report and resolvability the most
/// conservative one. Each role contributes at most one answer per issue.
/// Issues keep first-seen order.
pub fn merge_issues(reports: &[(String, Vec<ReportedIssue>)], cohort_size: usize) -> Vec<Issue> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, (ReportedIssue, Vec<WorkerAnswer>)> = HashMap::new();

    for (role, issues) in reports {
        for reported in issues {
            let answer = WorkerAnswer {
                role: role.clone(),
                answer: reported.answer.clone(),
                reasoning: reported.reasoning.clone(),
            };

            match merged.get_mut(&reported.id) {
                Some((base, answers)) => {
                    if answers.iter().any(|a| a.role == *role) {
                        continue;
                    }
                    base.magnitude = base.magnitude.max(reported.magnitude);
                    base.resolvability = base.resolvability.max(reported.resolvability);
                    if base.question.is_empty() {
                        base.question = reported.question.clone();
                    }
                    if base.context.is_none() {
                        base.context = reported.context.clone();
                    }
                    if base.suggested_fix.is_none() {
                        base.suggested_fix = reported.suggested_fix.clone();
                    }
                    answers.push(answer);
                }
                None => {
                    order.push(reported.id.clone());
                    merged.insert(reported.id.clone(), (reported.clone(), vec![answer]));
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .map(|(base, answers)| {
            let agreement = classify_agreement(&answers, cohort_size);
            Issue::new(base.id, base.question, base.magnitude, base.resolvability)
                .with_context(base.context.unwrap_or_default())
                .with_answers(answers, agreement.confidence, agreement.majority)
                .with_suggested_fix(base.suggested_fix)
        })
        .collect()
}
