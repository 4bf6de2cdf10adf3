//! Issues: the unit of consensus output.
//!
//! Completed workers report issues in their payloads. The coordinator merges
//! them by id, classifies agreement, assigns a [`Disposition`] once and then
//! records a [`Resolution`].

pub mod entity;
pub mod merge;
pub mod parsing;

pub use entity::{
    Confidence, Disposition, Issue, IssueError, Magnitude, Resolution, Resolvability,
    SecondaryVerdict, WorkerAnswer,
};
pub use merge::{Agreement, classify_agreement, decide_disposition, merge_issues};
pub use parsing::{
    IssueParseError, ReportedIssue, VERDICTS_FIELD, parse_reported_issues, parse_verdicts,
    secondary_request,
};
