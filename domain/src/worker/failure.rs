//! Failure classification for worker attempts.

use crate::validation::RejectionKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a failure should be handled by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Worth retrying as-is (timeouts, stuck sinks, incomplete output).
    Transient,
    /// Retrying will not help (malformed output, missing command).
    Permanent,
    /// Environment needs cleanup before a retry (stale sinks, orphaned runs).
    Systemic,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::Permanent)
    }

    pub fn needs_reset(&self) -> bool {
        matches!(self, ErrorClass::Systemic)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
            ErrorClass::Systemic => write!(f, "systemic"),
        }
    }
}

/// What went wrong during an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Output was collected but the validator rejected it.
    Rejected(RejectionKind),
    Timeout,
    StuckAfterSignal,
    DuplicateSignal,
    ExitedWithoutSignal,
    SinkUnavailable,
    Io,
    CommandNotFound,
    InvalidInvocation,
    Disabled,
    StaleResource,
    OrphanedRun,
}

impl FailureKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            FailureKind::Rejected(kind) => kind.class(),
            FailureKind::Timeout
            | FailureKind::StuckAfterSignal
            | FailureKind::ExitedWithoutSignal
            | FailureKind::SinkUnavailable
            | FailureKind::Io => ErrorClass::Transient,
            FailureKind::DuplicateSignal
            | FailureKind::CommandNotFound
            | FailureKind::InvalidInvocation
            | FailureKind::Disabled => ErrorClass::Permanent,
            FailureKind::StaleResource | FailureKind::OrphanedRun => ErrorClass::Systemic,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Rejected(kind) => write!(f, "rejected ({kind})"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::StuckAfterSignal => write!(f, "stuck after completion signal"),
            FailureKind::DuplicateSignal => write!(f, "duplicate completion signal"),
            FailureKind::ExitedWithoutSignal => write!(f, "exited without completion signal"),
            FailureKind::SinkUnavailable => write!(f, "output sink unavailable"),
            FailureKind::Io => write!(f, "i/o error"),
            FailureKind::CommandNotFound => write!(f, "command not found"),
            FailureKind::InvalidInvocation => write!(f, "invalid invocation"),
            FailureKind::Disabled => write!(f, "worker disabled"),
            FailureKind::StaleResource => write!(f, "stale resource"),
            FailureKind::OrphanedRun => write!(f, "orphaned run"),
        }
    }
}

/// A classified failure as persisted on the worker record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub class: ErrorClass,
    pub message: String,
}

impl FailureRecord {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            class: kind.class(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.class, self.message)
    }
}
