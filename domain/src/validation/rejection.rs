//! Validator rejection kinds.

use crate::worker::ErrorClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why the validator refused a payload, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The sink captured unrelated terminal content.
    Corruption,
    /// Only a tool banner was captured, no answer.
    HeadersOnly,
    /// Payload below the size floor; almost certainly incomplete.
    TooSmall,
    /// The worker echoed the requested shape instead of filling it.
    SchemaTemplate,
    /// Payload is not the expected structured document.
    Structural,
}

impl RejectionKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            RejectionKind::Corruption => ErrorClass::Systemic,
            RejectionKind::HeadersOnly | RejectionKind::TooSmall => ErrorClass::Transient,
            RejectionKind::SchemaTemplate | RejectionKind::Structural => ErrorClass::Permanent,
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionKind::Corruption => write!(f, "corrupted output"),
            RejectionKind::HeadersOnly => write!(f, "headers only"),
            RejectionKind::TooSmall => write!(f, "output too small"),
            RejectionKind::SchemaTemplate => write!(f, "schema template"),
            RejectionKind::Structural => write!(f, "malformed payload"),
        }
    }
}

/// A validator rejection with a human-readable detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct Rejection {
    pub kind: RejectionKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: RejectionKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}
