//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("No roles requested for cohort")]
    NoRoles,

    #[error("Invalid prompt input: {0}")]
    InvalidPrompt(String),

    #[error("Invalid quorum rule: {0}")]
    InvalidRule(String),

    #[error("Invalid cohort: {0}")]
    InvalidCohort(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}
