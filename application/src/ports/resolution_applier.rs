//! Resolution port
//!
//! Applies the agreed answer of an auto-resolved issue. What "apply" means
//! depends on the host: patching a plan, writing a decision file, or just
//! recording the answer.

use async_trait::async_trait;
use cohort_domain::{CohortId, Issue};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Resolution target unavailable: {0}")]
    Unavailable(String),

    #[error("Resolution rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ResolutionApplier: Send + Sync {
    /// Apply `answer` to `issue`. Returns a short description of the action taken.
    async fn apply(
        &self,
        cohort_id: &CohortId,
        issue: &Issue,
        answer: &str,
    ) -> Result<String, ResolutionError>;
}

/// Applier that only acknowledges the answer.
pub struct RecordOnlyApplier;

#[async_trait]
impl ResolutionApplier for RecordOnlyApplier {
    async fn apply(
        &self,
        _cohort_id: &CohortId,
        issue: &Issue,
        _answer: &str,
    ) -> Result<String, ResolutionError> {
        Ok(format!("recorded answer for {}", issue.id))
    }
}
