//! Domain layer for cohort
//!
//! This crate contains the core rules of multi-agent supervision. It has no
//! dependencies on async runtimes, processes or storage.
//!
//! # Core Concepts
//!
//! ## Worker lifecycle
//!
//! Every supervised worker moves through a fixed state machine
//! ([`WorkerState`]). Each change is a [`LifecycleEvent`] wrapped in a
//! [`LedgerEntry`]; the worker record is a projection of those entries.
//!
//! ## Output handling
//!
//! - [`OutputExtractor`]: finds the structured payload in noisy CLI output
//! - [`ResultValidator`]: ordered acceptance checks with classified rejections
//! - [`InvocationPlan`] / [`StabilityGate`]: single-signal completion detection
//!
//! ## Consensus
//!
//! - [`QuorumRule`] / [`QuorumTally`]: minimum quorum and cohort decision
//! - [`Issue`]: merged findings with an immutable [`Disposition`]

pub mod config;
pub mod core;
pub mod execution;
pub mod extraction;
pub mod issue;
pub mod ledger;
pub mod quorum;
pub mod validation;
pub mod worker;

pub use config::{ConfigIssue, ConfigIssueCode, OutputFormat, Severity};
pub use core::{
    error::DomainError,
    ids::{CheckpointId, CohortId, WorkerId},
};
pub use execution::{
    CompletionSignal, InvocationPlan, InvocationSpec, PlanError, Stability, StabilityGate,
    completion_marker, invocation_stem, scan_signals,
};
pub use extraction::{Candidate, Extraction, ExtractionStrategy, OutputExtractor, WrapperProfile};
pub use issue::{
    Confidence, Disposition, Issue, IssueError, Magnitude, ReportedIssue, Resolution,
    Resolvability, SecondaryVerdict, VERDICTS_FIELD, WorkerAnswer, decide_disposition,
    merge_issues, parse_reported_issues, parse_verdicts, secondary_request,
};
pub use ledger::{LedgerEntry, Replay, replay};
pub use quorum::{CohortFailure, CohortReport, CohortStatus, QuorumRule, QuorumTally, WorkerOutcome};
pub use validation::{
    OutputProfile, Rejection, RejectionKind, ResultValidator, ValidatedPayload, ValidationRules,
};
pub use worker::{
    ErrorClass, FailureKind, FailureRecord, LifecycleEvent, TransitionError, Worker, WorkerState,
};
