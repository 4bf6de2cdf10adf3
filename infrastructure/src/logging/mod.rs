//! Logging infrastructure: structured decision records.
//!
//! Provides [`JsonlDecisionLog`], a JSONL file writer that implements the
//! [`ResolutionApplier`](cohort_application::ResolutionApplier) port.

mod decision_log;

pub use decision_log::JsonlDecisionLog;
