//! Cohort quorum: minimum-quorum rules, decisions and reports.
//!
//! A cohort succeeds when every member completes, is degraded when at least
//! the minimum quorum completes, and otherwise fails with a cohort-level
//! condition distinct from any single worker failure.

pub mod report;
pub mod rule;
pub mod status;

pub use report::{CohortReport, WorkerOutcome};
pub use rule::QuorumRule;
pub use status::{CohortFailure, CohortStatus, QuorumTally};
