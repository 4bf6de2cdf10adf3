//! Cohort and supervisor parameters.

use cohort_domain::QuorumRule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for [`ConsensusCoordinator`](crate::use_cases::coordinate_cohort::ConsensusCoordinator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortParams {
    pub quorum: QuorumRule,
    /// The decision is forced when this elapses.
    pub overall_timeout: Duration,
    /// How long cancelled workers get to stop after the overall timeout.
    pub cancel_grace: Duration,
    /// Capacity of the worker-to-coordinator notice channel.
    pub notification_capacity: usize,
    /// Worker role used for secondary validation, if any.
    pub secondary_role: Option<String>,
}

impl Default for CohortParams {
    fn default() -> Self {
        Self {
            quorum: QuorumRule::Auto,
            overall_timeout: Duration::from_secs(900),
            cancel_grace: Duration::from_secs(10),
            notification_capacity: 64,
            secondary_role: None,
        }
    }
}

impl CohortParams {
    pub fn with_quorum(mut self, rule: QuorumRule) -> Self {
        self.quorum = rule;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn with_secondary_role(mut self, role: impl Into<String>) -> Self {
        self.secondary_role = Some(role.into());
        self
    }
}

/// Parameters for [`WorkerSupervisor`](crate::use_cases::supervise_worker::WorkerSupervisor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorParams {
    /// A state write that takes longer than this marks the worker stuck.
    pub record_timeout: Duration,
}

impl Default for SupervisorParams {
    fn default() -> Self {
        Self {
            record_timeout: Duration::from_secs(30),
        }
    }
}
