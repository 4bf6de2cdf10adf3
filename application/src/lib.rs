//! Application layer for cohort
//!
//! This crate contains the execution channel, the state store, the
//! supervision and consensus use cases, and the port definitions they run
//! against. It depends only on the domain layer.

pub mod channel;
pub mod config;
pub mod ports;
pub mod state_store;
pub mod use_cases;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use channel::{ChannelError, ChannelHandle, ChannelOutcome, ChannelPoll, ExecutionChannel};
pub use config::{
    ChannelParams, CohortParams, RetryPolicy, SupervisorParams, WorkerCatalog, WorkerProfile,
};
pub use ports::{
    execution_backend::{BackendError, ExecutionBackend, LaunchedInvocation, Observation},
    ledger::{LedgerError, LedgerStore, MemoryLedger},
    progress::{CohortProgressNotifier, CompositeProgress, NoProgress},
    resolution_applier::{RecordOnlyApplier, ResolutionApplier, ResolutionError},
    spawn_gate::{BoundedGate, OpenGate, SpawnGate, SpawnPermit},
};
pub use state_store::{StateStore, StateStoreError, TransitionOutcome, WorkerDraft};
pub use use_cases::coordinate_cohort::{
    CohortSettings, ConsensusCoordinator, CoordinatorError, IssueReport,
};
pub use use_cases::recover_orphans::{RecoverOrphansUseCase, RecoveryReport};
pub use use_cases::supervise_worker::{
    SupervisionError, WorkerAssignment, WorkerNotice, WorkerSupervisor,
};
