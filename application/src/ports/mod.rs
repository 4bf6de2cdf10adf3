//! Port definitions (interfaces for external systems)
//!
//! Ports define the boundaries between the application layer and the outside
//! world. Implementations (adapters) live in the infrastructure layer.

pub mod execution_backend;
pub mod ledger;
pub mod progress;
pub mod resolution_applier;
pub mod spawn_gate;
