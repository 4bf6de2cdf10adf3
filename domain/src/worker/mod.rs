//! Worker lifecycle: states, events, failure classes and the worker record.

pub mod entity;
pub mod events;
pub mod failure;
pub mod state;

pub use entity::{TransitionError, Worker};
pub use events::LifecycleEvent;
pub use failure::{ErrorClass, FailureKind, FailureRecord};
pub use state::WorkerState;
