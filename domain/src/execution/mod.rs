//! Invocation planning and completion detection primitives.

pub mod plan;
pub mod signal;
pub mod stability;

pub use plan::{InvocationPlan, InvocationSpec, PlanError, completion_marker, invocation_stem};
pub use signal::{CompletionSignal, scan_signals};
pub use stability::{Stability, StabilityGate};
