//! Application configuration types
//!
//! - [`ChannelParams`]: completion detection and invocation limits
//! - [`RetryPolicy`]: backoff and attempt budget
//! - [`CohortParams`] / [`SupervisorParams`]: cohort decision and record timeouts
//! - [`WorkerCatalog`]: launch recipes per worker role

mod channel_params;
mod cohort_params;
mod retry_policy;
mod worker_profile;

pub use channel_params::ChannelParams;
pub use cohort_params::{CohortParams, SupervisorParams};
pub use retry_policy::RetryPolicy;
pub use worker_profile::{WorkerCatalog, WorkerProfile};
