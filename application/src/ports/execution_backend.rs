//! Execution backend port
//!
//! Defines how the application layer launches a worker command and observes
//! its output sink and signal stream. Implementations live in the
//! infrastructure layer.

use async_trait::async_trait;
use cohort_domain::InvocationSpec;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during backend operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error("Output sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Stale resource: {0}")]
    StaleResource(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// A launched invocation. Owned by the channel until cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInvocation {
    pub invocation_id: String,
    /// Completion marker the backend's signal stream will carry.
    pub marker: String,
    pub sink_path: PathBuf,
    /// Whether the command went through a wrapper script.
    pub wrapped: bool,
}

/// One look at a running invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Current size of the output sink, `None` while it does not exist.
    pub sink_size: Option<u64>,
    /// Everything read from the signal stream so far.
    pub signal_stream: String,
    /// `Some(code)` once the launcher process has exited.
    pub exited: Option<Option<i32>>,
}

/// Backend that runs worker commands
///
/// The backend captures the command's output into a sink file and reports the
/// completion marker on a separate signal stream. It never interprets output.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Launch one invocation.
    async fn launch(
        &self,
        invocation_id: &str,
        spec: &InvocationSpec,
    ) -> Result<LaunchedInvocation, BackendError>;

    /// Report sink size, signal stream and exit status.
    async fn observe(&self, invocation: &LaunchedInvocation) -> Result<Observation, BackendError>;

    /// Read the full contents of the output sink.
    async fn read_sink(&self, invocation: &LaunchedInvocation) -> Result<Vec<u8>, BackendError>;

    /// Stop the invocation if it is still running.
    async fn terminate(&self, invocation: &LaunchedInvocation);

    /// Remove the sink and any temporary files. Safe to call more than once.
    async fn cleanup(&self, invocation: &LaunchedInvocation);

    /// Clear backend state left behind by `invocation_id` before a retry.
    async fn reset(&self, _invocation_id: &str) -> Result<(), BackendError> {
        Ok(())
    }
}
