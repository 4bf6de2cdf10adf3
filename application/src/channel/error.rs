//! Execution channel errors.

use crate::ports::execution_backend::BackendError;
use cohort_domain::{ErrorClass, FailureKind};
use std::time::Duration;
use thiserror::Error;

/// Why an invocation did not produce a collectable output.
///
/// Variants raised after launch carry whatever the sink held at the time, so
/// partial output is never thrown away.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("{source}")]
    Backend {
        source: BackendError,
        partial: Option<Vec<u8>>,
    },

    #[error("invocation timed out after {after:?}")]
    Timeout {
        after: Duration,
        partial: Option<Vec<u8>>,
    },

    #[error("completion signal seen but sink never stabilized within {waited:?}")]
    StuckAfterSignal {
        waited: Duration,
        partial: Option<Vec<u8>>,
    },

    #[error("{count} completion signals observed, expected exactly one")]
    DuplicateSignal {
        count: usize,
        partial: Option<Vec<u8>>,
    },

    #[error("process exited without a completion signal (exit code {exit_code:?})")]
    ExitedWithoutSignal {
        exit_code: Option<i32>,
        partial: Option<Vec<u8>>,
    },

    #[error("channel already closed")]
    Closed,
}

impl ChannelError {
    pub fn backend(source: BackendError) -> Self {
        ChannelError::Backend {
            source,
            partial: None,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ChannelError::Backend { source, .. } => match source {
                BackendError::CommandNotFound(_) => FailureKind::CommandNotFound,
                BackendError::InvalidInvocation(_) => FailureKind::InvalidInvocation,
                BackendError::SinkUnavailable(_) => FailureKind::SinkUnavailable,
                BackendError::StaleResource(_) => FailureKind::StaleResource,
                BackendError::Io(_) => FailureKind::Io,
            },
            ChannelError::Timeout { .. } => FailureKind::Timeout,
            ChannelError::StuckAfterSignal { .. } => FailureKind::StuckAfterSignal,
            ChannelError::DuplicateSignal { .. } => FailureKind::DuplicateSignal,
            ChannelError::ExitedWithoutSignal { .. } => FailureKind::ExitedWithoutSignal,
            ChannelError::Closed => FailureKind::InvalidInvocation,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.failure_kind().class()
    }

    pub fn partial_bytes(&self) -> Option<&[u8]> {
        match self {
            ChannelError::Backend { partial, .. }
            | ChannelError::Timeout { partial, .. }
            | ChannelError::StuckAfterSignal { partial, .. }
            | ChannelError::DuplicateSignal { partial, .. }
            | ChannelError::ExitedWithoutSignal { partial, .. } => partial.as_deref(),
            ChannelError::Closed => None,
        }
    }

    /// Partial sink contents as text, if any were captured.
    pub fn partial_output(&self) -> Option<String> {
        self.partial_bytes()
            .filter(|b| !b.is_empty())
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub(crate) fn with_partial(mut self, bytes: Option<Vec<u8>>) -> Self {
        match &mut self {
            ChannelError::Backend { partial, .. }
            | ChannelError::Timeout { partial, .. }
            | ChannelError::StuckAfterSignal { partial, .. }
            | ChannelError::DuplicateSignal { partial, .. }
            | ChannelError::ExitedWithoutSignal { partial, .. } => *partial = bytes,
            ChannelError::Closed => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        let timeout = ChannelError::Timeout {
            after: Duration::from_secs(1),
            partial: None,
        };
        assert_eq!(timeout.class(), ErrorClass::Transient);

        let dup = ChannelError::DuplicateSignal {
            count: 2,
            partial: None,
        };
        assert_eq!(dup.class(), ErrorClass::Permanent);

        let stale = ChannelError::backend(BackendError::StaleResource("sink".into()));
        assert_eq!(stale.class(), ErrorClass::Systemic);
    }

    #[test]
    fn test_partial_output() {
        let err = ChannelError::StuckAfterSignal {
            waited: Duration::from_secs(60),
            partial: Some(b"{\"issues\": [".to_vec()),
        };
        assert_eq!(err.partial_output().as_deref(), Some("{\"issues\": ["));

        let empty = ChannelError::Timeout {
            after: Duration::from_secs(1),
            partial: Some(Vec::new()),
        };
        assert!(empty.partial_output().is_none());
    }
}
