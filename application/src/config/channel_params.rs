//! Execution channel parameters: completion detection tuning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for [`ExecutionChannel`](crate::channel::ExecutionChannel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelParams {
    /// Hard limit for one invocation, signal or not.
    pub invocation_timeout: Duration,
    /// How long the sink size must hold before output is collected.
    pub quiescence_window: Duration,
    /// Sinks smaller than this never count as stable.
    pub min_sink_bytes: u64,
    /// Inline size above which the backend uses a wrapper script.
    pub large_input_threshold: usize,
    pub poll_interval: Duration,
    /// How long to wait for a stable sink after the completion signal.
    pub post_signal_timeout: Duration,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            invocation_timeout: Duration::from_secs(600),
            quiescence_window: Duration::from_secs(2),
            min_sink_bytes: 1000,
            large_input_threshold: 1000,
            poll_interval: Duration::from_millis(500),
            post_signal_timeout: Duration::from_secs(60),
        }
    }
}

impl ChannelParams {
    // ==================== Builder Methods ====================

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn with_quiescence_window(mut self, window: Duration) -> Self {
        self.quiescence_window = window;
        self
    }

    pub fn with_min_sink_bytes(mut self, bytes: u64) -> Self {
        self.min_sink_bytes = bytes;
        self
    }

    pub fn with_large_input_threshold(mut self, bytes: usize) -> Self {
        self.large_input_threshold = bytes;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_post_signal_timeout(mut self, timeout: Duration) -> Self {
        self.post_signal_timeout = timeout;
        self
    }
}
