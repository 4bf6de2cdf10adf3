//! Output-sink stability gate.

use std::time::{Duration, Instant};

/// Result of one sink observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// The sink does not exist (yet).
    Missing,
    /// Size changed since the last observation.
    Growing { size: u64 },
    /// Size is unchanged but below the minimum.
    BelowFloor { size: u64 },
    /// Size is unchanged and above the minimum, but not for long enough.
    Settling { size: u64, remaining: Duration },
    /// Size has held for the full window and is above the minimum.
    Stable { size: u64 },
}

impl Stability {
    pub fn is_stable(&self) -> bool {
        matches!(self, Stability::Stable { .. })
    }
}

/// Decides when a sink has stopped growing.
///
/// Every size change restarts the window, so a pause shorter than the window
/// followed by more writes never reads as stable.
#[derive(Debug, Clone)]
pub struct StabilityGate {
    window: Duration,
    min_bytes: u64,
    last_size: Option<u64>,
    since: Option<Instant>,
}

impl StabilityGate {
    pub fn new(window: Duration, min_bytes: u64) -> Self {
        Self {
            window,
            min_bytes,
            last_size: None,
            since: None,
        }
    }

    pub fn observe(&mut self, size: Option<u64>, now: Instant) -> Stability {
        let Some(size) = size else {
            self.last_size = None;
            self.since = None;
            return Stability::Missing;
        };

        if self.last_size != Some(size) {
            self.last_size = Some(size);
            self.since = Some(now);
            return Stability::Growing { size };
        }

        if size < self.min_bytes {
            return Stability::BelowFloor { size };
        }

        let held = now.saturating_duration_since(self.since.unwrap_or(now));
        if held >= self.window {
            Stability::Stable { size }
        } else {
            Stability::Settling {
                size,
                remaining: self.window - held,
            }
        }
    }
}
