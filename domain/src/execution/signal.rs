//! Parsing completion signals from an invocation's signal stream.

use serde::{Deserialize, Serialize};

/// One completion marker line observed on the signal stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    /// Exit status of the worker command, when the line carried one.
    pub exit_code: Option<i32>,
}

/// Every marker line in `stream`, in order.
pub fn scan_signals(stream: &str, marker: &str) -> Vec<CompletionSignal> {
    stream
        .lines()
        .filter_map(|line| line.trim().strip_prefix(marker))
        .map(|rest| CompletionSignal {
            exit_code: rest.trim().parse().ok(),
        })
        .collect()
}
