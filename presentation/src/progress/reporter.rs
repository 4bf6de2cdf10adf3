//! Progress reporting while a cohort runs

use cohort_application::CohortProgressNotifier;
use cohort_domain::{CheckpointId, CohortId, CohortReport, Issue, WorkerId, WorkerState};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Reports progress with one spinner per worker
pub struct ProgressReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<WorkerId, ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn state_label(state: WorkerState) -> String {
        match state {
            WorkerState::Pending => "waiting".dimmed().to_string(),
            WorkerState::Running => "running".yellow().to_string(),
            WorkerState::Retrying => "retrying".yellow().to_string(),
            WorkerState::Completed => format!("{} completed", "v".green()),
            WorkerState::Failed => format!("{} failed", "x".red()),
            WorkerState::Cancelled => format!("{} cancelled", "-".yellow()),
        }
    }

    fn bar_for(&self, worker_id: &WorkerId, role: &str) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.entry(worker_id.clone())
            .or_insert_with(|| {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.set_prefix(role.to_string());
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            })
            .clone()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CohortProgressNotifier for ProgressReporter {
    fn on_cohort_start(&self, cohort_id: &CohortId, checkpoint: &CheckpointId, roles: &[String]) {
        let _ = self.multi.println(format!(
            "{} cohort {} ({}) with {}",
            "->".cyan(),
            cohort_id.to_string().bold(),
            checkpoint,
            roles.join(", ")
        ));
    }

    fn on_worker_transition(&self, worker_id: &WorkerId, role: &str, state: WorkerState) {
        let pb = self.bar_for(worker_id, role);
        if state.is_terminal() {
            pb.finish_with_message(Self::state_label(state));
        } else {
            pb.set_message(Self::state_label(state));
        }
    }

    fn on_cohort_decided(&self, report: &CohortReport) {
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        for pb in bars.values().filter(|pb| !pb.is_finished()) {
            pb.abandon();
        }
        let _ = self
            .multi
            .println(format!("{} {}", "->".cyan(), report.status));
    }

    fn on_escalation(&self, _cohort_id: &CohortId, issue: &Issue) {
        let _ = self.multi.println(format!(
            "  {} escalated {}: {}",
            "!".yellow().bold(),
            issue.id,
            issue.question
        ));
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl CohortProgressNotifier for SimpleProgress {
    fn on_cohort_start(&self, cohort_id: &CohortId, checkpoint: &CheckpointId, roles: &[String]) {
        eprintln!(
            "{} cohort {} ({}) with {} workers",
            "->".cyan(),
            cohort_id.to_string().bold(),
            checkpoint,
            roles.len()
        );
    }

    fn on_worker_transition(&self, _worker_id: &WorkerId, role: &str, state: WorkerState) {
        if state.is_terminal() || state == WorkerState::Retrying {
            eprintln!("  {} {}", role, ProgressReporter::state_label(state));
        }
    }

    fn on_cohort_decided(&self, report: &CohortReport) {
        eprintln!("{} {}", "->".cyan(), report.status);
        eprintln!();
    }
}
