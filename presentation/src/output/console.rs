//! Console output formatter for cohort reports

use cohort_domain::{
    CohortReport, CohortStatus, Disposition, Issue, Resolution, Worker, WorkerOutcome,
    WorkerState,
};
use colored::{ColoredString, Colorize};

/// Formats cohort reports and ledger state for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format the complete cohort report
    pub fn format(report: &CohortReport) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Cohort Report"));
        output.push('\n');

        output.push_str(&format!(
            "{} {}\n{} {}\n{} {}\n",
            "Cohort:".cyan().bold(),
            report.cohort_id,
            "Checkpoint:".cyan().bold(),
            report.checkpoint_id,
            "Status:".cyan().bold(),
            Self::status(&report.status)
        ));
        output.push_str(&format!(
            "{} {}/{} completed, {} required",
            "Quorum:".cyan().bold(),
            report.tally.completed,
            report.tally.size,
            report.tally.required
        ));
        if report.timed_out {
            output.push_str(&format!(" {}", "(decided at timeout)".yellow()));
        }
        output.push('\n');
        if !report.missing_roles.is_empty() {
            output.push_str(&format!(
                "{} {}\n",
                "Missing:".yellow().bold(),
                report.missing_roles.join(", ")
            ));
        }

        output.push_str(&Self::section_header("Workers"));
        for worker in &report.workers {
            output.push_str(&Self::outcome_line(worker));
        }
        if let Some(secondary) = &report.secondary {
            output.push_str(&format!("{}\n", "Secondary validation:".dimmed()));
            output.push_str(&Self::outcome_line(secondary));
        }

        if !report.issues.is_empty() {
            output.push_str(&Self::section_header(&format!(
                "Issues ({} auto-resolved, {} escalated)",
                report.auto_resolved_count(),
                report.escalated_count()
            )));
            for issue in &report.issues {
                output.push_str(&Self::issue_block(issue));
            }
        }

        output.push_str(&Self::footer());
        output
    }

    /// Format as JSON
    pub fn format_json(report: &CohortReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    /// Format the projected state of ledger workers (for `status`)
    pub fn format_workers(workers: &[Worker]) -> String {
        if workers.is_empty() {
            return format!("{}\n", "No workers recorded in the ledger.".dimmed());
        }

        let mut output = String::new();
        let mut current_cohort = None;
        for worker in workers {
            if current_cohort != Some(&worker.cohort_id) {
                output.push_str(&format!("\n{} {}\n", "Cohort".cyan().bold(), worker.cohort_id));
                current_cohort = Some(&worker.cohort_id);
            }
            output.push_str(&format!(
                "  {:<10} {:<12} {} attempt {}, updated {}",
                worker.role,
                Self::state(worker.state),
                worker.id,
                worker.attempt,
                worker.updated_at.format("%Y-%m-%d %H:%M:%S")
            ));
            if let Some(failure) = &worker.failure {
                output.push_str(&format!("\n             {}", failure.to_string().red()));
            }
            if let Some(attempt) = worker.raw_output_attempt.filter(|_| worker.output_is_stale()) {
                let note = format!("output is from attempt {}", attempt);
                output.push_str(&format!("\n             {}", note.dimmed()));
            }
            output.push('\n');
        }
        output
    }

    /// Format ledger workers as JSON
    pub fn format_workers_json(workers: &[Worker]) -> String {
        serde_json::to_string_pretty(workers).unwrap_or_else(|_| "[]".to_string())
    }

    fn outcome_line(worker: &WorkerOutcome) -> String {
        let mut line = format!(
            "  {:<10} {:<12} attempts {}, {} bytes",
            worker.role,
            Self::state(worker.state),
            worker.attempts,
            worker.raw_bytes
        );
        if let Some(strategy) = worker.strategy {
            line.push_str(&format!(", via {}", strategy));
        }
        if let Some(failure) = &worker.failure {
            line.push_str(&format!("\n             {}", failure.to_string().red()));
        }
        if let Some(note) = &worker.note {
            line.push_str(&format!("\n             {}", note.dimmed()));
        }
        line.push('\n');
        line
    }

    fn issue_block(issue: &Issue) -> String {
        let disposition = match issue.disposition() {
            Some(Disposition::AutoResolvable) => "auto".green(),
            Some(Disposition::NeedsSecondaryValidation) => "secondary".yellow(),
            Some(Disposition::Escalate) => "escalate".red(),
            None => "undecided".dimmed(),
        };
        let mut block = format!(
            "\n{} {} [{:?}/{:?}/{:?} confidence]\n  {}\n",
            format!("[{}]", disposition).bold(),
            issue.id.bold(),
            issue.magnitude,
            issue.resolvability,
            issue.confidence,
            issue.question
        );

        match issue.resolution() {
            Some(Resolution::AutoApplied { answer, verdict, .. }) => {
                block.push_str(&format!("  {} {}\n", "Answer:".green(), answer));
                if let Some(verdict) = verdict
                    && !verdict.reasoning.is_empty()
                {
                    block.push_str(&format!("  {} {}\n", "Validator:".dimmed(), verdict.reasoning));
                }
            }
            Some(Resolution::Escalated { reason, verdict }) => {
                block.push_str(&format!("  {} {}\n", "Escalated:".red(), reason));
                if let Some(recommended) = verdict
                    .as_ref()
                    .and_then(|v| v.recommended_answer.as_ref())
                {
                    block.push_str(&format!("  {} {}\n", "Recommended:".yellow(), recommended));
                }
                for dissent in issue.dissent() {
                    block.push_str(&format!("    * {}\n", dissent));
                }
            }
            None => {}
        }
        block
    }

    fn status(status: &CohortStatus) -> ColoredString {
        let text = status.to_string();
        match status {
            CohortStatus::Succeeded => text.green().bold(),
            CohortStatus::Degraded { .. } | CohortStatus::Pending => text.yellow().bold(),
            CohortStatus::Failed(_) => text.red().bold(),
        }
    }

    fn state(state: WorkerState) -> ColoredString {
        let text = state.to_string();
        match state {
            WorkerState::Completed => text.green(),
            WorkerState::Failed => text.red(),
            WorkerState::Cancelled | WorkerState::Retrying => text.yellow(),
            WorkerState::Pending | WorkerState::Running => text.normal(),
        }
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }
}
