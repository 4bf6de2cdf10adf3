//! Progress notification port
//!
//! Defines the interface for reporting progress while a cohort runs.

use cohort_domain::{CheckpointId, CohortId, CohortReport, Issue, WorkerId, WorkerState};
use std::sync::Arc;

/// Callback for progress updates during cohort execution
///
/// Implementations live in the presentation layer.
pub trait CohortProgressNotifier: Send + Sync {
    /// Called when a cohort's workers have been registered
    fn on_cohort_start(&self, cohort_id: &CohortId, checkpoint: &CheckpointId, roles: &[String]);

    /// Called after every recorded worker transition
    fn on_worker_transition(&self, worker_id: &WorkerId, role: &str, state: WorkerState);

    /// Called once the cohort has a decision
    fn on_cohort_decided(&self, report: &CohortReport);

    /// Called when an issue is escalated to a human.
    fn on_escalation(&self, _cohort_id: &CohortId, _issue: &Issue) {}
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl CohortProgressNotifier for NoProgress {
    fn on_cohort_start(
        &self,
        _cohort_id: &CohortId,
        _checkpoint: &CheckpointId,
        _roles: &[String],
    ) {
    }
    fn on_worker_transition(&self, _worker_id: &WorkerId, _role: &str, _state: WorkerState) {}
    fn on_cohort_decided(&self, _report: &CohortReport) {}
}

/// A progress notifier that delegates to several inner notifiers.
pub struct CompositeProgress {
    delegates: Vec<Arc<dyn CohortProgressNotifier>>,
}

impl CompositeProgress {
    pub fn new(delegates: Vec<Arc<dyn CohortProgressNotifier>>) -> Self {
        Self { delegates }
    }
}

macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        for d in &$self.delegates {
            d.$method($($arg),*);
        }
    };
}

impl CohortProgressNotifier for CompositeProgress {
    fn on_cohort_start(&self, cohort_id: &CohortId, checkpoint: &CheckpointId, roles: &[String]) {
        delegate!(self, on_cohort_start, cohort_id, checkpoint, roles);
    }

    fn on_worker_transition(&self, worker_id: &WorkerId, role: &str, state: WorkerState) {
        delegate!(self, on_worker_transition, worker_id, role, state);
    }

    fn on_cohort_decided(&self, report: &CohortReport) {
        delegate!(self, on_cohort_decided, report);
    }

    fn on_escalation(&self, cohort_id: &CohortId, issue: &Issue) {
        delegate!(self, on_escalation, cohort_id, issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_domain::{Magnitude, Resolvability};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl CohortProgressNotifier for Recorder {
        fn on_cohort_start(&self, cohort_id: &CohortId, _checkpoint: &CheckpointId, _: &[String]) {
            self.calls.lock().unwrap().push(format!("start {cohort_id}"));
        }

        fn on_worker_transition(&self, _worker_id: &WorkerId, role: &str, state: WorkerState) {
            self.calls.lock().unwrap().push(format!("{role} {state}"));
        }

        fn on_cohort_decided(&self, _report: &CohortReport) {}

        fn on_escalation(&self, _cohort_id: &CohortId, issue: &Issue) {
            self.calls.lock().unwrap().push(format!("escalated {}", issue.id));
        }
    }

    #[test]
    fn test_composite_forwards_to_every_delegate() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let composite = CompositeProgress::new(vec![
            first.clone() as Arc<dyn CohortProgressNotifier>,
            second.clone(),
        ]);

        let cohort = CohortId::from("c-1");
        composite.on_cohort_start(&cohort, &CheckpointId::new("plan"), &[]);
        composite.on_worker_transition(&WorkerId::from("w-1"), "claude", WorkerState::Running);
        let issue = Issue::new("i-1", "Why?", Magnitude::Critical, Resolvability::NeedHuman);
        composite.on_escalation(&cohort, &issue);

        for recorder in [&first, &second] {
            assert_eq!(
                *recorder.calls.lock().unwrap(),
                vec!["start c-1", "claude running", "escalated i-1"]
            );
        }
    }
}
