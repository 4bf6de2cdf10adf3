//! JSONL file writer for cohort decisions.
//!
//! Each applied answer, escalation and cohort decision is serialized as a
//! single JSON line with a `type` field and `timestamp`, appended to the file
//! via a buffered writer.

use async_trait::async_trait;
use cohort_application::{CohortProgressNotifier, ResolutionApplier, ResolutionError};
use cohort_domain::{
    CheckpointId, CohortId, CohortReport, Issue, Resolution, WorkerId, WorkerState,
};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Records every agreed answer, escalation and cohort decision as one JSON
/// line. Plugged in both as the resolution applier and as a progress
/// notifier.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes after every record and
/// on `Drop`.
pub struct JsonlDecisionLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlDecisionLog {
    /// Open the log for appending at the given path.
    ///
    /// Creates the file (and parent directories) if they don't exist.
    /// Returns `None` if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create decision log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open decision log {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self, record_type: &str, mut record: Value) -> std::io::Result<()> {
        if let Value::Object(fields) = &mut record {
            fields.insert("type".to_string(), Value::from(record_type));
            fields.insert(
                "timestamp".to_string(),
                Value::from(
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                ),
            );
        }
        let line = serde_json::to_string(&record)?;

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()
    }
}

#[async_trait]
impl ResolutionApplier for JsonlDecisionLog {
    async fn apply(
        &self,
        cohort_id: &CohortId,
        issue: &Issue,
        answer: &str,
    ) -> Result<String, ResolutionError> {
        let record = serde_json::json!({
            "cohort_id": cohort_id,
            "issue_id": issue.id,
            "question": issue.question,
            "magnitude": issue.magnitude,
            "confidence": issue.confidence,
            "answer": answer,
        });
        self.write_record("auto_applied", record)
            .map_err(|e| ResolutionError::Unavailable(e.to_string()))?;

        debug!(issue_id = %issue.id, "Recorded applied answer");
        Ok(format!("recorded in {}", self.path.display()))
    }
}

impl CohortProgressNotifier for JsonlDecisionLog {
    fn on_cohort_start(
        &self,
        _cohort_id: &CohortId,
        _checkpoint: &CheckpointId,
        _roles: &[String],
    ) {
    }

    fn on_worker_transition(&self, _worker_id: &WorkerId, _role: &str, _state: WorkerState) {}

    fn on_cohort_decided(&self, report: &CohortReport) {
        let record = serde_json::json!({
            "cohort_id": report.cohort_id,
            "checkpoint_id": report.checkpoint_id,
            "status": report.status,
            "auto_resolved": report.auto_resolved_count(),
            "escalated": report.escalated_count(),
            "missing_roles": report.missing_roles,
        });
        if let Err(e) = self.write_record("cohort_decided", record) {
            warn!("Could not record cohort decision in {}: {}", self.path.display(), e);
        }
    }

    fn on_escalation(&self, cohort_id: &CohortId, issue: &Issue) {
        let reason = match issue.resolution() {
            Some(Resolution::Escalated { reason, .. }) => Some(reason.as_str()),
            _ => None,
        };
        let record = serde_json::json!({
            "cohort_id": cohort_id,
            "issue_id": issue.id,
            "question": issue.question,
            "magnitude": issue.magnitude,
            "reason": reason,
            "dissent": issue.dissent(),
        });
        if let Err(e) = self.write_record("escalated", record) {
            warn!("Could not record escalation in {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for JsonlDecisionLog {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_domain::{Disposition, Magnitude, Resolvability};

    #[tokio::test]
    async fn test_decision_log_writes_valid_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions").join("applied.jsonl");
        let log = JsonlDecisionLog::new(&path).unwrap();
        let cohort = CohortId::from("c-1");

        let first = Issue::new("i-1", "Which cache?", Magnitude::Minor, Resolvability::AutoFix);
        let second = Issue::new("i-2", "Retry count?", Magnitude::Minor, Resolvability::AutoFix);
        let action = log.apply(&cohort, &first, "LRU").await.unwrap();
        log.apply(&cohort, &second, "3").await.unwrap();
        assert!(action.contains("applied.jsonl"));
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "auto_applied");
        assert_eq!(first["cohort_id"], "c-1");
        assert_eq!(first["issue_id"], "i-1");
        assert_eq!(first["answer"], "LRU");
        assert!(first.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn test_decision_log_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applied.jsonl");
        let issue = Issue::new("i-1", "Which cache?", Magnitude::Minor, Resolvability::AutoFix);

        for answer in ["LRU", "LFU"] {
            let log = JsonlDecisionLog::new(&path).unwrap();
            log.apply(&CohortId::from("c-1"), &issue, answer).await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_decision_log_records_escalations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applied.jsonl");
        let log = JsonlDecisionLog::new(&path).unwrap();

        let mut issue = Issue::new(
            "i-9",
            "Drop the legacy table?",
            Magnitude::Critical,
            Resolvability::NeedHuman,
        );
        issue.assign_disposition(Disposition::Escalate).unwrap();
        issue
            .resolve(Resolution::Escalated {
                reason: "critical issues always go to a human".to_string(),
                verdict: None,
            })
            .unwrap();
        log.on_escalation(&CohortId::from("c-2"), &issue);
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        let record: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(record["type"], "escalated");
        assert_eq!(record["issue_id"], "i-9");
        assert_eq!(record["reason"], "critical issues always go to a human");
        assert!(record.get("timestamp").is_some());
    }
}
