//! Coordinate Cohort use case
//!
//! Runs a cohort of workers against one checkpoint and reaches a single
//! quorum decision:
//!
//! ```text
//! start_cohort ──► register workers ──► spawn supervisors (through SpawnGate)
//!                                             │ WorkerNotice
//!                                             ▼
//!                         collector: all terminal | overall timeout
//!                                             │
//!                                             ▼
//!        decide ──► merge issues ──► auto-apply / secondary batch / escalate
//! ```
//!
//! The decision is published once. Results that arrive later are logged and
//! never change it.

use crate::config::{
    ChannelParams, CohortParams, RetryPolicy, SupervisorParams, WorkerCatalog,
};
use crate::ports::execution_backend::ExecutionBackend;
use crate::ports::progress::{CohortProgressNotifier, NoProgress};
use crate::ports::resolution_applier::{RecordOnlyApplier, ResolutionApplier};
use crate::ports::spawn_gate::{OpenGate, SpawnGate};
use crate::state_store::{StateStore, StateStoreError, WorkerDraft};
use crate::use_cases::supervise_worker::{WorkerAssignment, WorkerNotice, WorkerSupervisor};
use cohort_domain::{
    CheckpointId, CohortFailure, CohortId, CohortReport, CohortStatus, Confidence, Disposition,
    DomainError, Issue, Magnitude, QuorumTally, Resolution, Resolvability, SecondaryVerdict,
    VERDICTS_FIELD, ValidationRules, WorkerId, WorkerOutcome, WorkerState, WrapperProfile,
    decide_disposition, merge_issues, parse_reported_issues, parse_verdicts, secondary_request,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("No worker profile for role '{0}'")]
    UnknownRole(String),

    #[error("Unknown cohort: {0}")]
    UnknownCohort(CohortId),

    #[error("Cohort {0} has not been decided yet")]
    NotDecided(CohortId),

    #[error("Insufficient quorum: {succeeded} of {required} required workers succeeded")]
    InsufficientQuorum { succeeded: usize, required: usize },

    #[error("No worker in cohort {0} produced a result")]
    TotalFailure(CohortId),

    #[error("Cohort {0} was abandoned before a decision")]
    Abandoned(CohortId),

    #[error(transparent)]
    Store(#[from] StateStoreError),
}

/// Merged issues of a cohort that reached quorum.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueReport {
    pub issues: Vec<Issue>,
    pub degraded: bool,
    pub missing_roles: Vec<String>,
}

/// Everything the coordinator and its supervisors are tuned by.
#[derive(Debug, Clone, Default)]
pub struct CohortSettings {
    pub channel: ChannelParams,
    pub validation: ValidationRules,
    pub retry: RetryPolicy,
    pub supervisor: SupervisorParams,
    pub cohort: CohortParams,
    pub wrapper: WrapperProfile,
}

struct CohortHandle {
    checkpoint_id: CheckpointId,
    roles: Vec<String>,
    members: Vec<WorkerId>,
    required: usize,
    /// Cancels member workers (timeout or caller).
    cancel: CancellationToken,
    /// Cancels secondary validation (caller only).
    resolution_cancel: CancellationToken,
    report: watch::Sender<Option<Arc<CohortReport>>>,
}

pub struct ConsensusCoordinator<B: ExecutionBackend + 'static> {
    store: Arc<StateStore>,
    backend: Arc<B>,
    catalog: WorkerCatalog,
    settings: CohortSettings,
    gate: Arc<dyn SpawnGate>,
    applier: Arc<dyn ResolutionApplier>,
    progress: Arc<dyn CohortProgressNotifier>,
    cohorts: RwLock<HashMap<CohortId, Arc<CohortHandle>>>,
}

impl<B: ExecutionBackend + 'static> ConsensusCoordinator<B> {
    pub fn new(
        store: Arc<StateStore>,
        backend: Arc<B>,
        catalog: WorkerCatalog,
        settings: CohortSettings,
    ) -> Self {
        Self {
            store,
            backend,
            catalog,
            settings,
            gate: Arc::new(OpenGate),
            applier: Arc::new(RecordOnlyApplier),
            progress: Arc::new(NoProgress),
            cohorts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn SpawnGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_applier(mut self, applier: Arc<dyn ResolutionApplier>) -> Self {
        self.applier = applier;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn CohortProgressNotifier>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Register the cohort's workers and start supervising them.
    ///
    /// Returns as soon as the workers are registered. `prompt_inputs` holds
    /// either one prompt shared by every role or one prompt per role.
    pub async fn start_cohort(
        self: &Arc<Self>,
        checkpoint_id: CheckpointId,
        roles: Vec<String>,
        prompt_inputs: Vec<String>,
    ) -> Result<CohortId, CoordinatorError> {
        let prompts = self.check_request(&roles, prompt_inputs)?;
        let cohort_id = CohortId::generate();

        let mut members = Vec::with_capacity(roles.len());
        let mut assignments = Vec::with_capacity(roles.len());
        for (role, prompt) in roles.iter().zip(&prompts) {
            let profile = self
                .catalog
                .get(role)
                .ok_or_else(|| CoordinatorError::UnknownRole(role.clone()))?;
            let worker_id = self
                .store
                .register(
                    WorkerDraft::new(cohort_id.clone(), role.clone(), prompt.clone())
                        .with_model(profile.model.clone()),
                )
                .await?;
            members.push(worker_id.clone());
            assignments.push(WorkerAssignment {
                worker_id,
                role: role.clone(),
                invocation: profile.invocation_for(prompt),
                enabled: profile.enabled,
            });
        }

        let required = self.settings.cohort.quorum.required(roles.len());
        let (report, _) = watch::channel(None);
        let handle = Arc::new(CohortHandle {
            checkpoint_id: checkpoint_id.clone(),
            roles: roles.clone(),
            members,
            required,
            cancel: CancellationToken::new(),
            resolution_cancel: CancellationToken::new(),
            report,
        });
        self.cohorts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cohort_id.clone(), handle.clone());

        info!(
            cohort_id = %cohort_id,
            checkpoint = %checkpoint_id,
            size = roles.len(),
            required,
            "Cohort started"
        );
        self.progress
            .on_cohort_start(&cohort_id, &checkpoint_id, &roles);

        let coordinator = Arc::clone(self);
        let id = cohort_id.clone();
        tokio::spawn(async move { coordinator.drive(id, handle, assignments).await });

        Ok(cohort_id)
    }

    fn check_request(
        &self,
        roles: &[String],
        prompt_inputs: Vec<String>,
    ) -> Result<Vec<String>, CoordinatorError> {
        if roles.is_empty() {
            return Err(DomainError::NoRoles.into());
        }

        let mut seen = HashSet::new();
        if let Some(dup) = roles.iter().find(|r| !seen.insert(r.as_str())) {
            return Err(DomainError::InvalidCohort(format!("role '{dup}' requested twice")).into());
        }

        if let Some(unknown) = roles.iter().find(|r| self.catalog.get(r).is_none()) {
            return Err(CoordinatorError::UnknownRole(unknown.clone()));
        }

        if prompt_inputs.iter().any(|p| p.trim().is_empty()) {
            return Err(DomainError::InvalidPrompt("prompt input is empty".to_string()).into());
        }

        match prompt_inputs.len() {
            1 => Ok(vec![prompt_inputs[0].clone(); roles.len()]),
            n if n == roles.len() => Ok(prompt_inputs),
            n => Err(DomainError::InvalidCohort(format!(
                "{n} prompt inputs for {} roles",
                roles.len()
            ))
            .into()),
        }
    }

    fn supervisor(&self, rules: ValidationRules) -> WorkerSupervisor<B> {
        WorkerSupervisor::new(
            self.store.clone(),
            self.backend.clone(),
            self.settings.channel.clone(),
            rules,
        )
        .with_retry(self.settings.retry.clone())
        .with_params(self.settings.supervisor.clone())
        .with_progress(self.progress.clone())
        .with_wrapper(self.settings.wrapper.clone())
    }

    async fn drive(
        self: Arc<Self>,
        cohort_id: CohortId,
        handle: Arc<CohortHandle>,
        assignments: Vec<WorkerAssignment>,
    ) {
        let (tx, mut rx) = mpsc::channel(self.settings.cohort.notification_capacity.max(1));
        let supervisor = Arc::new(self.supervisor(self.settings.validation.clone()));

        let mut tasks = JoinSet::new();
        for assignment in assignments {
            let supervisor = Arc::clone(&supervisor);
            let gate = Arc::clone(&self.gate);
            let cancel = handle.cancel.child_token();
            let tx = tx.clone();
            let cohort_id = cohort_id.clone();
            let role = assignment.role.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    permit = gate.admit(&cohort_id, &role) => permit,
                    _ = cancel.cancelled() => {
                        supervisor.abandon(assignment, "cancelled before admission", tx).await;
                        return;
                    }
                };
                supervisor.run(assignment, cancel, tx).await;
                drop(permit);
            });
        }
        drop(tx);

        let (notices, timed_out) = self.collect(&cohort_id, &handle, &mut rx).await;
        let report = Arc::new(self.decide(&cohort_id, &handle, &notices, timed_out).await);

        info!(
            cohort_id = %cohort_id,
            status = %report.status,
            completed = report.tally.completed,
            issues = report.issues.len(),
            escalated = report.escalated_count(),
            "Cohort decided"
        );
        handle.report.send_replace(Some(Arc::clone(&report)));
        self.progress.on_cohort_decided(&report);

        while let Some(late) = rx.recv().await {
            warn!(
                cohort_id = %cohort_id,
                worker_id = %late.worker_id,
                role = %late.role,
                state = %late.state,
                "Worker result arrived after the cohort decision; ignored"
            );
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Gather notices until every member reported or the deadline forced a decision.
    async fn collect(
        &self,
        cohort_id: &CohortId,
        handle: &CohortHandle,
        rx: &mut mpsc::Receiver<WorkerNotice>,
    ) -> (HashMap<WorkerId, WorkerNotice>, bool) {
        let mut notices = HashMap::new();
        let params = &self.settings.cohort;
        let deadline = tokio::time::sleep(params.overall_timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;

        while notices.len() < handle.members.len() {
            tokio::select! {
                notice = rx.recv() => match notice {
                    Some(notice) => {
                        debug!(
                            cohort_id = %cohort_id,
                            worker_id = %notice.worker_id,
                            state = %notice.state,
                            "Worker reported"
                        );
                        notices.insert(notice.worker_id.clone(), notice);
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    if timed_out {
                        warn!(
                            cohort_id = %cohort_id,
                            missing = handle.members.len() - notices.len(),
                            "Workers did not stop within the cancellation grace period"
                        );
                        break;
                    }
                    warn!(
                        cohort_id = %cohort_id,
                        timeout_secs = params.overall_timeout.as_secs(),
                        "Cohort timed out; cancelling unfinished workers"
                    );
                    timed_out = true;
                    handle.cancel.cancel();
                    deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + params.cancel_grace);
                }
            }
        }

        (notices, timed_out)
    }

    async fn decide(
        &self,
        cohort_id: &CohortId,
        handle: &CohortHandle,
        notices: &HashMap<WorkerId, WorkerNotice>,
        timed_out: bool,
    ) -> CohortReport {
        let mut tally = QuorumTally {
            size: handle.members.len(),
            required: handle.required,
            ..Default::default()
        };
        let mut workers = Vec::with_capacity(handle.members.len());
        let mut missing_roles = Vec::new();
        let mut reports = Vec::new();
        let marker_field = self.settings.validation.marker_field.as_str();

        for (worker_id, role) in handle.members.iter().zip(&handle.roles) {
            let snapshot = self.store.snapshot(worker_id);
            let notice = notices.get(worker_id);

            match notice.map(|n| n.state) {
                Some(WorkerState::Completed) => tally.completed += 1,
                Some(WorkerState::Cancelled) => tally.cancelled += 1,
                Some(_) => tally.failed += 1,
                None => tally.unfinished += 1,
            }

            if let Some(worker) = &snapshot {
                let mut outcome = WorkerOutcome::from_worker(worker);
                match notice {
                    Some(WorkerNotice { note: Some(note), .. }) => {
                        outcome = outcome.with_note(note.clone())
                    }
                    None => outcome = outcome.with_note("no result before the cohort deadline"),
                    _ => {}
                }
                workers.push(outcome);
            }

            let payload = snapshot
                .as_ref()
                .filter(|_| notice.is_some_and(|n| n.state == WorkerState::Completed))
                .and_then(|w| w.payload.as_ref());
            match payload {
                Some(payload) => match parse_reported_issues(&payload.value, marker_field) {
                    Ok(issues) => reports.push((role.clone(), issues)),
                    Err(e) => {
                        warn!(
                            cohort_id = %cohort_id,
                            role = %role,
                            "Completed payload has no issue list: {}",
                            e
                        );
                        reports.push((role.clone(), Vec::new()));
                    }
                },
                None => missing_roles.push(role.clone()),
            }
        }

        let status = tally.decide();
        let (issues, secondary) = if status.has_result() {
            let merged = merge_issues(&reports, tally.size);
            self.resolve(cohort_id, handle, merged).await
        } else {
            (Vec::new(), None)
        };

        CohortReport {
            cohort_id: cohort_id.clone(),
            checkpoint_id: handle.checkpoint_id.clone(),
            status,
            tally,
            timed_out,
            workers,
            missing_roles,
            issues,
            secondary,
            decided_at: chrono::Utc::now(),
        }
    }

    /// Assign dispositions and resolve every merged issue.
    async fn resolve(
        &self,
        cohort_id: &CohortId,
        handle: &CohortHandle,
        mut issues: Vec<Issue>,
    ) -> (Vec<Issue>, Option<WorkerOutcome>) {
        for issue in &mut issues {
            let disposition =
                decide_disposition(issue.confidence, issue.magnitude, issue.resolvability);
            if let Err(e) = issue.assign_disposition(disposition) {
                warn!(cohort_id = %cohort_id, issue = %issue.id, "{}", e);
            }
        }

        let mut resolutions: Vec<Option<Resolution>> = vec![None; issues.len()];

        let auto: Vec<usize> = indices(&issues, Disposition::AutoResolvable);
        let applied = futures::future::join_all(
            auto.iter()
                .map(|&i| self.auto_apply(cohort_id, &issues[i], None)),
        )
        .await;
        for (i, resolution) in auto.into_iter().zip(applied) {
            resolutions[i] = Some(resolution);
        }

        let pending = indices(&issues, Disposition::NeedsSecondaryValidation);
        let mut secondary = None;
        if !pending.is_empty() {
            let batch: Vec<&Issue> = pending.iter().map(|&i| &issues[i]).collect();
            let request = secondary_request(&batch);
            match self.run_secondary(cohort_id, handle, &request).await {
                Ok((verdicts, outcome)) => {
                    secondary = Some(outcome);
                    for &i in &pending {
                        let verdict = verdicts.iter().find(|v| v.issue_id == issues[i].id).cloned();
                        let resolution = match verdict {
                            Some(v) if v.agrees_with_majority => {
                                self.auto_apply(cohort_id, &issues[i], Some(v)).await
                            }
                            Some(v) => Resolution::Escalated {
                                reason: "secondary validator disagreed with the majority"
                                    .to_string(),
                                verdict: Some(v),
                            },
                            None => Resolution::Escalated {
                                reason: "secondary validator returned no verdict".to_string(),
                                verdict: None,
                            },
                        };
                        resolutions[i] = Some(resolution);
                    }
                }
                Err((reason, outcome)) => {
                    warn!(cohort_id = %cohort_id, "Secondary validation unavailable: {}", reason);
                    secondary = outcome;
                    for &i in &pending {
                        resolutions[i] = Some(Resolution::Escalated {
                            reason: format!("secondary validation unavailable: {reason}"),
                            verdict: None,
                        });
                    }
                }
            }
        }

        for (issue, resolution) in issues.iter_mut().zip(resolutions) {
            let resolution = resolution.unwrap_or_else(|| Resolution::Escalated {
                reason: escalation_reason(issue).to_string(),
                verdict: None,
            });
            let escalated = resolution.is_escalated();
            if let Err(e) = issue.resolve(resolution) {
                warn!(cohort_id = %cohort_id, issue = %issue.id, "{}", e);
            }
            if escalated {
                info!(cohort_id = %cohort_id, issue = %issue.id, "Issue escalated");
                self.progress.on_escalation(cohort_id, issue);
            }
        }

        (issues, secondary)
    }

    async fn auto_apply(
        &self,
        cohort_id: &CohortId,
        issue: &Issue,
        verdict: Option<SecondaryVerdict>,
    ) -> Resolution {
        let Some(answer) = issue.majority_answer.clone() else {
            return Resolution::Escalated {
                reason: "no majority answer to apply".to_string(),
                verdict,
            };
        };

        match self.applier.apply(cohort_id, issue, &answer).await {
            Ok(action) => {
                debug!(cohort_id = %cohort_id, issue = %issue.id, "Issue auto-resolved");
                Resolution::AutoApplied {
                    answer,
                    action,
                    verdict,
                }
            }
            Err(e) => Resolution::Escalated {
                reason: format!("auto-resolution failed: {e}"),
                verdict,
            },
        }
    }

    /// Run one secondary validator over a batch of issues.
    async fn run_secondary(
        &self,
        cohort_id: &CohortId,
        handle: &CohortHandle,
        request: &Value,
    ) -> Result<(Vec<SecondaryVerdict>, WorkerOutcome), (String, Option<WorkerOutcome>)> {
        let Some(role) = self.settings.cohort.secondary_role.as_deref() else {
            return Err(("no secondary validator configured".to_string(), None));
        };
        let Some(profile) = self.catalog.get(role) else {
            return Err((format!("no worker profile for role '{role}'"), None));
        };

        let prompt = serde_json::to_string_pretty(request).unwrap_or_else(|_| request.to_string());
        let worker_id = self
            .store
            .register(
                WorkerDraft::new(cohort_id.clone(), role, prompt.clone())
                    .with_model(profile.model.clone()),
            )
            .await
            .map_err(|e| (e.to_string(), None))?;
        info!(cohort_id = %cohort_id, worker_id = %worker_id, role, "Secondary validation started");

        let assignment = WorkerAssignment {
            worker_id: worker_id.clone(),
            role: role.to_string(),
            invocation: profile.invocation_for(&prompt),
            enabled: profile.enabled,
        };
        let supervisor = self.supervisor(
            self.settings
                .validation
                .clone()
                .with_marker_field(VERDICTS_FIELD),
        );
        let (tx, _rx) = mpsc::channel(1);
        let token = handle.resolution_cancel.child_token();
        let run = supervisor.run(assignment, token.clone(), tx);
        tokio::pin!(run);
        let notice = tokio::select! {
            notice = &mut run => notice,
            _ = tokio::time::sleep(self.settings.cohort.overall_timeout) => {
                warn!(cohort_id = %cohort_id, "Secondary validation timed out");
                token.cancel();
                run.await
            }
        };

        let worker = self.store.snapshot(&worker_id);
        let outcome = worker.as_ref().map(WorkerOutcome::from_worker);
        match (&worker, notice.state) {
            (Some(worker), WorkerState::Completed) => match (&worker.payload, outcome) {
                (Some(payload), Some(outcome)) => Ok((parse_verdicts(&payload.value), outcome)),
                (_, outcome) => Err(("validator completed without a payload".to_string(), outcome)),
            },
            (worker, state) => {
                let reason = worker
                    .as_ref()
                    .and_then(|w| w.failure.as_ref())
                    .map(|f| f.to_string())
                    .or(notice.note.clone())
                    .unwrap_or_else(|| format!("validator ended {state}"));
                Err((reason, outcome))
            }
        }
    }

    /// Current status. `Pending` until the decision is published.
    pub fn poll_cohort(&self, cohort_id: &CohortId) -> Result<CohortStatus, CoordinatorError> {
        let handle = self.handle(cohort_id)?;
        let status = handle
            .report
            .borrow()
            .as_ref()
            .map_or(CohortStatus::Pending, |r| r.status);
        Ok(status)
    }

    /// Merged issues of a decided cohort.
    ///
    /// A cohort without quorum is an error the caller must halt on.
    pub fn get_issues(&self, cohort_id: &CohortId) -> Result<IssueReport, CoordinatorError> {
        let report = self
            .report(cohort_id)?
            .ok_or_else(|| CoordinatorError::NotDecided(cohort_id.clone()))?;

        match report.status {
            CohortStatus::Pending => Err(CoordinatorError::NotDecided(cohort_id.clone())),
            CohortStatus::Failed(CohortFailure::InsufficientQuorum {
                succeeded,
                required,
            }) => Err(CoordinatorError::InsufficientQuorum {
                succeeded,
                required,
            }),
            CohortStatus::Failed(CohortFailure::TotalFailure) => {
                Err(CoordinatorError::TotalFailure(cohort_id.clone()))
            }
            CohortStatus::Succeeded | CohortStatus::Degraded { .. } => Ok(IssueReport {
                issues: report.issues.clone(),
                degraded: report.is_degraded(),
                missing_roles: report.missing_roles.clone(),
            }),
        }
    }

    /// The published report, if the cohort has been decided.
    pub fn report(
        &self,
        cohort_id: &CohortId,
    ) -> Result<Option<Arc<CohortReport>>, CoordinatorError> {
        let handle = self.handle(cohort_id)?;
        let report = handle.report.borrow().clone();
        Ok(report)
    }

    /// Wait for the decision.
    pub async fn wait_cohort(
        &self,
        cohort_id: &CohortId,
    ) -> Result<Arc<CohortReport>, CoordinatorError> {
        let handle = self.handle(cohort_id)?;
        let mut rx = handle.report.subscribe();
        let decided = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CoordinatorError::Abandoned(cohort_id.clone()))?;
        let report = Option::clone(&decided);
        drop(decided);
        report.ok_or_else(|| CoordinatorError::Abandoned(cohort_id.clone()))
    }

    /// Cancel every unfinished worker of the cohort. The decision follows
    /// as soon as they have stopped.
    pub fn cancel_cohort(&self, cohort_id: &CohortId) -> Result<(), CoordinatorError> {
        let handle = self.handle(cohort_id)?;
        info!(cohort_id = %cohort_id, "Cohort cancellation requested");
        handle.cancel.cancel();
        handle.resolution_cancel.cancel();
        Ok(())
    }

    fn handle(&self, cohort_id: &CohortId) -> Result<Arc<CohortHandle>, CoordinatorError> {
        self.cohorts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cohort_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::UnknownCohort(cohort_id.clone()))
    }
}

fn indices(issues: &[Issue], disposition: Disposition) -> Vec<usize> {
    issues
        .iter()
        .enumerate()
        .filter(|(_, issue)| issue.disposition() == Some(disposition))
        .map(|(i, _)| i)
        .collect()
}

fn escalation_reason(issue: &Issue) -> &'static str {
    match (issue.confidence, issue.magnitude, issue.resolvability) {
        (Confidence::Low, _, _) => "workers did not agree on an answer",
        (_, Magnitude::Critical, _) => "critical issues always go to a human",
        (_, _, Resolvability::NeedHuman) => "workers flagged this issue for a human",
        _ => "outside the auto-resolution policy",
    }
}
