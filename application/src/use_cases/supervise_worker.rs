//! Supervise Worker use case
//!
//! Drives one worker through its lifecycle: launch through the execution
//! channel, extract and validate the output, record every transition in the
//! state store, and retry retryable failures with backoff.

use crate::channel::{ChannelOutcome, ExecutionChannel};
use crate::config::{ChannelParams, RetryPolicy, SupervisorParams};
use crate::ports::execution_backend::ExecutionBackend;
use crate::ports::progress::{CohortProgressNotifier, NoProgress};
use crate::state_store::{StateStore, StateStoreError, TransitionOutcome};
use cohort_domain::{
    FailureKind, FailureRecord, InvocationSpec, LifecycleEvent, OutputExtractor, OutputProfile,
    ResultValidator, ValidationRules, WorkerId, WorkerState, WrapperProfile,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a supervisor needs to run one registered worker.
#[derive(Debug, Clone)]
pub struct WorkerAssignment {
    pub worker_id: WorkerId,
    pub role: String,
    pub invocation: InvocationSpec,
    pub enabled: bool,
}

/// Final word from a supervisor to its coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerNotice {
    pub worker_id: WorkerId,
    pub role: String,
    pub state: WorkerState,
    /// Set when the state could not be recorded normally.
    pub note: Option<String>,
}

impl WorkerNotice {
    fn new(assignment: &WorkerAssignment, state: WorkerState) -> Self {
        Self {
            worker_id: assignment.worker_id.clone(),
            role: assignment.role.clone(),
            state,
            note: None,
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum SupervisionError {
    #[error(transparent)]
    Store(#[from] StateStoreError),
}

pub struct WorkerSupervisor<B: ExecutionBackend + 'static> {
    store: Arc<StateStore>,
    backend: Arc<B>,
    channel: ExecutionChannel<B>,
    extractor: OutputExtractor,
    validator: ResultValidator,
    retry: RetryPolicy,
    params: SupervisorParams,
    progress: Arc<dyn CohortProgressNotifier>,
}

impl<B: ExecutionBackend + 'static> WorkerSupervisor<B> {
    pub fn new(
        store: Arc<StateStore>,
        backend: Arc<B>,
        channel_params: ChannelParams,
        rules: ValidationRules,
    ) -> Self {
        Self {
            store,
            channel: ExecutionChannel::new(backend.clone(), channel_params),
            backend,
            extractor: OutputExtractor::new(rules.marker_field.clone()),
            validator: ResultValidator::new(rules),
            retry: RetryPolicy::default(),
            params: SupervisorParams::default(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_params(mut self, params: SupervisorParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn CohortProgressNotifier>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_wrapper(mut self, wrapper: WrapperProfile) -> Self {
        self.extractor = self.extractor.with_wrapper(wrapper);
        self
    }

    /// Run the worker to a terminal state and report it on `notices`.
    pub async fn run(
        &self,
        assignment: WorkerAssignment,
        cancel: CancellationToken,
        notices: mpsc::Sender<WorkerNotice>,
    ) -> WorkerNotice {
        let notice = match self.drive(&assignment, &cancel).await {
            Ok(state) => WorkerNotice::new(&assignment, state),
            Err(e) => {
                error!(
                    worker_id = %assignment.worker_id,
                    role = %assignment.role,
                    "Worker supervision aborted: {}", e
                );
                WorkerNotice::new(&assignment, WorkerState::Failed).with_note(e.to_string())
            }
        };
        self.send(notices, notice).await
    }

    /// Cancel a worker that never got to launch.
    pub async fn abandon(
        &self,
        assignment: WorkerAssignment,
        reason: &str,
        notices: mpsc::Sender<WorkerNotice>,
    ) -> WorkerNotice {
        let cancelled = LifecycleEvent::Cancelled {
            raw_output: None,
            reason: reason.to_string(),
        };
        let notice = match self.record(&assignment, cancelled).await {
            Ok(state) => WorkerNotice::new(&assignment, state),
            Err(e) => {
                WorkerNotice::new(&assignment, WorkerState::Cancelled).with_note(e.to_string())
            }
        };
        self.send(notices, notice).await
    }

    async fn send(
        &self,
        notices: mpsc::Sender<WorkerNotice>,
        notice: WorkerNotice,
    ) -> WorkerNotice {
        if notices.send(notice.clone()).await.is_err() {
            debug!(
                worker_id = %notice.worker_id,
                "Coordinator stopped listening before worker finished"
            );
        }
        notice
    }

    async fn drive(
        &self,
        assignment: &WorkerAssignment,
        cancel: &CancellationToken,
    ) -> Result<WorkerState, SupervisionError> {
        let worker_id = &assignment.worker_id;

        if !assignment.enabled {
            let failure = FailureRecord::new(
                FailureKind::Disabled,
                format!("worker role '{}' is disabled", assignment.role),
            );
            return self
                .record(
                    assignment,
                    LifecycleEvent::Failed {
                        raw_output: None,
                        failure,
                    },
                )
                .await;
        }

        loop {
            if cancel.is_cancelled() {
                return self
                    .record(
                        assignment,
                        LifecycleEvent::Cancelled {
                            raw_output: None,
                            reason: "cancelled before launch".to_string(),
                        },
                    )
                    .await;
            }

            let current = self
                .store
                .snapshot(worker_id)
                .ok_or_else(|| StateStoreError::UnknownWorker(worker_id.clone()))?;
            if current.state != WorkerState::Pending {
                warn!(
                    worker_id = %worker_id,
                    state = %current.state,
                    "Worker is not pending; not launching again"
                );
                return Ok(current.state);
            }

            let attempt = current.attempt + 1;
            self.record(assignment, LifecycleEvent::Started { attempt })
                .await?;
            info!(worker_id = %worker_id, role = %assignment.role, attempt, "Worker started");

            let started = Instant::now();
            let invocation_id = format!("{worker_id}-a{attempt}");
            let result = match self
                .channel
                .start_default(&invocation_id, &assignment.invocation)
                .await
            {
                Ok(handle) => self.channel.run_to_completion(handle, cancel).await,
                Err(e) => Err(e),
            };

            let event = match result {
                Ok(ChannelOutcome::Output(bytes)) => {
                    self.evaluate(assignment, &bytes, started.elapsed())
                }
                Ok(ChannelOutcome::Cancelled { partial }) => LifecycleEvent::Cancelled {
                    raw_output: partial
                        .filter(|b| !b.is_empty())
                        .map(|b| String::from_utf8_lossy(&b).into_owned()),
                    reason: "cancelled while running".to_string(),
                },
                Err(e) => {
                    warn!(
                        worker_id = %worker_id,
                        role = %assignment.role,
                        class = %e.class(),
                        "Invocation failed: {}", e
                    );
                    LifecycleEvent::Failed {
                        raw_output: e.partial_output(),
                        failure: FailureRecord::new(e.failure_kind(), e.to_string()),
                    }
                }
            };

            let class = match &event {
                LifecycleEvent::Failed { failure, .. } => Some(failure.class),
                _ => None,
            };
            let state = self.record(assignment, event).await?;
            let Some(class) = class else {
                return Ok(state);
            };
            if cancel.is_cancelled() || !self.retry.should_retry(class, attempt) {
                return Ok(state);
            }

            let backoff = self.retry.backoff(attempt);
            self.record(
                assignment,
                LifecycleEvent::RetryScheduled {
                    attempt,
                    backoff_ms: backoff.as_millis() as u64,
                },
            )
            .await?;
            info!(
                worker_id = %worker_id,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Retry scheduled"
            );

            if class.needs_reset()
                && let Err(e) = self.backend.reset(&invocation_id).await
            {
                warn!(worker_id = %worker_id, "Backend reset failed: {}", e);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return self
                        .record(
                            assignment,
                            LifecycleEvent::Cancelled {
                                raw_output: None,
                                reason: "cancelled while waiting to retry".to_string(),
                            },
                        )
                        .await;
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            self.record(assignment, LifecycleEvent::Requeued).await?;
        }
    }

    /// Turn collected output into a `Completed` or a `Failed` event.
    fn evaluate(
        &self,
        assignment: &WorkerAssignment,
        bytes: &[u8],
        elapsed: Duration,
    ) -> LifecycleEvent {
        let worker_id = &assignment.worker_id;
        let raw = String::from_utf8_lossy(bytes).into_owned();

        let profile = OutputProfile::of(&raw);
        debug!(
            worker_id = %worker_id,
            bytes = profile.bytes,
            lines = profile.lines,
            starts_with_structure = profile.starts_with_structure,
            has_fence = profile.has_fence,
            has_type_tokens = profile.has_type_tokens,
            "Output profile"
        );
        if profile.is_suspicious(elapsed) {
            warn!(
                worker_id = %worker_id,
                role = %assignment.role,
                elapsed_ms = elapsed.as_millis() as u64,
                bytes = profile.bytes,
                head = %profile.head,
                "Suspiciously fast and small completion"
            );
        }

        let extraction = self.extractor.extract(&raw);
        for warning in &extraction.warnings {
            debug!(worker_id = %worker_id, "Extraction: {}", warning);
        }

        match self.validator.validate(&raw, &extraction.candidate) {
            Ok(payload) => {
                info!(
                    worker_id = %worker_id,
                    role = %assignment.role,
                    strategy = payload.strategy.as_str(),
                    confidence = payload.confidence,
                    "Output accepted"
                );
                LifecycleEvent::Completed {
                    raw_output: raw,
                    payload,
                }
            }
            Err(rejection) => {
                warn!(
                    worker_id = %worker_id,
                    role = %assignment.role,
                    "Output rejected: {}", rejection
                );
                LifecycleEvent::Failed {
                    raw_output: (!raw.is_empty()).then_some(raw),
                    failure: FailureRecord::new(
                        FailureKind::Rejected(rejection.kind),
                        rejection.detail,
                    ),
                }
            }
        }
    }

    /// Record `event`.
    ///
    /// A write still pending after the record timeout is reported as stuck,
    /// but the supervisor keeps waiting for it: the worker's reported state is
    /// always the state the ledger holds.
    async fn record(
        &self,
        assignment: &WorkerAssignment,
        event: LifecycleEvent,
    ) -> Result<WorkerState, SupervisionError> {
        let timeout = self.params.record_timeout;
        let write = self.store.apply(&assignment.worker_id, event);
        tokio::pin!(write);
        let outcome = match tokio::time::timeout(timeout, &mut write).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(
                    worker_id = %assignment.worker_id,
                    role = %assignment.role,
                    timeout_secs = timeout.as_secs(),
                    "Worker stuck recording its state; waiting for the ledger"
                );
                let started = Instant::now();
                let outcome = write.await?;
                info!(
                    worker_id = %assignment.worker_id,
                    waited_ms = (timeout + started.elapsed()).as_millis() as u64,
                    "Stuck state write settled"
                );
                outcome
            }
        };

        match outcome {
            TransitionOutcome::Applied(state) => {
                self.progress
                    .on_worker_transition(&assignment.worker_id, &assignment.role, state);
                Ok(state)
            }
            TransitionOutcome::Ignored(_) => self
                .store
                .snapshot(&assignment.worker_id)
                .map(|w| w.state)
                .ok_or_else(|| StateStoreError::UnknownWorker(assignment.worker_id.clone()).into()),
        }
    }
}
