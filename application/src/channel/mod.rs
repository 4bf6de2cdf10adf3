//! Execution channel: one invocation from launch to collected output.
//!
//! The channel owns completion detection. Output is collected only after
//! exactly one completion signal has been seen *and* the sink has held a
//! stable size above the floor for the quiescence window.

mod error;

pub use error::ChannelError;

use crate::config::ChannelParams;
use crate::ports::execution_backend::{ExecutionBackend, LaunchedInvocation};
use cohort_domain::{InvocationSpec, Stability, StabilityGate, scan_signals};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Result of one [`ExecutionChannel::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPoll {
    NotDone,
    Done(Vec<u8>),
    Errored(ChannelError),
}

/// How [`ExecutionChannel::run_to_completion`] ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Output(Vec<u8>),
    Cancelled { partial: Option<Vec<u8>> },
}

/// A started invocation and its completion-detection state.
#[derive(Debug)]
pub struct ChannelHandle {
    invocation: LaunchedInvocation,
    gate: StabilityGate,
    started_at: Instant,
    timeout: Duration,
    signal_seen_at: Option<Instant>,
    exit_code: Option<i32>,
    closed: bool,
}

impl ChannelHandle {
    pub fn invocation(&self) -> &LaunchedInvocation {
        &self.invocation
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Exit code reported with the completion signal, once seen.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

pub struct ExecutionChannel<B: ExecutionBackend + ?Sized> {
    backend: Arc<B>,
    params: ChannelParams,
}

impl<B: ExecutionBackend + ?Sized> ExecutionChannel<B> {
    pub fn new(backend: Arc<B>, params: ChannelParams) -> Self {
        Self { backend, params }
    }

    pub fn params(&self) -> &ChannelParams {
        &self.params
    }

    /// Launch `spec` with the default invocation timeout.
    pub async fn start_default(
        &self,
        invocation_id: &str,
        spec: &InvocationSpec,
    ) -> Result<ChannelHandle, ChannelError> {
        self.start(invocation_id, spec, self.params.invocation_timeout)
            .await
    }

    pub async fn start(
        &self,
        invocation_id: &str,
        spec: &InvocationSpec,
        timeout: Duration,
    ) -> Result<ChannelHandle, ChannelError> {
        let invocation = self
            .backend
            .launch(invocation_id, spec)
            .await
            .map_err(ChannelError::backend)?;

        debug!(
            invocation_id,
            sink = %invocation.sink_path.display(),
            wrapped = invocation.wrapped,
            "Invocation launched"
        );

        Ok(ChannelHandle {
            invocation,
            gate: StabilityGate::new(self.params.quiescence_window, self.params.min_sink_bytes),
            started_at: Instant::now(),
            timeout,
            signal_seen_at: None,
            exit_code: None,
            closed: false,
        })
    }

    /// Observe the invocation once.
    ///
    /// `Done` and `Errored` close the handle and release backend resources.
    pub async fn poll(&self, handle: &mut ChannelHandle) -> ChannelPoll {
        if handle.closed {
            return ChannelPoll::Errored(ChannelError::Closed);
        }

        match self.step(handle).await {
            Ok(None) => ChannelPoll::NotDone,
            Ok(Some(bytes)) => {
                self.close(handle, false).await;
                ChannelPoll::Done(bytes)
            }
            Err(err) => {
                let partial = self.partial(&handle.invocation).await;
                self.close(handle, true).await;
                ChannelPoll::Errored(err.with_partial(partial))
            }
        }
    }

    async fn step(&self, handle: &mut ChannelHandle) -> Result<Option<Vec<u8>>, ChannelError> {
        let now = Instant::now();
        let invocation = &handle.invocation;
        let observation = self
            .backend
            .observe(invocation)
            .await
            .map_err(ChannelError::backend)?;

        let signals = scan_signals(&observation.signal_stream, &invocation.marker);
        if signals.len() > 1 {
            warn!(
                invocation_id = %invocation.invocation_id,
                count = signals.len(),
                "Multiple completion signals"
            );
            return Err(ChannelError::DuplicateSignal {
                count: signals.len(),
                partial: None,
            });
        }

        if handle.signal_seen_at.is_none()
            && let Some(signal) = signals.first()
        {
            debug!(
                invocation_id = %invocation.invocation_id,
                exit_code = ?signal.exit_code,
                "Completion signal received"
            );
            handle.signal_seen_at = Some(now);
            handle.exit_code = signal.exit_code;
        }

        let Some(signal_at) = handle.signal_seen_at else {
            if let Some(exit_code) = observation.exited {
                return Err(ChannelError::ExitedWithoutSignal {
                    exit_code,
                    partial: None,
                });
            }
            return self.check_deadline(handle, now).map(|_| None);
        };

        let stability = handle.gate.observe(observation.sink_size, now.into_std());
        trace!(invocation_id = %invocation.invocation_id, ?stability, "Sink observed");
        if let Stability::Stable { size } = stability {
            let bytes = self
                .backend
                .read_sink(invocation)
                .await
                .map_err(ChannelError::backend)?;
            debug!(
                invocation_id = %invocation.invocation_id,
                size,
                "Sink stable, output collected"
            );
            return Ok(Some(bytes));
        }

        let waited = now.saturating_duration_since(signal_at);
        if waited >= self.params.post_signal_timeout {
            return Err(ChannelError::StuckAfterSignal {
                waited,
                partial: None,
            });
        }
        self.check_deadline(handle, now).map(|_| None)
    }

    fn check_deadline(&self, handle: &ChannelHandle, now: Instant) -> Result<(), ChannelError> {
        let elapsed = now.saturating_duration_since(handle.started_at);
        if elapsed >= handle.timeout {
            return Err(ChannelError::Timeout {
                after: elapsed,
                partial: None,
            });
        }
        Ok(())
    }

    /// Stop the invocation and collect what it wrote so far.
    pub async fn cancel(&self, mut handle: ChannelHandle) -> Option<Vec<u8>> {
        if handle.closed {
            return None;
        }
        let partial = self.partial(&handle.invocation).await;
        self.close(&mut handle, true).await;
        partial
    }

    /// Poll until done, failed or cancelled.
    pub async fn run_to_completion(
        &self,
        mut handle: ChannelHandle,
        cancel: &CancellationToken,
    ) -> Result<ChannelOutcome, ChannelError> {
        loop {
            match self.poll(&mut handle).await {
                ChannelPoll::Done(bytes) => return Ok(ChannelOutcome::Output(bytes)),
                ChannelPoll::Errored(err) => return Err(err),
                ChannelPoll::NotDone => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(
                        invocation_id = %handle.invocation.invocation_id,
                        "Invocation cancelled"
                    );
                    let partial = self.cancel(handle).await;
                    return Ok(ChannelOutcome::Cancelled { partial });
                }
                _ = tokio::time::sleep(self.params.poll_interval) => {}
            }
        }
    }

    async fn partial(&self, invocation: &LaunchedInvocation) -> Option<Vec<u8>> {
        self.backend
            .read_sink(invocation)
            .await
            .ok()
            .filter(|bytes| !bytes.is_empty())
    }

    async fn close(&self, handle: &mut ChannelHandle, terminate: bool) {
        if terminate {
            self.backend.terminate(&handle.invocation).await;
        }
        self.backend.cleanup(&handle.invocation).await;
        handle.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::execution_backend::BackendError;
    use crate::testing::{Script, ScriptedBackend};

    fn params() -> ChannelParams {
        ChannelParams::default()
            .with_min_sink_bytes(100)
            .with_poll_interval(Duration::from_millis(100))
    }

    fn channel(
        backend: ScriptedBackend,
    ) -> (Arc<ScriptedBackend>, ExecutionChannel<ScriptedBackend>) {
        let backend = Arc::new(backend);
        (backend.clone(), ExecutionChannel::new(backend, params()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_after_signal_and_stable_sink() {
        let output = "x".repeat(300);
        let (backend, channel) =
            channel(ScriptedBackend::new().script("tool", Script::completes_with(&output)));

        let handle = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap();
        let outcome = channel
            .run_to_completion(handle, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ChannelOutcome::Output(output.into_bytes()));
        assert_eq!(backend.cleanup_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_waits_through_pause_shorter_than_window() {
        // Signal arrives early; the sink passes the floor, pauses for 1.5s
        // (under the 2s window) and then grows again.
        let first = "a".repeat(200);
        let second = "b".repeat(200);
        let script = Script::new()
            .write(100, &first)
            .signal(150, 0)
            .write(1700, &second)
            .exit(1800, Some(0));
        let (_, channel) = channel(ScriptedBackend::new().script("tool", script));

        let mut handle = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap();

        let collected = loop {
            match channel.poll(&mut handle).await {
                ChannelPoll::NotDone => tokio::time::sleep(Duration::from_millis(100)).await,
                ChannelPoll::Done(bytes) => break bytes,
                ChannelPoll::Errored(err) => panic!("unexpected error: {err}"),
            }
        };

        assert_eq!(collected.len(), 400);
        assert!(handle.elapsed() >= Duration::from_millis(3700));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_signal_is_rejected() {
        let script = Script::new()
            .write(100, &"x".repeat(300))
            .signal(150, 0)
            .signal(160, 0)
            .exit(170, Some(0));
        let (backend, channel) = channel(ScriptedBackend::new().script("tool", script));

        let handle = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap();
        let err = channel
            .run_to_completion(handle, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::DuplicateSignal { count: 2, .. }));
        assert_eq!(err.class(), cohort_domain::ErrorClass::Permanent);
        assert_eq!(err.partial_output().map(|p| p.len()), Some(300));
        assert_eq!(backend.cleanup_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_after_signal_keeps_partial() {
        // Sink stays below the floor, so it never counts as stable.
        let script = Script::new().write(100, "{\"issues\": [").signal(150, 0);
        let (_, channel) = channel(ScriptedBackend::new().script("tool", script));

        let handle = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap();
        let err = channel
            .run_to_completion(handle, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::StuckAfterSignal { .. }));
        assert_eq!(err.partial_output().as_deref(), Some("{\"issues\": ["));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_without_signal() {
        let script = Script::new().write(100, "partial").exit(200, Some(137));
        let (_, channel) = channel(ScriptedBackend::new().script("tool", script));

        let handle = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap();
        let err = channel
            .run_to_completion(handle, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ChannelError::ExitedWithoutSignal {
                exit_code: Some(137),
                partial: Some(b"partial".to_vec()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_terminates_and_cleans_up() {
        let script = Script::new().write(100, "still thinking");
        let (backend, channel) = channel(ScriptedBackend::new().script("tool", script));

        let handle = channel
            .start("w-1-a1", &InvocationSpec::new("tool"), Duration::from_secs(5))
            .await
            .unwrap();
        let err = channel
            .run_to_completion(handle, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::Timeout { .. }));
        assert_eq!(err.class(), cohort_domain::ErrorClass::Transient);
        assert_eq!(backend.terminations.lock().unwrap().len(), 1);
        assert_eq!(backend.cleanup_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_partial() {
        let script = Script::new().write(100, "half");
        let (backend, channel) = channel(ScriptedBackend::new().script("tool", script));
        let token = CancellationToken::new();

        let handle = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let outcome = channel.run_to_completion(handle, &token).await.unwrap();

        assert_eq!(
            outcome,
            ChannelOutcome::Cancelled {
                partial: Some(b"half".to_vec())
            }
        );
        assert_eq!(backend.cleanup_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_is_classified() {
        let backend = ScriptedBackend::new().script(
            "tool",
            Script::launch_fails(BackendError::CommandNotFound("tool".into())),
        );
        let (_, channel) = channel(backend);

        let err = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), cohort_domain::ErrorClass::Permanent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_after_close_is_an_error() {
        let (_, channel) = channel(
            ScriptedBackend::new().script("tool", Script::completes_with(&"x".repeat(300))),
        );
        let mut handle = channel
            .start_default("w-1-a1", &InvocationSpec::new("tool"))
            .await
            .unwrap();
        while channel.poll(&mut handle).await == ChannelPoll::NotDone {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(handle.is_closed());
        assert_eq!(
            channel.poll(&mut handle).await,
            ChannelPoll::Errored(ChannelError::Closed)
        );
    }
}
