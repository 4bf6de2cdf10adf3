//! In-crate fakes for the ports, shared by the use case tests.

use crate::ports::execution_backend::{
    BackendError, ExecutionBackend, LaunchedInvocation, Observation,
};
use crate::ports::ledger::{LedgerError, LedgerStore, MemoryLedger};
use async_trait::async_trait;
use cohort_domain::{InvocationSpec, LedgerEntry, completion_marker};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Step {
    Write(String),
    Signal(i32),
    Exit(Option<i32>),
}

/// Timeline of what an invocation does, relative to its launch.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<(Duration, Step)>,
    launch_error: Option<BackendError>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `output`, signals success and exits.
    pub fn completes_with(output: &str) -> Self {
        Self::new()
            .write(100, output)
            .signal(150, 0)
            .exit(160, Some(0))
    }

    pub fn launch_fails(err: BackendError) -> Self {
        Self {
            launch_error: Some(err),
            ..Self::default()
        }
    }

    pub fn write(mut self, at_ms: u64, chunk: &str) -> Self {
        self.steps
            .push((Duration::from_millis(at_ms), Step::Write(chunk.to_string())));
        self
    }

    pub fn signal(mut self, at_ms: u64, code: i32) -> Self {
        self.steps
            .push((Duration::from_millis(at_ms), Step::Signal(code)));
        self
    }

    pub fn exit(mut self, at_ms: u64, code: Option<i32>) -> Self {
        self.steps.push((Duration::from_millis(at_ms), Step::Exit(code)));
        self
    }

    fn state_at(&self, elapsed: Duration, marker: &str) -> (Option<String>, Observation) {
        let mut sink: Option<String> = None;
        let mut observation = Observation::default();
        for (at, step) in &self.steps {
            if *at > elapsed {
                continue;
            }
            match step {
                Step::Write(chunk) => sink.get_or_insert_with(String::new).push_str(chunk),
                Step::Signal(code) => observation
                    .signal_stream
                    .push_str(&format!("{marker} {code}\n")),
                Step::Exit(code) => observation.exited = Some(*code),
            }
        }
        observation.sink_size = sink.as_ref().map(|s| s.len() as u64);
        (sink, observation)
    }
}

struct Running {
    script: Script,
    launched_at: Instant,
}

/// Execution backend that replays scripts keyed by program name.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    running: Mutex<HashMap<String, Running>>,
    pub launches: AtomicUsize,
    pub cleanups: Mutex<Vec<String>>,
    pub terminations: Mutex<Vec<String>>,
    pub resets: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `script` for the next launch of `program`. The last queued
    /// script repeats for further launches.
    pub fn script(self, program: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.lock().unwrap().len()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    fn with_running<T>(
        &self,
        invocation: &LaunchedInvocation,
        f: impl FnOnce(&Running, Duration) -> T,
    ) -> Result<T, BackendError> {
        let running = self.running.lock().unwrap();
        let entry = running.get(&invocation.invocation_id).ok_or_else(|| {
            BackendError::Io(format!("unknown invocation {}", invocation.invocation_id))
        })?;
        let elapsed = Instant::now().saturating_duration_since(entry.launched_at);
        Ok(f(entry, elapsed))
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn launch(
        &self,
        invocation_id: &str,
        spec: &InvocationSpec,
    ) -> Result<LaunchedInvocation, BackendError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts
                .get_mut(&spec.program)
                .ok_or_else(|| BackendError::CommandNotFound(spec.program.clone()))?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        }
        .ok_or_else(|| BackendError::CommandNotFound(spec.program.clone()))?;

        if let Some(err) = script.launch_error.clone() {
            return Err(err);
        }

        self.running.lock().unwrap().insert(
            invocation_id.to_string(),
            Running {
                script,
                launched_at: Instant::now(),
            },
        );
        Ok(LaunchedInvocation {
            invocation_id: invocation_id.to_string(),
            marker: completion_marker(invocation_id),
            sink_path: PathBuf::from(format!("/tmp/{invocation_id}.out")),
            wrapped: false,
        })
    }

    async fn observe(&self, invocation: &LaunchedInvocation) -> Result<Observation, BackendError> {
        self.with_running(invocation, |r, elapsed| {
            r.script.state_at(elapsed, &invocation.marker).1
        })
    }

    async fn read_sink(&self, invocation: &LaunchedInvocation) -> Result<Vec<u8>, BackendError> {
        self.with_running(invocation, |r, elapsed| {
            r.script.state_at(elapsed, &invocation.marker).0
        })?
        .map(String::into_bytes)
        .ok_or_else(|| BackendError::SinkUnavailable(invocation.sink_path.display().to_string()))
    }

    async fn terminate(&self, invocation: &LaunchedInvocation) {
        self.terminations
            .lock()
            .unwrap()
            .push(invocation.invocation_id.clone());
    }

    async fn cleanup(&self, invocation: &LaunchedInvocation) {
        self.cleanups
            .lock()
            .unwrap()
            .push(invocation.invocation_id.clone());
    }

    async fn reset(&self, invocation_id: &str) -> Result<(), BackendError> {
        self.resets.lock().unwrap().push(invocation_id.to_string());
        Ok(())
    }
}

/// Ledger whose appends can be switched to fail or stall.
#[derive(Default)]
pub struct FlakyLedger {
    inner: MemoryLedger,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FlakyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl LedgerStore for FlakyLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Io("disk full".to_string()));
        }
        self.inner.append(entry).await
    }

    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.load_all().await
    }
}

/// One reported issue as a worker would emit it.
pub fn issue(id: &str, answer: &str, magnitude: &str, resolvability: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "question": format!("How should {id} be handled?"),
        "answer": answer,
        "magnitude": magnitude,
        "resolvability": resolvability,
        "reasoning": "The surrounding code already handles this case consistently, so the smallest change is to follow the existing convention used by the neighbouring modules.",
    })
}

/// A payload under `field` that passes the default validation rules.
pub fn payload(field: &str, items: Vec<serde_json::Value>) -> String {
    let payload = serde_json::json!({ field: items, "summary": "x".repeat(400) });
    serde_json::to_string_pretty(&payload).unwrap()
}

/// A valid `issues` payload of minor, auto-fixable issues.
pub fn valid_payload(issues: &[(&str, &str, &str)]) -> String {
    let items = issues
        .iter()
        .map(|(id, _question, answer)| issue(id, answer, "minor", "auto-fix"))
        .collect();
    payload("issues", items)
}

/// Pads `text` past the channel's default minimum sink size.
pub fn padded(text: &str) -> String {
    format!("{text}\n{}", " ".repeat(1200))
}
