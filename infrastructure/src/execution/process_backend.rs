//! Local process execution backend.
//!
//! Every invocation runs as `sh -c <command line>` built by
//! [`InvocationPlan`]. The worker command writes into a sink file in the
//! scratch directory; the launcher's stdout carries only the completion
//! marker, which a background task accumulates as the signal stream.

use async_trait::async_trait;
use cohort_application::{BackendError, ExecutionBackend, LaunchedInvocation, Observation};
use cohort_domain::{InvocationPlan, InvocationSpec, PlanError, invocation_stem};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a terminated launcher gets before it is killed outright.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Upper bound for reading the signal stream tail after the launcher exits.
const READER_DRAIN: Duration = Duration::from_secs(1);

struct RunningInvocation {
    child: Child,
    signal: Arc<Mutex<String>>,
    reader: Option<JoinHandle<()>>,
    exited: Option<Option<i32>>,
    /// Wrapper script and input file, if any.
    side_files: Vec<PathBuf>,
}

/// Backend that runs worker commands as local processes.
pub struct ProcessBackend {
    scratch_dir: PathBuf,
    large_input_threshold: usize,
    running: AsyncMutex<HashMap<String, RunningInvocation>>,
}

impl ProcessBackend {
    /// Create a backend that keeps sinks and wrapper scripts in `scratch_dir`.
    pub fn new(
        scratch_dir: impl Into<PathBuf>,
        large_input_threshold: usize,
    ) -> Result<Self, BackendError> {
        let scratch_dir = scratch_dir.into();
        std::fs::create_dir_all(&scratch_dir).map_err(|e| {
            BackendError::Io(format!(
                "could not create scratch directory {}: {}",
                scratch_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            scratch_dir,
            large_input_threshold,
            running: AsyncMutex::new(HashMap::new()),
        })
    }

    /// Backend using `$TMPDIR/cohort` as scratch directory.
    pub fn in_temp_dir(large_input_threshold: usize) -> Result<Self, BackendError> {
        Self::new(std::env::temp_dir().join("cohort"), large_input_threshold)
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    fn sink_path(&self, invocation_id: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("cohort-{}.out", invocation_stem(invocation_id)))
    }

    /// Every file an invocation with this id could leave behind.
    fn resource_paths(&self, invocation_id: &str) -> [PathBuf; 3] {
        let stem = invocation_stem(invocation_id);
        [
            self.sink_path(invocation_id),
            self.scratch_dir.join(format!("cohort-{stem}.sh")),
            self.scratch_dir.join(format!("cohort-{stem}.input")),
        ]
    }

    async fn remove_stale(&self, invocation_id: &str) {
        for path in self.resource_paths(invocation_id) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                warn!(
                    invocation_id,
                    path = %path.display(),
                    "Removing stale file from a previous run"
                );
                remove_quietly(&path).await;
            }
        }
    }

    async fn write_side_files(
        plan: &InvocationPlan,
        spec: &InvocationSpec,
    ) -> Result<Vec<PathBuf>, BackendError> {
        let InvocationPlan::Wrapped {
            script_path,
            script,
            input_path,
            ..
        } = plan
        else {
            return Ok(Vec::new());
        };

        let io = |e: std::io::Error| BackendError::Io(e.to_string());
        let mut written = Vec::new();
        if let (Some(path), Some(input)) = (input_path, &spec.input) {
            tokio::fs::write(path, input).await.map_err(io)?;
            written.push(path.clone());
        }
        tokio::fs::write(script_path, script).await.map_err(io)?;
        written.push(script_path.clone());
        Ok(written)
    }

    fn command(plan: &InvocationPlan, spec: &InvocationSpec) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(plan.command_line())
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        // Own process group so terminate reaches the worker CLI, not just sh.
        #[cfg(unix)]
        cmd.process_group(0);

        // Linux: request kernel to send SIGTERM to the launcher when we die.
        // This catches cases where Drop doesn't run (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        cmd
    }

    async fn stop(invocation_id: &str, running: &mut RunningInvocation) {
        if running.exited.is_some() {
            return;
        }

        #[cfg(target_os = "linux")]
        if let Some(pid) = running.child.id() {
            // SAFETY: signals the process group created for this launcher.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGTERM);
            }
        }

        let status = match tokio::time::timeout(TERMINATE_GRACE, running.child.wait()).await {
            Ok(status) => status.ok(),
            Err(_) => {
                debug!(invocation_id, "Launcher ignored SIGTERM, killing");
                let _ = running.child.kill().await;
                running.child.try_wait().ok().flatten()
            }
        };
        running.exited = Some(status.and_then(|s| s.code()));
        info!(invocation_id, "Invocation terminated");
    }
}

#[async_trait]
impl ExecutionBackend for ProcessBackend {
    async fn launch(
        &self,
        invocation_id: &str,
        spec: &InvocationSpec,
    ) -> Result<LaunchedInvocation, BackendError> {
        if self.running.lock().await.contains_key(invocation_id) {
            return Err(BackendError::StaleResource(format!(
                "invocation {} is already running",
                invocation_id
            )));
        }

        if spec.program.trim().is_empty() {
            return Err(BackendError::InvalidInvocation(
                PlanError::EmptyProgram.to_string(),
            ));
        }
        which::which(&spec.program)
            .map_err(|_| BackendError::CommandNotFound(spec.program.clone()))?;

        if let Some(dir) = &spec.working_dir
            && !dir.is_dir()
        {
            return Err(BackendError::InvalidInvocation(format!(
                "working directory {} does not exist",
                dir.display()
            )));
        }

        self.remove_stale(invocation_id).await;

        let sink_path = self.sink_path(invocation_id);
        let plan = InvocationPlan::build(
            invocation_id,
            spec,
            self.large_input_threshold,
            &sink_path,
            &self.scratch_dir,
        )
        .map_err(|e: PlanError| BackendError::InvalidInvocation(e.to_string()))?;
        let side_files = Self::write_side_files(&plan, spec).await?;

        debug!(
            invocation_id,
            program = %spec.program,
            wrapped = plan.is_wrapped(),
            "Launching invocation"
        );

        let mut child = Self::command(&plan, spec)
            .spawn()
            .map_err(|e| BackendError::Io(format!("failed to spawn {}: {}", spec.program, e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Io("failed to capture launcher stdout".to_string()))?;

        let signal = Arc::new(Mutex::new(String::new()));
        let signal_bg = Arc::clone(&signal);
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => signal_bg
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push_str(&String::from_utf8_lossy(&buf[..n])),
                }
            }
        });

        self.running.lock().await.insert(
            invocation_id.to_string(),
            RunningInvocation {
                child,
                signal,
                reader: Some(reader),
                exited: None,
                side_files,
            },
        );

        Ok(LaunchedInvocation {
            invocation_id: invocation_id.to_string(),
            marker: plan.marker().to_string(),
            sink_path,
            wrapped: plan.is_wrapped(),
        })
    }

    async fn observe(&self, invocation: &LaunchedInvocation) -> Result<Observation, BackendError> {
        let sink_size = tokio::fs::metadata(&invocation.sink_path)
            .await
            .ok()
            .map(|m| m.len());

        let mut running = self.running.lock().await;
        let entry = running
            .get_mut(&invocation.invocation_id)
            .ok_or_else(|| {
                BackendError::InvalidInvocation(format!(
                    "unknown invocation {}",
                    invocation.invocation_id
                ))
            })?;

        if entry.exited.is_none()
            && let Some(status) = entry
                .child
                .try_wait()
                .map_err(|e| BackendError::Io(e.to_string()))?
        {
            // The launcher is gone; wait for its last stdout bytes.
            if let Some(reader) = entry.reader.take() {
                let _ = tokio::time::timeout(READER_DRAIN, reader).await;
            }
            entry.exited = Some(status.code());
            debug!(
                invocation_id = %invocation.invocation_id,
                exit_code = ?status.code(),
                "Launcher exited"
            );
        }

        let signal_stream = entry
            .signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Ok(Observation {
            sink_size,
            signal_stream,
            exited: entry.exited,
        })
    }

    async fn read_sink(&self, invocation: &LaunchedInvocation) -> Result<Vec<u8>, BackendError> {
        tokio::fs::read(&invocation.sink_path).await.map_err(|e| {
            BackendError::SinkUnavailable(format!("{}: {}", invocation.sink_path.display(), e))
        })
    }

    async fn terminate(&self, invocation: &LaunchedInvocation) {
        let mut running = self.running.lock().await;
        if let Some(entry) = running.get_mut(&invocation.invocation_id) {
            Self::stop(&invocation.invocation_id, entry).await;
        }
    }

    async fn cleanup(&self, invocation: &LaunchedInvocation) {
        let removed = self.running.lock().await.remove(&invocation.invocation_id);
        if let Some(mut entry) = removed {
            Self::stop(&invocation.invocation_id, &mut entry).await;
            if let Some(reader) = entry.reader.take() {
                reader.abort();
            }
            for path in &entry.side_files {
                remove_quietly(path).await;
            }
        }
        remove_quietly(&invocation.sink_path).await;
    }

    async fn reset(&self, invocation_id: &str) -> Result<(), BackendError> {
        let removed = self.running.lock().await.remove(invocation_id);
        if let Some(mut entry) = removed {
            Self::stop(invocation_id, &mut entry).await;
        }
        for path in self.resource_paths(invocation_id) {
            remove_quietly(&path).await;
        }
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        info!(invocation_id, "Backend state reset");
        Ok(())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Could not remove file");
    }
}
