//! Shell invocation plans with exactly one completion signal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What to run for one worker attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Prompt text appended as the final argument.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl InvocationSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Bytes that would be inlined into a command line.
    pub fn inline_len(&self) -> usize {
        self.program.len()
            + self.args.iter().map(String::len).sum::<usize>()
            + self.input.as_ref().map_or(0, String::len)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("empty program")]
    EmptyProgram,

    #[error("argument cannot be shell-quoted: {0}")]
    Unquotable(String),
}

/// A command line ready for `sh -c`, plus any side files it depends on.
///
/// Small invocations run directly and the plan appends the signal. Large ones
/// go through a wrapper script that emits the signal itself, and the command
/// line only invokes the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationPlan {
    Direct {
        command_line: String,
        marker: String,
    },
    Wrapped {
        command_line: String,
        script_path: PathBuf,
        script: String,
        input_path: Option<PathBuf>,
        marker: String,
    },
}

impl InvocationPlan {
    pub fn build(
        invocation_id: &str,
        spec: &InvocationSpec,
        threshold: usize,
        sink: &Path,
        scratch_dir: &Path,
    ) -> Result<Self, PlanError> {
        if spec.program.trim().is_empty() {
            return Err(PlanError::EmptyProgram);
        }

        let marker = completion_marker(invocation_id);
        let signal = format!(
            "__cohort_rc=$?; printf '%s %s\\n' {} \"$__cohort_rc\"",
            quote(&marker)?
        );
        let sink = quote(&sink.to_string_lossy())?;

        let mut words = vec![quote(&spec.program)?];
        for arg in &spec.args {
            words.push(quote(arg)?);
        }

        if spec.inline_len() <= threshold {
            if let Some(input) = &spec.input {
                words.push(quote(input)?);
            }
            let command_line = format!("{} > {sink} 2>&1; {signal}", words.join(" "));
            return Ok(InvocationPlan::Direct {
                command_line,
                marker,
            });
        }

        let stem = invocation_stem(invocation_id);
        let script_path = scratch_dir.join(format!("cohort-{stem}.sh"));
        let input_path = spec
            .input
            .as_ref()
            .map(|_| scratch_dir.join(format!("cohort-{stem}.input")));

        if let Some(path) = &input_path {
            words.push(format!("\"$(cat {})\"", quote(&path.to_string_lossy())?));
        }

        let script = format!(
            "#!/bin/sh\n{} > {sink} 2>&1\n{signal}\n",
            words.join(" ")
        );
        let command_line = format!("sh {}", quote(&script_path.to_string_lossy())?);

        Ok(InvocationPlan::Wrapped {
            command_line,
            script_path,
            script,
            input_path,
            marker,
        })
    }

    pub fn command_line(&self) -> &str {
        match self {
            InvocationPlan::Direct { command_line, .. }
            | InvocationPlan::Wrapped { command_line, .. } => command_line,
        }
    }

    pub fn marker(&self) -> &str {
        match self {
            InvocationPlan::Direct { marker, .. } | InvocationPlan::Wrapped { marker, .. } => {
                marker
            }
        }
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self, InvocationPlan::Wrapped { .. })
    }

    /// How many places in the plan emit the completion marker.
    pub fn marker_count(&self) -> usize {
        match self {
            InvocationPlan::Direct {
                command_line,
                marker,
            } => command_line.matches(marker.as_str()).count(),
            InvocationPlan::Wrapped {
                command_line,
                script,
                marker,
                ..
            } => {
                command_line.matches(marker.as_str()).count()
                    + script.matches(marker.as_str()).count()
            }
        }
    }
}

/// The marker line a finished invocation prints on its signal stream.
pub fn completion_marker(invocation_id: &str) -> String {
    format!("___COHORT_DONE_{}___", invocation_stem(invocation_id))
}

/// File-name and shell safe form of an invocation id.
pub fn invocation_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn quote(s: &str) -> Result<String, PlanError> {
    shlex::try_quote(s)
        .map(|q| q.into_owned())
        .map_err(|_| PlanError::Unquotable(s.chars().take(40).collect()))
}
