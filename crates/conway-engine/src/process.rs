//! External program runner.
//!
//! Every way a run can end is a variant of [`ProcessOutcome`]; nothing here
//! returns an error or panics. The child is killed if the run times out.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// What to run and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Directory to run in; `None` inherits the caller's.
    pub work_dir: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            work_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// A copy of this spec with `extra` appended to the argument list.
    pub fn with_args<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = self.clone();
        spec.args.extend(extra.into_iter().map(Into::into));
        spec
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { stdout: String, stderr: String },
    NonZeroExit {
        /// `None` when the child was killed by a signal.
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    SpawnFailed { error: String },
    TimedOut { after: Duration },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Completed { .. })
    }

    /// Text an engine sends back for this outcome: stdout on success,
    /// otherwise an `ERROR:`-prefixed description.
    pub fn into_reply(self) -> String {
        match self {
            ProcessOutcome::Completed { stdout, .. } => stdout,
            ProcessOutcome::NonZeroExit { code, stdout, stderr } => {
                let detail = if stderr.trim().is_empty() { stdout } else { stderr };
                match code {
                    Some(code) => format!("ERROR: exit code {code}: {}", detail.trim_end()),
                    None => format!("ERROR: terminated by signal: {}", detail.trim_end()),
                }
            }
            ProcessOutcome::SpawnFailed { error } => format!("ERROR: {error}"),
            ProcessOutcome::TimedOut { after } => {
                format!("ERROR: timed out after {}s", after.as_secs())
            }
        }
    }
}

/// Run `spec` to completion, capturing stdout and stderr.
pub async fn run_process(spec: &ProcessSpec) -> ProcessOutcome {
    let mut command = tokio::process::Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.work_dir {
        command.current_dir(dir);
    }

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ProcessOutcome::SpawnFailed {
                error: format!("failed to spawn '{}': {}", spec.program, e),
            }
        }
    };

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return ProcessOutcome::SpawnFailed {
                error: format!("failed to collect output of '{}': {}", spec.program, e),
            }
        }
        Err(_) => return ProcessOutcome::TimedOut { after: spec.timeout },
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if output.status.success() {
        ProcessOutcome::Completed { stdout, stderr }
    } else {
        ProcessOutcome::NonZeroExit {
            code: output.status.code(),
            stdout,
            stderr,
        }
    }
}
