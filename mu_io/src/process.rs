//! External command execution.
//!
//! Package management (`opkg`), the diagnostics probes and command-based
//! service reloads are the only things this crate shells out for; they go
//! through [`ProcessRunner`] so they can be mocked.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::debug;

use mu_core::ProcessError;

/// Exit status and captured output of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` and wait at most `timeout` for it to exit.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError>;

    /// Resolve `program` against `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Runs commands with tokio. The child is killed if the timeout elapses.
#[derive(Clone, Debug, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        debug!(program, ?args, "running command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ProcessError::Timeout {
                program: program.to_string(),
                after: timeout,
            })?
            .map_err(|e| ProcessError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        find_in_path(program, env::var_os("PATH").as_deref())
    }
}

fn find_in_path(program: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    if program.contains('/') {
        let candidate = Path::new(program);
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
