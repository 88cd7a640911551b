//! External tool invocation.
//!
//! Tools are always started with an explicit argument list, never through a
//! shell. Credentials go through [`Invocation::env`] so they stay out of the
//! process table and out of [`Invocation`]'s `Display` output.

use std::fmt;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A program plus its arguments and extra environment.
#[derive(Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Names of the extra environment variables (values are not exposed).
    pub fn env_keys(&self) -> impl Iterator<Item = &str> {
        self.envs.iter().map(|(k, _)| k.as_str())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn_with(&self, stdout: Stdio, stderr: Stdio) -> Result<Child, ProcessError> {
        self.command()
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    /// Spawn with stdout piped to the caller and stderr captured.
    pub fn spawn_piped(&self) -> Result<Child, ProcessError> {
        self.spawn_with(Stdio::piped(), Stdio::piped())
    }

    pub(crate) fn failure(&self, output: &Output) -> ProcessError {
        ProcessError::Failed {
            command: self.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("envs", &self.env_keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Run to completion, capturing output. A non-zero exit is an error.
pub fn run(invocation: &Invocation) -> Result<Output, ProcessError> {
    let output = invocation
        .spawn_with(Stdio::piped(), Stdio::piped())?
        .wait_with_output()?;
    if !output.status.success() {
        return Err(invocation.failure(&output));
    }
    Ok(output)
}

/// Run to completion and report only whether it exited successfully.
pub fn succeeds(invocation: &Invocation) -> Result<bool, ProcessError> {
    let status = invocation
        .spawn_with(Stdio::null(), Stdio::null())?
        .wait()?;
    Ok(status.success())
}

/// Outcome of [`run_with_soft_timeout`].
#[derive(Debug)]
pub enum SoftWait {
    Finished(ExitStatus),
    /// The deadline passed; the process was left running.
    StillRunning,
}

/// Run with output streamed to the parent's stdout/stderr, waiting at most
/// `timeout`. Unlike a hard timeout, an overrunning process is not killed.
pub fn run_with_soft_timeout(
    invocation: &Invocation,
    timeout: Duration,
) -> Result<SoftWait, ProcessError> {
    let mut child = invocation.spawn_with(Stdio::inherit(), Stdio::inherit())?;
    match child.wait_timeout(timeout)? {
        Some(status) => Ok(SoftWait::Finished(status)),
        None => Ok(SoftWait::StillRunning),
    }
}
