// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Everything vaultsync does to the outside world, it does by running
//! external programs: git, the ssh tool suite, process listing tools, and the
//! editor itself. This module provides the one seam through which all of
//! those calls pass.
//!
//! A command that runs and exits with a nonzero status is __not__ an error
//! here. Callers receive the captured output and status, and decide what it
//! means. Only a command that cannot be started at all produces an error.

use std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Exit status reported when a command exceeds its timeout.
pub const TIMEOUT_STATUS: i32 = 124;

/// Exit status reported when a command was terminated without a status.
pub const SIGNAL_STATUS: i32 = -1;

/// Description of a command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: BTreeMap<OsString, OsString>,
    timeout: Option<Duration>,
}

impl CommandSpec {
    /// Construct new command for target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().map(OsString::as_os_str)
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(&self.envs);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        command
    }
}

impl Display for CommandSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program.to_string_lossy().as_ref())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    /// Construct output of a command that exited with status zero.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: 0,
        }
    }

    /// Construct output of a command that exited with a nonzero status.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            status,
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Standard output and standard error joined by a newline.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Case insensitive search through both output streams.
    pub fn mentions(&self, needle: impl AsRef<str>) -> bool {
        let needle = needle.as_ref().to_lowercase();
        self.stdout.to_lowercase().contains(&needle) || self.stderr.to_lowercase().contains(&needle)
    }

    /// Most useful text to show a user when the command failed.
    pub fn reason(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Layer of indirection for running external commands.
pub trait Executor: Send + Sync + 'static {
    /// Run command to completion and capture its output.
    fn run(&self, spec: &CommandSpec) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Start command without waiting for it, or capturing its output.
    fn spawn_detached(&self, spec: &CommandSpec) -> Result<()>;
}

/// Run commands as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    #[instrument(skip(self, spec), fields(command = %spec), level = "debug")]
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = spec.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| LaunchFailure {
            command: spec.to_string(),
            source,
        })?;

        let waited = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // INVARIANT: Child is killed when its future is dropped.
                    debug!("command timed out after {}s", limit.as_secs());
                    return Ok(CommandOutput::failed(
                        TIMEOUT_STATUS,
                        format!("command timed out after {}s", limit.as_secs()),
                    ));
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| LaunchFailure {
            command: spec.to_string(),
            source,
        })?;

        let result = CommandOutput {
            stdout: chomp(&output.stdout),
            stderr: chomp(&output.stderr),
            status: output.status.code().unwrap_or(SIGNAL_STATUS),
        };
        debug!(status = result.status, "command finished");

        Ok(result)
    }

    #[instrument(skip(self, spec), fields(command = %spec), level = "debug")]
    fn spawn_detached(&self, spec: &CommandSpec) -> Result<()> {
        let mut command = spec.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        // INVARIANT: Interrupting vaultsync must never reach the detached
        // process through a shared process group.
        #[cfg(unix)]
        command.process_group(0);

        // INVARIANT: Dropped children are reaped by the runtime, so an editor
        // that exits never lingers as a zombie matching the process name.
        let _child = command.spawn().map_err(|source| LaunchFailure {
            command: spec.to_string(),
            source,
        })?;

        Ok(())
    }
}

fn chomp(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

/// Command could not be started at all.
#[derive(Debug, thiserror::Error)]
#[error("failed to launch {command:?}")]
pub struct LaunchFailure {
    pub command: String,

    #[source]
    pub source: std::io::Error,
}

/// Friendly result alias :3
pub type Result<T, E = LaunchFailure> = std::result::Result<T, E>;
