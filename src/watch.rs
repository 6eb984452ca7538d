// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Editor process watching.
//!
//! A sync cycle hands the vault over to the editor, and only takes it back
//! once the editor is gone. The editor is launched detached, so the only way
//! to know it is gone is to look for its process by name every so often.
//!
//! Editors commonly re-exec themselves or hand off to an already running
//! instance, so the process we spawned is not a reliable handle. Matching by
//! name sidesteps that, at the cost of also waiting on an instance the user
//! started by hand.

use crate::exec::{CommandOutput, CommandSpec, Executor, LaunchFailure};

use std::{path::PathBuf, time::Duration};
use tokio::{
    sync::watch,
    time::{sleep, Instant},
};
use tracing::{debug, instrument};

/// Default interval between liveness checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time allowed for a launched editor to show up.
pub const STARTUP_GRACE: Duration = Duration::from_secs(10);

/// Process name of the default editor on this platform.
#[cfg(target_os = "windows")]
pub const DEFAULT_PROCESS_NAME: &str = "Obsidian.exe";
#[cfg(target_os = "macos")]
pub const DEFAULT_PROCESS_NAME: &str = "Obsidian";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_PROCESS_NAME: &str = "obsidian";

/// Editor to launch, and the process name to watch for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorCommand {
    pub path: PathBuf,
    pub process_name: String,
}

impl EditorCommand {
    /// Construct editor command, watching for target process name or the
    /// platform default.
    pub fn new(path: impl Into<PathBuf>, process_name: Option<&str>) -> Self {
        Self {
            path: path.into(),
            process_name: process_name.unwrap_or(DEFAULT_PROCESS_NAME).to_string(),
        }
    }
}

/// Timing knobs of the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub startup_grace: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            startup_grace: STARTUP_GRACE,
        }
    }
}

/// Construct a linked cancel handle and cancellation token.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

/// Requests cancellation.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Token that is never cancelled.
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Never resolves if the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Launch the editor and wait for it to close.
#[derive(Debug)]
pub struct ProcessWatcher<'a, E>
where
    E: Executor,
{
    executor: &'a E,
    options: WatchOptions,
}

impl<'a, E> ProcessWatcher<'a, E>
where
    E: Executor,
{
    pub fn new(executor: &'a E, options: WatchOptions) -> Self {
        Self { executor, options }
    }

    /// Launch the editor detached, then block until its process is gone.
    ///
    /// There is no timeout: the user decides when editing is done. Only
    /// cancellation ends the wait early.
    ///
    /// # Errors
    ///
    /// - Return [`WatchError::Launch`] if the editor or the process listing
    ///   tool cannot be started.
    /// - Return [`WatchError::Cancelled`] if cancellation was requested.
    #[instrument(skip(self, editor, cancel), fields(editor = ?editor.path), level = "debug")]
    pub async fn launch_and_wait(
        &self,
        editor: &EditorCommand,
        cancel: &Cancellation,
    ) -> Result<()> {
        self.executor
            .spawn_detached(&CommandSpec::new(editor.path.as_os_str()))?;

        // INVARIANT: A slow starting editor must not look like one that
        // already closed.
        let deadline = Instant::now() + self.options.startup_grace;
        let mut seen = self.is_running(&editor.process_name).await?;
        while !seen && Instant::now() < deadline {
            self.pause(cancel).await?;
            seen = self.is_running(&editor.process_name).await?;
        }
        if !seen {
            if cancel.is_cancelled() {
                return Err(WatchError::Cancelled);
            }
            debug!("{} never showed up, assuming it closed", editor.process_name);
            return Ok(());
        }

        while self.is_running(&editor.process_name).await? {
            self.pause(cancel).await?;
        }
        debug!("{} closed", editor.process_name);

        Ok(())
    }

    /// Check whether a process with target name is alive.
    ///
    /// # Errors
    ///
    /// - Return [`WatchError::Launch`] if the listing tool cannot be started.
    pub async fn is_running(&self, process_name: &str) -> Result<bool> {
        let output = self.executor.run(&liveness_check(process_name)).await?;
        Ok(listing_says_running(&output, process_name))
    }

    async fn pause(&self, cancel: &Cancellation) -> Result<()> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WatchError::Cancelled),
            () = sleep(self.options.poll_interval) => Ok(()),
        }
    }
}

#[cfg(target_os = "windows")]
fn liveness_check(process_name: &str) -> CommandSpec {
    CommandSpec::new("tasklist").args([
        "/FI".to_string(),
        format!("IMAGENAME eq {process_name}"),
        "/NH".to_string(),
        "/FO".to_string(),
        "CSV".to_string(),
    ])
}

#[cfg(not(target_os = "windows"))]
fn liveness_check(process_name: &str) -> CommandSpec {
    CommandSpec::new("pgrep").args(["-x", "-i", process_name])
}

#[cfg(target_os = "windows")]
fn listing_says_running(output: &CommandOutput, process_name: &str) -> bool {
    output.success() && output.stdout.to_lowercase().contains(&process_name.to_lowercase())
}

#[cfg(not(target_os = "windows"))]
fn listing_says_running(output: &CommandOutput, _process_name: &str) -> bool {
    output.success()
}

/// Process watching error types.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Editor or listing tool cannot be started.
    #[error(transparent)]
    Launch(#[from] LaunchFailure),

    /// Wait was cancelled.
    #[error("waiting for the editor was cancelled")]
    Cancelled,
}

/// Friendly result alias :3
pub type Result<T, E = WatchError> = std::result::Result<T, E>;
