// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync cycle orchestration.
//!
//! One sync cycle wraps one editing session:
//!
//! 1. Make sure the vault has a baseline commit.
//! 2. Make sure the remote carries the default branch.
//! 3. Stash uncommitted local edits.
//! 4. Pull remote changes, rebasing local commits on top.
//! 5. Reapply the stash.
//! 6. Launch the editor, and wait for it to close.
//! 7. Commit whatever changed.
//! 8. Push the commit, if there is one.
//!
//! Any failing step ends the cycle. Nothing is retried within a cycle, and
//! nothing is resumed: the next cycle starts from step one.
//!
//! # Stash Discipline
//!
//! Losing stashed edits is the worst thing a cycle could do. Once a stash has
//! been pushed, the cycle always attempts exactly one reapply before it ends,
//! whether the pull worked or not. A reapply that conflicts leaves the stash
//! in place for manual resolution.

use crate::{
    bootstrap::{ensure_placeholder_content, BootstrapError},
    config::{Config, ConfigError},
    event::EventSink,
    exec::{CommandOutput, Executor, LaunchFailure},
    git::{Git, Outcome, BRANCH, REMOTE},
    watch::{Cancellation, EditorCommand, ProcessWatcher, WatchError, WatchOptions},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Message of the commit made when a vault has none.
pub const BASELINE_COMMIT_MESSAGE: &str = "Initial commit (auto-sync)";

/// Message of the commit recording an editing session.
pub const SYNC_COMMIT_MESSAGE: &str = "Auto sync commit";

/// Message attached to the stash made before pulling.
pub const STASH_MESSAGE: &str = "vaultsync: local changes before pull";

/// Steps of a sync cycle that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Baseline,
    RemoteBranch,
    Stash,
    Pull,
    Reapply,
    Commit,
    Push,
}

impl Display for Step {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Baseline => "initial commit",
            Self::RemoteBranch => "remote branch check",
            Self::Stash => "stash",
            Self::Pull => "pull",
            Self::Reapply => "stash reapply",
            Self::Commit => "commit",
            Self::Push => "push",
        })
    }
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Local edits were stashed before pulling.
    pub stashed: bool,

    /// A reapply of the stash was attempted.
    pub reapplied: bool,

    /// Editing session produced a commit.
    pub committed: bool,

    /// Commit reached the remote.
    pub pushed: bool,

    /// Files changed by the pull, as `STATUS path`.
    pub pulled_changes: Vec<String>,

    /// Files changed by the commit, as `STATUS path`.
    pub committed_changes: Vec<String>,
}

/// Run sync cycles for one vault.
#[derive(Debug)]
pub struct Orchestrator<E>
where
    E: Executor,
{
    executor: E,
    sink: EventSink,
    vault: PathBuf,
    editor: EditorCommand,
    watch: WatchOptions,
    cancel: Cancellation,
}

impl<E> Orchestrator<E>
where
    E: Executor,
{
    /// Construct new orchestrator.
    pub fn new(
        executor: E,
        sink: EventSink,
        vault: impl Into<PathBuf>,
        editor: EditorCommand,
    ) -> Self {
        Self {
            executor,
            sink,
            vault: vault.into(),
            editor,
            watch: WatchOptions::default(),
            cancel: Cancellation::never(),
        }
    }

    /// Construct new orchestrator from configuration.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::ConfigIncomplete`] if vault or editor path is
    ///   missing.
    /// - Return [`SyncError::Config`] if a path cannot be expanded.
    pub fn from_config(executor: E, sink: EventSink, config: &Config) -> Result<Self> {
        let (Some(vault), Some(editor)) = (config.vault_path()?, config.editor_path()?) else {
            return Err(SyncError::ConfigIncomplete);
        };

        let editor = EditorCommand::new(editor, config.editor_process());
        Ok(Self::new(executor, sink, vault, editor))
    }

    pub fn with_watch_options(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    /// Run one full sync cycle.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError`] of the step that ended the cycle. Every error
    ///   has already been reported through the event sink.
    #[instrument(skip(self), fields(vault = ?self.vault), level = "debug")]
    pub async fn run(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        match self.cycle(&mut report).await {
            Ok(()) => {
                info!("sync cycle finished");
                self.sink
                    .success("Sync complete. You can close this window now.", 100);
                Ok(report)
            }
            Err(error) => {
                warn!("sync cycle aborted: {error}");
                if let SyncError::Launch(_) | SyncError::Placeholder(_) | SyncError::Config(_) =
                    &error
                {
                    self.sink
                        .error(capitalize(&error.to_string()), self.sink.progress());
                }
                Err(error)
            }
        }
    }

    async fn cycle(&self, report: &mut SyncReport) -> Result<()> {
        let git = Git::new(&self.executor, &self.vault);

        self.ensure_baseline(&git).await?;
        self.ensure_remote_branch(&git).await?;

        report.stashed = self.stash(&git).await?;
        let pulled = self.pull(&git, report).await;

        // INVARIANT: Reapply stash on every path once it was pushed.
        let reapplied = self.reapply(&git, report).await;
        pulled?;
        reapplied?;

        self.push_pending(&git).await?;
        self.edit().await?;

        report.committed = self.commit(&git, report).await?;
        if report.committed {
            self.push(&git).await?;
            report.pushed = true;
        } else {
            self.sink.info("No changes to push.", 70);
        }

        Ok(())
    }

    async fn ensure_baseline(&self, git: &Git<'_, E>) -> Result<()> {
        if git.head().await?.is_some() {
            self.sink.info("Local repository has commits.", 5);
            return Ok(());
        }

        self.sink
            .info("No local commits detected. Checking if vault is empty...", 5);
        ensure_placeholder_content(&self.vault, &self.sink)?;

        self.sink.info("Creating an initial commit...", 5);
        let output = git.add_all().await?;
        if !output.success() {
            return Err(self.command_failure(Step::Baseline, &output));
        }

        let output = git.commit(BASELINE_COMMIT_MESSAGE).await?;
        if !output.success() {
            return Err(self.command_failure(Step::Baseline, &output));
        }
        self.sink.success("Initial commit created.", 5);

        Ok(())
    }

    async fn ensure_remote_branch(&self, git: &Git<'_, E>) -> Result<()> {
        let query = git.ls_remote_head(REMOTE, BRANCH).await?;
        if !query.success() {
            return Err(self.classified_failure(Step::RemoteBranch, &query));
        }

        if !query.stdout.trim().is_empty() {
            self.sink.info(
                format!("Remote branch '{BRANCH}' exists. Proceeding with pull..."),
                10,
            );
            return Ok(());
        }

        self.sink
            .info(format!("Remote branch '{BRANCH}' not found."), 10);
        self.sink
            .info("Pushing local commits to create the remote branch...", 10);
        let output = git.push_upstream(REMOTE, BRANCH).await?;
        if !output.success() {
            return Err(self.classified_failure(Step::RemoteBranch, &output));
        }
        self.sink
            .success("Local commits pushed to the remote repository.", 15);

        Ok(())
    }

    async fn stash(&self, git: &Git<'_, E>) -> Result<bool> {
        self.sink.info("Stashing local changes (if any)...", 15);
        let output = git.stash_push(STASH_MESSAGE).await?;
        if !output.success() {
            return Err(self.command_failure(Step::Stash, &output));
        }

        let stashed = !output.mentions("no local changes to save");
        debug!(stashed, "stash push done");
        if stashed {
            self.sink.info("Local changes stashed.", 15);
        }

        Ok(stashed)
    }

    async fn pull(&self, git: &Git<'_, E>, report: &mut SyncReport) -> Result<()> {
        let before = git.head().await?;

        self.sink
            .info("Pulling latest changes from the remote...", 20);
        let output = git.pull_rebase(REMOTE, BRANCH).await?;
        match Outcome::classify(&output) {
            Outcome::Success => {
                self.sink.success(
                    "Pull completed successfully. Your vault is now updated with remote changes.",
                    30,
                );
            }
            Outcome::Network => {
                self.sink.error(
                    "Network error: unable to pull changes. Your local changes are preserved.",
                    30,
                );
                return Err(SyncError::network(Step::Pull, &output));
            }
            Outcome::Conflict => {
                self.sink.error(
                    "Merge conflict occurred during pull. Please resolve conflicts manually.",
                    30,
                );
                return Err(SyncError::MergeConflict { step: Step::Pull });
            }
            _ => return Err(self.command_failure(Step::Pull, &output)),
        }

        if let Some(before) = before {
            report.pulled_changes = git.range_summary(&before, "HEAD").await?;
            self.details(&report.pulled_changes);
        }

        Ok(())
    }

    async fn reapply(&self, git: &Git<'_, E>, report: &mut SyncReport) -> Result<()> {
        if !report.stashed {
            self.sink.info("Nothing to reapply.", 35);
            return Ok(());
        }

        report.reapplied = true;
        let output = git.stash_pop().await?;
        match Outcome::classify(&output) {
            Outcome::Success | Outcome::NoStash => {
                self.sink
                    .success("Local changes reapplied successfully.", 35);
                Ok(())
            }
            Outcome::Conflict => {
                self.sink.error(
                    "Merge conflict while reapplying your stashed changes. \
                     They remain in the stash. Please resolve manually.",
                    35,
                );
                Err(SyncError::MergeConflict {
                    step: Step::Reapply,
                })
            }
            _ => Err(self.command_failure(Step::Reapply, &output)),
        }
    }

    async fn push_pending(&self, git: &Git<'_, E>) -> Result<()> {
        let pending = git.unpushed_count(REMOTE, BRANCH).await?;
        if pending == 0 {
            return Ok(());
        }

        self.sink.info(
            format!("Pushing {pending} commit(s) left over from an earlier session..."),
            38,
        );
        let output = git.push(REMOTE, BRANCH).await?;
        if output.success() {
            self.sink.success("Earlier commits pushed.", 38);
        } else {
            self.sink.warn(
                format!(
                    "Could not push earlier commits ({}). They stay committed locally.",
                    output.reason()
                ),
                38,
            );
        }

        Ok(())
    }

    async fn edit(&self) -> Result<()> {
        self.sink.info(
            "Opening the editor. Make your changes and close it when done.",
            40,
        );
        self.sink.info("Waiting for the editor to close...", 45);

        let watcher = ProcessWatcher::new(&self.executor, self.watch);
        match watcher.launch_and_wait(&self.editor, &self.cancel).await {
            Ok(()) => Ok(()),
            Err(WatchError::Launch(error)) => Err(SyncError::Launch(error)),
            Err(WatchError::Cancelled) => {
                self.sink.warn(
                    "Sync cancelled while waiting for the editor. \
                     Your edits stay in the vault and are committed next time.",
                    45,
                );
                Err(SyncError::Cancelled)
            }
        }
    }

    async fn commit(&self, git: &Git<'_, E>, report: &mut SyncReport) -> Result<bool> {
        self.sink
            .info("Editor closed. Committing local changes...", 50);
        let output = git.add_all().await?;
        if !output.success() {
            return Err(self.command_failure(Step::Commit, &output));
        }

        let output = git.commit(SYNC_COMMIT_MESSAGE).await?;
        match Outcome::classify(&output) {
            Outcome::Success => {
                self.sink.success("Local commit successful.", 55);
                report.committed_changes = git.commit_summary("HEAD").await?;
                self.details(&report.committed_changes);
                Ok(true)
            }
            Outcome::NothingToCommit => {
                self.sink.info(
                    "No changes detected during this session. Nothing to commit.",
                    55,
                );
                Ok(false)
            }
            _ => Err(self.command_failure(Step::Commit, &output)),
        }
    }

    async fn push(&self, git: &Git<'_, E>) -> Result<()> {
        self.sink.info("Pushing changes to the remote...", 60);
        let output = git.push(REMOTE, BRANCH).await?;
        match Outcome::classify(&output) {
            Outcome::Success => {
                self.sink.success("Changes pushed successfully.", 70);
                Ok(())
            }
            Outcome::Network => {
                self.sink.error(
                    "Network error while pushing. Your changes are safely committed \
                     locally and will be pushed on the next sync.",
                    70,
                );
                Err(SyncError::network(Step::Push, &output))
            }
            _ => Err(self.command_failure(Step::Push, &output)),
        }
    }

    fn details(&self, lines: &[String]) {
        for line in lines {
            self.sink.detail(line.replace('\t', " "));
        }
    }

    fn command_failure(&self, step: Step, output: &CommandOutput) -> SyncError {
        self.sink.error(
            format!("{} failed: {}", capitalize(&step.to_string()), output.reason()),
            self.sink.progress(),
        );
        SyncError::CommandFailure {
            step,
            reason: output.reason().to_string(),
        }
    }

    fn classified_failure(&self, step: Step, output: &CommandOutput) -> SyncError {
        match Outcome::classify(output) {
            Outcome::Network => {
                self.sink.error(
                    format!("Network error during {step}: unable to reach the remote."),
                    self.sink.progress(),
                );
                SyncError::network(step, output)
            }
            _ => self.command_failure(step, output),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Sync cycle error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Vault or editor path is not configured.
    #[error("vault path or editor path not set, please run setup again")]
    ConfigIncomplete,

    /// Configuration value cannot be used.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Command cannot be started.
    #[error(transparent)]
    Launch(#[from] LaunchFailure),

    /// Remote cannot be reached.
    #[error("network error during {step}: {reason}")]
    NetworkFailure { step: Step, reason: String },

    /// Changes conflict, and need manual resolution.
    #[error("merge conflict during {step}, resolve it manually")]
    MergeConflict { step: Step },

    /// Command failed for any other reason.
    #[error("{step} failed: {reason}")]
    CommandFailure { step: Step, reason: String },

    /// Placeholder content cannot be created.
    #[error(transparent)]
    Placeholder(#[from] BootstrapError),

    /// Cycle was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    fn network(step: Step, output: &CommandOutput) -> Self {
        Self::NetworkFailure {
            step,
            reason: output.reason().to_string(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
