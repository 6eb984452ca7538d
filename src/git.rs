// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git command surface.
//!
//! Thin typed layer over the git binary for the handful of commands
//! vaultsync needs. Every call goes through an [`Executor`], and returns the
//! raw [`CommandOutput`] unless the answer is a simple fact, e.g., whether
//! HEAD resolves.
//!
//! # Locale
//!
//! Outcomes like "nothing to commit" or a merge conflict are recognized by
//! matching git's own messages. Thus, every call pins `LC_ALL=C` so those
//! messages never arrive translated. Every call also sets
//! `GIT_TERMINAL_PROMPT=0` so a remote asking for credentials fails instead
//! of hanging forever behind a progress bar.

use crate::exec::{CommandOutput, CommandSpec, Executor, Result};

use std::{ffi::OsString, path::Path, time::Duration};
use tracing::{debug, instrument};

/// Name of the remote vaultsync synchronizes with.
pub const REMOTE: &str = "origin";

/// Name of the branch vaultsync synchronizes.
pub const BRANCH: &str = "main";

/// Time limit for commands that talk to the remote.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(600);

/// Time limit for a remote branch lookup.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Marker phrases of a remote that cannot be reached.
const NETWORK_MARKERS: &[&str] = &[
    "could not resolve hostname",
    "could not resolve host",
    "network",
    "connection timed out",
    "connection refused",
    "operation timed out",
    "command timed out",
];

/// Git outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Command succeeded.
    Success,

    /// Remote could not be reached.
    Network,

    /// Changes conflict with each other.
    Conflict,

    /// Commit found nothing to record.
    NothingToCommit,

    /// Stash pop found no stash entry.
    NoStash,

    /// Anything else.
    Other,
}

impl Outcome {
    /// Classify output of a git command.
    pub fn classify(output: &CommandOutput) -> Self {
        if output.success() {
            return Self::Success;
        }

        if output.mentions("nothing to commit") {
            Self::NothingToCommit
        } else if output.stdout.contains("CONFLICT") || output.stderr.contains("CONFLICT") {
            Self::Conflict
        } else if output.mentions("no stash entries found") || output.stderr.contains("No stash") {
            Self::NoStash
        } else if NETWORK_MARKERS.iter().any(|marker| output.mentions(marker)) {
            Self::Network
        } else {
            Self::Other
        }
    }
}

/// Git bound to one working directory.
#[derive(Debug)]
pub struct Git<'a, E>
where
    E: Executor,
{
    executor: &'a E,
    workdir: &'a Path,
}

impl<'a, E> Git<'a, E>
where
    E: Executor,
{
    /// Construct git surface for target working directory.
    pub fn new(executor: &'a E, workdir: &'a Path) -> Self {
        Self { executor, workdir }
    }

    pub fn workdir(&self) -> &Path {
        self.workdir
    }

    /// Run git with target arguments in the working directory.
    #[instrument(skip(self, args), level = "debug")]
    pub async fn call(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let mut spec = git().args(args).current_dir(self.workdir);
        if let Some(timeout) = timeout {
            spec = spec.timeout(timeout);
        }
        debug!("{spec}");

        self.executor.run(&spec).await
    }

    /// Check that git is installed at all.
    pub async fn version(executor: &E) -> Result<Option<String>> {
        let output = executor.run(&git().arg("--version")).await?;
        Ok(output.success().then_some(output.stdout))
    }

    pub async fn is_repository(&self) -> Result<bool> {
        let output = self.call(["rev-parse", "--is-inside-work-tree"], None).await?;
        Ok(output.success() && output.stdout.trim() == "true")
    }

    pub async fn init(&self) -> Result<CommandOutput> {
        self.call(["init"], None).await
    }

    /// Force rename current branch.
    pub async fn rename_branch(&self, name: &str) -> Result<CommandOutput> {
        self.call(["branch", "-M", name], None).await
    }

    /// URL of target remote, if configured.
    pub async fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let output = self.call(["remote", "get-url", remote], None).await?;
        Ok(output
            .success()
            .then(|| output.stdout.trim().to_string())
            .filter(|url| !url.is_empty()))
    }

    pub async fn add_remote(&self, remote: &str, url: &str) -> Result<CommandOutput> {
        self.call(["remote", "add", remote, url], None).await
    }

    pub async fn remove_remote(&self, remote: &str) -> Result<CommandOutput> {
        self.call(["remote", "remove", remote], None).await
    }

    /// Commit id of HEAD, or [`None`] on an unborn branch.
    pub async fn head(&self) -> Result<Option<String>> {
        let output = self.call(["rev-parse", "--verify", "HEAD"], None).await?;
        Ok(output
            .success()
            .then(|| output.stdout.trim().to_string())
            .filter(|oid| !oid.is_empty()))
    }

    pub async fn add_all(&self) -> Result<CommandOutput> {
        self.call(["add", "-A"], None).await
    }

    pub async fn commit(&self, message: &str) -> Result<CommandOutput> {
        self.call(["commit", "-m", message], None).await
    }

    /// Push branch and record remote branch as its upstream.
    pub async fn push_upstream(&self, remote: &str, branch: &str) -> Result<CommandOutput> {
        self.call(["push", "-u", remote, branch], Some(NETWORK_TIMEOUT))
            .await
    }

    pub async fn push(&self, remote: &str, branch: &str) -> Result<CommandOutput> {
        self.call(["push", remote, branch], Some(NETWORK_TIMEOUT))
            .await
    }

    /// Query remote for target branch head.
    ///
    /// Empty standard output on success means the branch does not exist.
    pub async fn ls_remote_head(&self, remote: &str, branch: &str) -> Result<CommandOutput> {
        self.call(["ls-remote", "--heads", remote, branch], Some(QUERY_TIMEOUT))
            .await
    }

    /// Stash uncommitted changes, untracked files included.
    pub async fn stash_push(&self, message: &str) -> Result<CommandOutput> {
        self.call(
            ["stash", "push", "--include-untracked", "-m", message],
            None,
        )
        .await
    }

    pub async fn stash_pop(&self) -> Result<CommandOutput> {
        self.call(["stash", "pop"], None).await
    }

    pub async fn pull_rebase(&self, remote: &str, branch: &str) -> Result<CommandOutput> {
        self.call(["pull", "--rebase", remote, branch], Some(NETWORK_TIMEOUT))
            .await
    }

    /// Name and status of files changed by target commit.
    pub async fn commit_summary(&self, commit: &str) -> Result<Vec<String>> {
        let output = self
            .call(
                ["diff-tree", "--no-commit-id", "--name-status", "-r", commit],
                None,
            )
            .await?;
        Ok(lines_if_success(&output))
    }

    /// Name and status of files changed between two commits.
    pub async fn range_summary(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let output = self.call(["diff", "--name-status", from, to], None).await?;
        Ok(lines_if_success(&output))
    }

    /// Number of local commits not yet on the remote tracking branch.
    pub async fn unpushed_count(&self, remote: &str, branch: &str) -> Result<usize> {
        let range = format!("{remote}/{branch}..HEAD");
        let output = self.call(["rev-list", "--count", range.as_str()], None).await?;
        Ok(output
            .success()
            .then(|| output.stdout.trim().parse().ok())
            .flatten()
            .unwrap_or(0))
    }
}

fn git() -> CommandSpec {
    CommandSpec::new("git")
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
}

fn lines_if_success(output: &CommandOutput) -> Vec<String> {
    if !output.success() {
        return Vec::new();
    }

    output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
