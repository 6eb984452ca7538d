// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Vault repository bootstrap.
//!
//! Turns an arbitrary directory into a vault that can be synchronized: a git
//! repository on branch `main`, optionally linked to a remote called
//! `origin`, holding at least one commit.
//!
//! Every step checks before it acts, so running the whole bootstrap against an
//! already prepared vault changes nothing.

use crate::{
    event::EventSink,
    exec::{Executor, LaunchFailure},
    git::{Git, Outcome, BRANCH, REMOTE},
    prompt::{Decider, PromptError},
};

use ignore::WalkBuilder;
use std::{
    fs::write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// File written into an empty vault so there is something to commit.
pub const PLACEHOLDER_FILE: &str = "README.md";

/// Contents of the placeholder file.
pub const PLACEHOLDER_CONTENTS: &str = "# Welcome to your vault\n\n\
    This placeholder file was generated automatically by vaultsync to \
    initialize the repository.\n";

/// Message of the first commit made during setup.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// Remote pointer state of a vault, derived on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLinkState {
    Unlinked,
    Linked(String),
}

/// Result of linking a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLink {
    /// User kept the remote that was already there.
    Kept(String),

    /// Remote was linked to a new URL.
    Linked(String),

    /// User declined to link a remote.
    Skipped,
}

impl RemoteLink {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Kept(url) | Self::Linked(url) => Some(url),
            Self::Skipped => None,
        }
    }
}

/// Summary of one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub initialized: bool,
    pub remote: RemoteLink,
    pub placeholder: bool,
    pub initial_commit: bool,
}

/// Prepare a vault for synchronization.
pub struct Bootstrapper<'a, E, D>
where
    E: Executor,
    D: Decider,
{
    git: Git<'a, E>,
    decider: &'a D,
    sink: &'a EventSink,
}

impl<'a, E, D> Bootstrapper<'a, E, D>
where
    E: Executor,
    D: Decider,
{
    pub fn new(executor: &'a E, decider: &'a D, vault: &'a Path, sink: &'a EventSink) -> Self {
        Self {
            git: Git::new(executor, vault),
            decider,
            sink,
        }
    }

    /// Run every local bootstrap step in order.
    ///
    /// Nothing is pushed. See [`Bootstrapper::ensure_initial_commit_and_push`]
    /// for publishing once connectivity is known to work.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError`] of the first step that fails.
    #[instrument(skip(self, proposed_url), level = "debug")]
    pub async fn run(&self, proposed_url: Option<&str>) -> Result<BootstrapReport> {
        let initialized = self.ensure_repository().await?;
        let remote = self.ensure_remote(proposed_url).await?;
        let placeholder = ensure_placeholder_content(self.git.workdir(), self.sink)?;
        let initial_commit = self.ensure_initial_commit().await?;

        Ok(BootstrapReport {
            initialized,
            remote,
            placeholder,
            initial_commit,
        })
    }

    /// Make sure vault is a git repository on the default branch.
    ///
    /// Returns `true` if a repository was initialized by this call.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::CommandFailure`] if init or rename fails.
    pub async fn ensure_repository(&self) -> Result<bool> {
        if self.git.is_repository().await? {
            self.sink.info("Vault is already a Git repository.", 20);
            return Ok(false);
        }

        self.sink.info("Initializing Git repository in vault...", 15);
        let output = self.git.init().await?;
        if !output.success() {
            return Err(BootstrapError::command("git init", output.reason()));
        }

        let output = self.git.rename_branch(BRANCH).await?;
        if !output.success() {
            return Err(BootstrapError::command("git branch -M", output.reason()));
        }
        self.sink.success("Git repository initialized.", 20);

        Ok(true)
    }

    /// Determine whether the vault already points at a remote.
    pub async fn remote_link_state(&self) -> Result<RemoteLinkState> {
        Ok(match self.git.remote_url(REMOTE).await? {
            Some(url) => RemoteLinkState::Linked(url),
            None => RemoteLinkState::Unlinked,
        })
    }

    /// Link the vault to a remote, asking the user how to go about it.
    ///
    /// An existing remote is only replaced if the user says so. A missing
    /// remote is only linked if the user wants one now; declining is fine,
    /// later steps that need a remote will say so.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::MissingRemoteUrl`] if the user agreed to
    ///   link a remote, but gave no URL.
    /// - Return [`BootstrapError::CommandFailure`] if remote edits fail.
    /// - Return [`BootstrapError::Prompt`] if a question cannot be asked.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_remote(&self, proposed_url: Option<&str>) -> Result<RemoteLink> {
        match self.remote_link_state().await? {
            RemoteLinkState::Linked(existing) => {
                self.sink.info(
                    format!("A remote named '{REMOTE}' already exists: {existing}"),
                    25,
                );
                let replace = self.decider.ask_yes_no(&format!(
                    "Remote '{REMOTE}' already points to {existing}. Override it with a new URL?"
                ))?;
                if !replace {
                    self.sink
                        .info(format!("Keeping the existing '{REMOTE}' remote."), 25);
                    return Ok(RemoteLink::Kept(existing));
                }

                let url = self.resolve_url(proposed_url)?;
                let output = self.git.remove_remote(REMOTE).await?;
                if !output.success() {
                    return Err(BootstrapError::command("git remote remove", output.reason()));
                }
                self.sink
                    .info(format!("Existing '{REMOTE}' remote removed."), 25);
                self.link(url).await
            }
            RemoteLinkState::Unlinked => {
                let question = match proposed_url {
                    Some(url) => format!("Link the vault to {url} now?"),
                    None => "Do you want to link an existing remote repository now?".into(),
                };
                if !self.decider.ask_yes_no(&question)? {
                    self.sink.info(
                        "Skipping remote setup. Rerun setup to link one later.",
                        25,
                    );
                    return Ok(RemoteLink::Skipped);
                }

                let url = self.resolve_url(proposed_url)?;
                self.link(url).await
            }
        }
    }

    fn resolve_url(&self, proposed_url: Option<&str>) -> Result<String> {
        let url = match proposed_url {
            Some(url) => Some(url.to_string()),
            None => self.decider.ask_text(
                "Enter the remote repository URL (e.g., git@github.com:username/vault.git):",
            )?,
        };

        url.map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(BootstrapError::MissingRemoteUrl)
    }

    async fn link(&self, url: String) -> Result<RemoteLink> {
        let output = self.git.add_remote(REMOTE, &url).await?;
        if !output.success() {
            return Err(BootstrapError::command("git remote add", output.reason()));
        }
        self.sink
            .success(format!("Git remote '{REMOTE}' set to: {url}"), 25);

        Ok(RemoteLink::Linked(url))
    }

    /// Make sure the repository has at least one commit.
    ///
    /// Returns `true` if a commit was created by this call.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::CommandFailure`] with git's own message if
    ///   the commit fails.
    pub async fn ensure_initial_commit(&self) -> Result<bool> {
        if self.git.head().await?.is_some() {
            self.sink.info(
                "Local repository already has commits. Skipping initial commit.",
                50,
            );
            return Ok(false);
        }

        self.sink
            .info("No local commits detected. Creating initial commit...", 45);
        let output = self.git.add_all().await?;
        if !output.success() {
            return Err(BootstrapError::command("git add", output.reason()));
        }

        let output = self.git.commit(INITIAL_COMMIT_MESSAGE).await?;
        if !output.success() {
            return Err(BootstrapError::command("git commit", output.reason()));
        }
        self.sink.success("Initial commit created.", 50);

        Ok(true)
    }

    /// Make sure the repository has a commit, and that the remote has it.
    ///
    /// Pushes with upstream tracking when a remote is linked and does not
    /// carry the default branch yet. Returns `true` if a push happened.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::NetworkFailure`] if the remote cannot be
    ///   reached.
    /// - Return [`BootstrapError::CommandFailure`] with git's own message for
    ///   any other failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_initial_commit_and_push(&self) -> Result<bool> {
        self.ensure_initial_commit().await?;

        if self.remote_link_state().await? == RemoteLinkState::Unlinked {
            info!("no remote linked, nothing to publish");
            self.sink
                .info(format!("No '{REMOTE}' remote linked. Skipping push."), 60);
            return Ok(false);
        }

        let query = self.git.ls_remote_head(REMOTE, BRANCH).await?;
        if query.success() && !query.stdout.trim().is_empty() {
            debug!("remote already carries {BRANCH}");
            self.sink
                .info(format!("Remote branch '{BRANCH}' already exists."), 60);
            return Ok(false);
        }

        self.sink
            .info(format!("Pushing '{BRANCH}' to '{REMOTE}'..."), 55);
        let output = self.git.push_upstream(REMOTE, BRANCH).await?;
        match Outcome::classify(&output) {
            Outcome::Success => {
                self.sink
                    .success("Initial commit pushed to remote repository.", 60);
                Ok(true)
            }
            Outcome::Network => Err(BootstrapError::NetworkFailure(output.reason().into())),
            _ => Err(BootstrapError::command("git push", output.reason())),
        }
    }
}

/// Make sure the vault holds something a commit can include.
///
/// A vault is empty when walking it (honoring ignore rules, skipping `.git`)
/// finds no file. In that case, a placeholder file is written. Returns `true`
/// if the placeholder was written by this call.
///
/// # Errors
///
/// - Return [`BootstrapError::Walk`] if the vault cannot be walked.
/// - Return [`BootstrapError::Placeholder`] if the placeholder cannot be
///   written.
#[instrument(skip(vault, sink), level = "debug")]
pub fn ensure_placeholder_content(vault: &Path, sink: &EventSink) -> Result<bool> {
    if has_committable_file(vault)? {
        debug!("vault {:?} has content", vault.display());
        return Ok(false);
    }

    let path = vault.join(PLACEHOLDER_FILE);
    if path.exists() {
        sink.info(format!("Placeholder file '{PLACEHOLDER_FILE}' already exists."), 5);
        return Ok(false);
    }

    write(&path, PLACEHOLDER_CONTENTS)
        .map_err(|source| BootstrapError::Placeholder { source, path })?;
    sink.info(
        format!("Placeholder file '{PLACEHOLDER_FILE}' created, as the vault was empty."),
        5,
    );

    Ok(true)
}

fn has_committable_file(vault: &Path) -> Result<bool> {
    let walker = WalkBuilder::new(vault)
        .hidden(false)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    for entry in walker {
        if entry?.file_type().is_some_and(|kind| kind.is_file()) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Bootstrap error types.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Git cannot be started.
    #[error(transparent)]
    Launch(#[from] LaunchFailure),

    /// Question cannot be asked.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// User agreed to link a remote, but gave no URL.
    #[error("repository URL not provided")]
    MissingRemoteUrl,

    /// Remote cannot be reached.
    #[error("network error: {0}")]
    NetworkFailure(String),

    /// Git command failed.
    #[error("{command} failed: {reason}")]
    CommandFailure { command: String, reason: String },

    /// Vault cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Placeholder file cannot be written.
    #[error("failed to write placeholder file at {:?}", path.display())]
    Placeholder {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl BootstrapError {
    fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailure {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
