// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{block_on, Answers, EditingExecutor, RepoFixture, RepoKind};

use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    env::current_dir,
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
    time::Duration,
};
use vaultsync::{
    bootstrap::Bootstrapper,
    event::EventSink,
    exec::{CommandOutput, SystemExecutor},
    sync::{Orchestrator, Step, SyncError, SyncReport},
    watch::{EditorCommand, WatchOptions},
};

const UNREACHABLE: &str = "ssh: Could not resolve hostname github.com: Name or service not known\n\
    fatal: Could not read from remote repository.";

/// Bootstrap an empty vault linked to target remote, optionally publishing it.
fn prepare_vault(root: &Path, url: &str, publish: bool) -> anyhow::Result<PathBuf> {
    let vault = root.join("vault");
    create_dir_all(&vault)?;

    let executor = SystemExecutor;
    let (sink, _rx) = EventSink::channel();
    block_on(async {
        let answers = Answers::new([true]);
        let bootstrapper = Bootstrapper::new(&executor, &answers, &vault, &sink);
        bootstrapper.run(Some(url)).await?;
        if publish {
            bootstrapper.ensure_initial_commit_and_push().await?;
        }
        anyhow::Ok(())
    })?;

    Ok(vault)
}

fn sync(executor: EditingExecutor, vault: &Path) -> vaultsync::sync::Result<SyncReport> {
    let (sink, _rx) = EventSink::channel();
    let orchestrator = Orchestrator::new(executor, sink, vault, EditorCommand::new("obsidian", None))
        .with_watch_options(WatchOptions {
            poll_interval: Duration::from_millis(1),
            startup_grace: Duration::ZERO,
        });

    block_on(orchestrator.run())
}

#[sealed_test(env = [
    ("GIT_AUTHOR_NAME", "John Doe"),
    ("GIT_AUTHOR_EMAIL", "john@doe.com"),
    ("GIT_COMMITTER_NAME", "John Doe"),
    ("GIT_COMMITTER_EMAIL", "john@doe.com"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
])]
fn remote_and_local_edits_meet_on_remote() -> anyhow::Result<()> {
    let root = current_dir()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let url = root.join("remote.git").display().to_string();
    let vault = prepare_vault(&root, &url, true)?;

    let other = RepoFixture::clone(root.join("remote.git"), root.join("other"))?;
    other.stage_and_commit("remote.md", "written on another device\n")?;
    other.push_main()?;

    write(vault.join("local.md"), "written before this session\n")?;
    let executor = EditingExecutor::new(&vault).edit("notes/session.md", "written in the editor\n");

    let report = sync(executor, &vault)?;
    assert!(report.stashed && report.reapplied && report.committed && report.pushed);
    assert_eq!(report.pulled_changes, vec!["A\tremote.md"]);

    let mut committed = report.committed_changes.clone();
    committed.sort();
    assert_eq!(committed, vec!["A\tlocal.md", "A\tnotes/session.md"]);

    let mut paths = remote.main_paths()?;
    paths.sort();
    assert_eq!(
        paths,
        vec!["README.md", "local.md", "notes/session.md", "remote.md"]
    );
    assert_eq!(remote.main_commit_count()?, 3);

    Ok(())
}

#[sealed_test(env = [
    ("GIT_AUTHOR_NAME", "John Doe"),
    ("GIT_AUTHOR_EMAIL", "john@doe.com"),
    ("GIT_COMMITTER_NAME", "John Doe"),
    ("GIT_COMMITTER_EMAIL", "john@doe.com"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
])]
fn session_without_edits_leaves_remote_alone() -> anyhow::Result<()> {
    let root = current_dir()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let url = root.join("remote.git").display().to_string();
    let vault = prepare_vault(&root, &url, true)?;

    let report = sync(EditingExecutor::new(&vault), &vault)?;
    assert_eq!(report, SyncReport::default());
    assert_eq!(remote.main_commit_count()?, 1);

    Ok(())
}

#[sealed_test(env = [
    ("GIT_AUTHOR_NAME", "John Doe"),
    ("GIT_AUTHOR_EMAIL", "john@doe.com"),
    ("GIT_COMMITTER_NAME", "John Doe"),
    ("GIT_COMMITTER_EMAIL", "john@doe.com"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
])]
fn missing_remote_branch_is_created_by_sync() -> anyhow::Result<()> {
    let root = current_dir()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let url = root.join("remote.git").display().to_string();
    let vault = prepare_vault(&root, &url, false)?;

    let executor = EditingExecutor::new(&vault).edit("first.md", "first note\n");
    let report = sync(executor, &vault)?;
    assert!(report.committed && report.pushed);
    assert!(remote.main_tracks("first.md")?);
    assert_eq!(remote.main_commit_count()?, 2);

    Ok(())
}

#[sealed_test(env = [
    ("GIT_AUTHOR_NAME", "John Doe"),
    ("GIT_AUTHOR_EMAIL", "john@doe.com"),
    ("GIT_COMMITTER_NAME", "John Doe"),
    ("GIT_COMMITTER_EMAIL", "john@doe.com"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
])]
fn unreachable_remote_leaves_working_tree_as_it_was() -> anyhow::Result<()> {
    let root = current_dir()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let url = root.join("remote.git").display().to_string();
    let vault = prepare_vault(&root, &url, true)?;

    write(vault.join("README.md"), "edited, never committed\n")?;
    create_dir_all(vault.join("notes"))?;
    write(vault.join("notes/draft.md"), "untracked draft\n")?;
    let dirty = RepoFixture::open(&vault)?.dirty_paths()?;
    assert_eq!(dirty, vec!["README.md", "notes/draft.md"]);

    let executor = EditingExecutor::new(&vault)
        .answer("git pull", CommandOutput::failed(1, UNREACHABLE))
        .edit("session.md", "written in the editor\n");
    let result = sync(executor, &vault);
    assert!(matches!(
        result,
        Err(SyncError::NetworkFailure {
            step: Step::Pull,
            ..
        })
    ));

    assert_eq!(read_to_string(vault.join("README.md"))?, "edited, never committed\n");
    assert_eq!(read_to_string(vault.join("notes/draft.md"))?, "untracked draft\n");
    let mut local = RepoFixture::open(&vault)?;
    assert_eq!(local.dirty_paths()?, dirty);
    assert_eq!(local.stash_count()?, 0);
    assert!(!vault.join("session.md").exists());
    assert_eq!(local.main_commit_count()?, 1);
    assert_eq!(remote.main_commit_count()?, 1);

    Ok(())
}
