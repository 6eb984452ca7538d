// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{block_on, Answers, RepoFixture, RepoKind};

use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    env::current_dir,
    fs::{create_dir_all, write},
};
use vaultsync::{
    bootstrap::{Bootstrapper, RemoteLink, PLACEHOLDER_FILE},
    event::EventSink,
    exec::SystemExecutor,
};

#[sealed_test(env = [
    ("GIT_AUTHOR_NAME", "John Doe"),
    ("GIT_AUTHOR_EMAIL", "john@doe.com"),
    ("GIT_COMMITTER_NAME", "John Doe"),
    ("GIT_COMMITTER_EMAIL", "john@doe.com"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
])]
fn bootstrap_twice_changes_nothing() -> anyhow::Result<()> {
    let root = current_dir()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let url = root.join("remote.git").display().to_string();
    let vault = root.join("vault");
    create_dir_all(&vault)?;

    let executor = SystemExecutor;
    let (sink, _rx) = EventSink::channel();

    let (first, pushed) = block_on(async {
        let answers = Answers::new([true]);
        let bootstrapper = Bootstrapper::new(&executor, &answers, &vault, &sink);
        let report = bootstrapper.run(Some(&url)).await?;
        let pushed = bootstrapper.ensure_initial_commit_and_push().await?;
        anyhow::Ok((report, pushed))
    })?;
    assert!(first.initialized && first.placeholder && first.initial_commit && pushed);
    assert_eq!(first.remote, RemoteLink::Linked(url.clone()));

    let (second, pushed) = block_on(async {
        let answers = Answers::new([false]);
        let bootstrapper = Bootstrapper::new(&executor, &answers, &vault, &sink);
        let report = bootstrapper.run(Some(&url)).await?;
        let pushed = bootstrapper.ensure_initial_commit_and_push().await?;
        anyhow::Ok((report, pushed))
    })?;
    assert!(!second.initialized && !second.placeholder && !second.initial_commit && !pushed);
    assert_eq!(second.remote, RemoteLink::Kept(url));

    // Empty vault yields exactly one placeholder in exactly one commit.
    let local = RepoFixture::open(&vault)?;
    assert_eq!(local.main_commit_count()?, 1);
    assert_eq!(local.main_paths()?, vec![PLACEHOLDER_FILE]);
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
fn existing_repository_is_adopted_as_is() -> anyhow::Result<()> {
    let root = current_dir()?;
    let vault = root.join("vault");
    let existing = RepoFixture::new(&vault, RepoKind::Normal)?;
    create_dir_all(vault.join("notes"))?;
    write(vault.join("notes/todo.md"), "- [ ] water plants\n")?;
    existing.stage_and_commit("notes/todo.md", "- [ ] water plants\n")?;

    let executor = SystemExecutor;
    let (sink, _rx) = EventSink::channel();
    let (report, pushed) = block_on(async {
        let answers = Answers::new([false]);
        let bootstrapper = Bootstrapper::new(&executor, &answers, &vault, &sink);
        let report = bootstrapper.run(None).await?;
        let pushed = bootstrapper.ensure_initial_commit_and_push().await?;
        anyhow::Ok((report, pushed))
    })?;

    assert!(!report.initialized && !report.placeholder && !report.initial_commit && !pushed);
    assert_eq!(report.remote, RemoteLink::Skipped);
    assert!(!vault.join(PLACEHOLDER_FILE).exists());
    assert_eq!(existing.main_commit_count()?, 1);

    Ok(())
}
