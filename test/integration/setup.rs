// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{block_on, Answers, EditingExecutor, RepoFixture};

use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    env::current_dir,
    fs::{create_dir_all, write},
};
use vaultsync::{
    bootstrap::PLACEHOLDER_FILE,
    config::{ConfigFile, SETUP_DONE},
    event::EventSink,
    exec::CommandOutput,
    setup::{SetupError, SetupOptions, Wizard},
    trust::SshPaths,
};

#[sealed_test(env = [
    ("GIT_AUTHOR_NAME", "John Doe"),
    ("GIT_AUTHOR_EMAIL", "john@doe.com"),
    ("GIT_COMMITTER_NAME", "John Doe"),
    ("GIT_COMMITTER_EMAIL", "john@doe.com"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
])]
fn unlinked_setup_commits_locally_but_stays_unfinished() -> anyhow::Result<()> {
    let root = current_dir()?;
    let vault = root.join("vault");
    let editor = root.join("obsidian");
    write(&editor, "")?;
    let ssh = SshPaths::new(root.join(".ssh"));
    create_dir_all(ssh.dir())?;
    write(ssh.private_key(), "PRIVATE")?;
    write(ssh.public_key(), "ssh-ed25519 AAAAC3Nza john@doe.com\n")?;

    let executor = EditingExecutor::new(&vault)
        .answer("ssh-keyscan", CommandOutput::failed(1, ""))
        .answer(
            "ssh -T",
            CommandOutput::failed(255, "git@github.com: Permission denied (publickey)."),
        );
    let answers = Answers::new([false]);
    let (sink, _rx) = EventSink::channel();
    let options = SetupOptions {
        vault: Some(vault.clone()),
        editor: Some(editor.clone()),
        remote: None,
    };

    let mut file = ConfigFile::load(root.join("config.txt"))?;
    let result = block_on(async {
        let wizard = Wizard::new(&executor, &answers, &sink, &ssh);
        wizard.run(&mut file, &options).await
    });
    assert!(matches!(result, Err(SetupError::AuthFailure { ref host }) if host == "github.com"));

    let local = RepoFixture::open(&vault)?;
    assert!(!local.has_remote("origin"));
    assert_eq!(local.main_commit_count()?, 1);
    assert_eq!(local.main_paths()?, vec![PLACEHOLDER_FILE]);
    assert_eq!(executor.count("git push"), 0);
    assert_eq!(executor.count("ssh -T"), 1);

    let reloaded = ConfigFile::load(root.join("config.txt"))?;
    assert_eq!(reloaded.config().get(SETUP_DONE), Some("0"));
    assert_eq!(reloaded.config().vault_path()?, Some(vault));
    assert_eq!(reloaded.config().editor_path()?, Some(editor));

    Ok(())
}
