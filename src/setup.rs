// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! First-time setup.
//!
//! Setup runs until the configuration says it is done. It finds the editor,
//! settles on a vault folder, bootstraps the vault repository, and makes sure
//! SSH can talk to the remote host. Only once connectivity is verified does it
//! publish the vault and mark setup as done, so a half finished setup simply
//! runs again next time.
//!
//! Connectivity usually fails the first time around, because a freshly
//! generated key still has to be registered with the Git host. The
//! [`Wizard::retest`] entry point picks up from there.

use crate::{
    bootstrap::{BootstrapError, BootstrapReport, Bootstrapper},
    config::{ConfigError, ConfigFile},
    editor::{self, DiscoveryError},
    event::EventSink,
    exec::{Executor, LaunchFailure},
    git::{Git, REMOTE},
    prompt::{Decider, PromptError},
    trust::{host_from_remote_url, KeyPair, SshPaths, TrustError, TrustEstablisher, DEFAULT_HOST},
};

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Where GitHub users register public keys.
pub const KEY_SETTINGS_URL: &str = "https://github.com/settings/keys";

/// Answers given up front, e.g., on the command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetupOptions {
    pub vault: Option<PathBuf>,
    pub editor: Option<PathBuf>,
    pub remote: Option<String>,
}

/// Summary of a finished setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub editor: PathBuf,
    pub vault: PathBuf,
    pub bootstrap: BootstrapReport,
    pub key: Option<KeyPair>,
    pub published: bool,
}

/// Walk the user through first-time setup.
#[derive(Debug)]
pub struct Wizard<'a, E, D>
where
    E: Executor,
    D: Decider,
{
    executor: &'a E,
    decider: &'a D,
    sink: &'a EventSink,
    ssh: &'a SshPaths,
    candidates: &'a [&'a str],
}

impl<'a, E, D> Wizard<'a, E, D>
where
    E: Executor,
    D: Decider,
{
    pub fn new(executor: &'a E, decider: &'a D, sink: &'a EventSink, ssh: &'a SshPaths) -> Self {
        Self {
            executor,
            decider,
            sink,
            ssh,
            candidates: editor::CANDIDATES,
        }
    }

    /// Search target candidate patterns for the editor instead of the
    /// platform defaults.
    pub fn with_editor_candidates(mut self, candidates: &'a [&'a str]) -> Self {
        self.candidates = candidates;
        self
    }

    /// Run full setup.
    ///
    /// Every answer is written to the configuration file as soon as it is
    /// known. The setup flag is only raised once the vault is published.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::EditorMissing`] or [`SetupError::VaultMissing`]
    ///   if the user cannot point at either.
    /// - Return [`SetupError::ToolMissing`] if git is not installed.
    /// - Return [`SetupError::AuthFailure`] if the remote host rejects us.
    /// - Return [`SetupError::Bootstrap`] if vault bootstrap fails.
    #[instrument(skip(self, file, options), level = "debug")]
    pub async fn run(&self, file: &mut ConfigFile, options: &SetupOptions) -> Result<SetupReport> {
        self.sink.info("Running first-time setup...", 0);

        let editor = self.resolve_editor(file, options.editor.as_deref())?;
        self.sink
            .success(format!("Editor found: {}", editor.display()), 5);

        let vault = self.resolve_vault(file, options.vault.as_deref())?;
        self.sink
            .success(format!("Vault path set: {}", vault.display()), 10);

        self.sink.info("Checking Git installation...", 15);
        let version = match Git::version(self.executor).await {
            Ok(Some(version)) => version,
            Ok(None) | Err(_) => {
                self.sink
                    .error("Git is not installed. Please install Git and rerun setup.", 15);
                return Err(SetupError::ToolMissing("git".into()));
            }
        };
        self.sink.success(format!("Git is installed: {version}"), 15);

        let bootstrapper = Bootstrapper::new(self.executor, self.decider, &vault, self.sink);
        let bootstrap = bootstrapper.run(options.remote.as_deref()).await?;

        let key = self.offer_key_pair().await?;
        let host = bootstrap
            .remote
            .url()
            .and_then(host_from_remote_url)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let published = self.verify_and_publish(file, &vault, &host).await?;

        Ok(SetupReport {
            editor,
            vault,
            bootstrap,
            key,
            published,
        })
    }

    /// Test connectivity again, and finish setup if it works now.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::VaultMissing`] if no vault is configured.
    /// - Return [`SetupError::AuthFailure`] if the remote host rejects us.
    #[instrument(skip(self, file), level = "debug")]
    pub async fn retest(&self, file: &mut ConfigFile) -> Result<bool> {
        let Some(vault) = file.config().vault_path()? else {
            self.sink
                .error("No vault configured yet. Please run setup first.", 0);
            return Err(SetupError::VaultMissing);
        };

        let remote = Git::new(self.executor, &vault).remote_url(REMOTE).await?;
        let host = remote
            .as_deref()
            .and_then(host_from_remote_url)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        self.verify_and_publish(file, &vault, &host).await
    }

    /// Generate a key pair unless one exists.
    ///
    /// Asks for the email address to tag the key with if none is given.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::EmailMissing`] if no email address is given.
    /// - Return [`SetupError::Trust`] if key generation fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn generate_key(&self, email: Option<&str>) -> Result<KeyPair> {
        let trust = TrustEstablisher::new(self.executor, self.ssh, self.sink);
        if self.ssh.private_key().exists() {
            self.sink.info(
                format!("SSH key already exists at {}.", self.ssh.private_key().display()),
                30,
            );
            return Ok(KeyPair::Existing);
        }

        let email = match email {
            Some(email) => Some(email.to_string()),
            None => self
                .decider
                .ask_text("Enter your email address for the SSH key:")?,
        };
        let Some(email) = email.filter(|email| !email.trim().is_empty()) else {
            self.sink.error(
                "No email address provided. SSH key generation canceled.",
                25,
            );
            return Err(SetupError::EmailMissing);
        };

        let key = trust.ensure_key_pair(email.trim()).await?;
        self.show_public_key(&trust);

        Ok(key)
    }

    /// Public half of the key pair.
    ///
    /// # Errors
    ///
    /// - Return [`SetupError::Trust`] if no public key exists.
    pub fn public_key(&self) -> Result<String> {
        Ok(TrustEstablisher::new(self.executor, self.ssh, self.sink).public_key()?)
    }

    fn resolve_editor(&self, file: &mut ConfigFile, given: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = given {
            file.config_mut().set_editor_path(path);
            file.save()?;
        }

        if let Some(path) = file.config().editor_path()? {
            if path.is_file() {
                return Ok(path);
            }
            warn!("configured editor {path:?} does not exist");
            self.sink.warn(
                format!("Configured editor {} does not exist.", path.display()),
                0,
            );
        }

        let found = match editor::discover_in(self.candidates)? {
            Some(found) => Some(found),
            None => self
                .decider
                .ask_text("Editor not found in common locations. Enter the path to its executable:")?
                .map(PathBuf::from),
        };
        let Some(found) = found else {
            self.sink.error("Editor not found. Setup aborted.", 0);
            return Err(SetupError::EditorMissing);
        };

        file.config_mut().set_editor_path(&found);
        file.save()?;
        match file.config().editor_path()? {
            Some(path) if path.is_file() => Ok(path),
            _ => {
                self.sink.error(
                    format!("No editor executable at {}. Setup aborted.", found.display()),
                    0,
                );
                Err(SetupError::EditorMissing)
            }
        }
    }

    fn resolve_vault(&self, file: &mut ConfigFile, given: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = given {
            file.config_mut().set_vault_path(path);
            file.save()?;
        }

        if file.config().vault_path()?.is_none() {
            let Some(answer) = self
                .decider
                .ask_text("Enter the path of your vault folder:")?
            else {
                self.sink.error("No vault folder selected. Setup aborted.", 5);
                return Err(SetupError::VaultMissing);
            };
            file.config_mut().set_vault_path(answer);
            file.save()?;
        }

        let vault = file.config().vault_path()?.ok_or(SetupError::VaultMissing)?;
        if !vault.is_dir() {
            self.sink
                .info(format!("Creating vault folder {}...", vault.display()), 5);
            mkdirp::mkdirp(&vault).map_err(|source| SetupError::VaultDir {
                source,
                path: vault.clone(),
            })?;
        }

        Ok(vault)
    }

    async fn offer_key_pair(&self) -> Result<Option<KeyPair>> {
        self.sink.info("Checking SSH key...", 62);
        if self.ssh.private_key().exists() {
            self.sink.info(
                "SSH key found. Make sure it is registered with your Git host.",
                65,
            );
            return Ok(Some(KeyPair::Existing));
        }

        if !self
            .decider
            .ask_yes_no("No SSH key found. Do you want to generate one now?")?
        {
            self.sink.warn(
                "You must generate or provide an SSH key for sync. Run `vaultsync keygen` later.",
                65,
            );
            return Ok(None);
        }

        match self.generate_key(None).await {
            Ok(key) => Ok(Some(key)),
            Err(SetupError::EmailMissing) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn verify_and_publish(&self, file: &mut ConfigFile, vault: &Path, host: &str) -> Result<bool> {
        let trust = TrustEstablisher::new(self.executor, self.ssh, self.sink);

        self.sink
            .info(format!("Testing SSH connection to {host}..."), 70);
        trust.ensure_host_trusted(host).await?;
        if !trust.test_connectivity(host).await? {
            self.sink.error(
                format!(
                    "SSH connection to {host} failed. Register your public key \
                     (`vaultsync show-key`), then run `vaultsync retest`."
                ),
                75,
            );
            return Err(SetupError::AuthFailure { host: host.into() });
        }
        self.sink.success("SSH connection successful!", 75);

        let bootstrapper = Bootstrapper::new(self.executor, self.decider, vault, self.sink);
        let published = bootstrapper.ensure_initial_commit_and_push().await?;

        file.config_mut().set_setup_complete(true);
        file.save()?;
        info!("setup complete");
        self.sink.success(
            "Setup complete! Future runs will sync automatically.",
            100,
        );

        Ok(published)
    }

    fn show_public_key(&self, trust: &TrustEstablisher<'_, E>) {
        match trust.public_key() {
            Ok(key) => {
                self.sink.info("Your public key:", 30);
                self.sink.detail(key);
                self.sink.info(
                    format!(
                        "Add it to your Git host account (GitHub: {KEY_SETTINGS_URL}), \
                         then run `vaultsync retest`."
                    ),
                    30,
                );
            }
            Err(error) => debug!("public key unreadable: {error}"),
        }
    }
}

/// Setup error types.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Required tool is not installed.
    #[error("{0} is not installed, please install it and rerun setup")]
    ToolMissing(String),

    /// Remote host rejected our key.
    #[error("SSH authentication to {host} failed, register your key and run retest")]
    AuthFailure { host: String },

    /// Editor executable cannot be found.
    #[error("editor executable not found")]
    EditorMissing,

    /// No vault folder was selected.
    #[error("no vault folder selected")]
    VaultMissing,

    /// No email address to tag a new key with.
    #[error("no email address provided, key generation canceled")]
    EmailMissing,

    /// Vault folder cannot be created.
    #[error("failed to create vault folder at {:?}", path.display())]
    VaultDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Launch(#[from] LaunchFailure),
}

/// Friendly result alias :3
pub type Result<T, E = SetupError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bootstrap::RemoteLink,
        event::{drain, Level},
        exec::CommandOutput,
        testing::{FakeExecutor, ScriptedDecider},
    };
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, read_to_string, write};
    use tempfile::TempDir;

    const REMOTE_URL: &str = "git@github.com:someone/vault.git";
    const GREETING: &str =
        "Hi someone! You've successfully authenticated, but GitHub does not provide shell access.";

    struct Sandbox {
        root: TempDir,
        ssh: SshPaths,
        editor_pattern: String,
    }

    impl Sandbox {
        fn new() -> anyhow::Result<Self> {
            let root = tempfile::tempdir()?;
            create_dir_all(root.path().join("opt/Obsidian"))?;
            write(root.path().join("opt/Obsidian/obsidian"), "")?;
            create_dir_all(root.path().join("vault"))?;
            let ssh = SshPaths::new(root.path().join(".ssh"));
            let editor_pattern = format!("{}/opt/*/obsidian", root.path().display());

            Ok(Self {
                root,
                ssh,
                editor_pattern,
            })
        }

        fn vault(&self) -> PathBuf {
            self.root.path().join("vault")
        }

        fn config(&self) -> anyhow::Result<ConfigFile> {
            Ok(ConfigFile::load(self.root.path().join("config/config.txt"))?)
        }

        fn add_key(&self) -> anyhow::Result<()> {
            create_dir_all(self.ssh.dir())?;
            write(self.ssh.private_key(), "PRIVATE")?;
            write(self.ssh.public_key(), "ssh-ed25519 AAAAC3Nza someone@example.com\n")?;
            Ok(())
        }
    }

    /// Executor scripted for a fresh vault linked to a fresh remote.
    fn fresh_remote(ssh_answer: CommandOutput) -> FakeExecutor {
        let executor = FakeExecutor::default();
        executor
            .on("git --version", CommandOutput::ok("git version 2.43.0"))
            .on(
                "git rev-parse --is-inside-work-tree",
                CommandOutput::failed(128, "fatal: not a git repository"),
            )
            .on(
                "git remote get-url origin",
                CommandOutput::failed(2, "error: No such remote 'origin'"),
            )
            .on("git remote get-url origin", CommandOutput::ok(REMOTE_URL))
            .on(
                "git rev-parse --verify HEAD",
                CommandOutput::failed(128, "fatal: Needed a single revision"),
            )
            .on("git rev-parse --verify HEAD", CommandOutput::ok("abc123"))
            .on(
                "ssh-keyscan",
                CommandOutput::ok("github.com ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl"),
            )
            .on("ssh -T", ssh_answer)
            .on("git ls-remote --heads origin main", CommandOutput::ok(""));
        executor
    }

    #[tokio::test]
    async fn fresh_setup_publishes_and_completes() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let executor = fresh_remote(CommandOutput::failed(1, GREETING));
        let decider = ScriptedDecider::default()
            .text(sandbox.vault().display().to_string())
            .yes()
            .yes()
            .text("someone@example.com");
        let (sink, mut rx) = EventSink::channel();
        let candidates = [sandbox.editor_pattern.as_str()];
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh)
            .with_editor_candidates(&candidates);
        let options = SetupOptions {
            remote: Some(REMOTE_URL.into()),
            ..Default::default()
        };

        let mut file = sandbox.config()?;
        let report = wizard.run(&mut file, &options).await?;
        assert_eq!(report.editor, sandbox.root.path().join("opt/Obsidian/obsidian"));
        assert_eq!(report.vault, sandbox.vault());
        assert_eq!(report.bootstrap.remote, RemoteLink::Linked(REMOTE_URL.into()));
        assert!(report.bootstrap.placeholder && report.bootstrap.initial_commit);
        assert_eq!(report.key, Some(KeyPair::Generated));
        assert!(report.published);

        assert!(sandbox.vault().join("README.md").exists());
        assert!(read_to_string(sandbox.ssh.known_hosts())?.starts_with("github.com ssh-ed25519"));
        assert_eq!(executor.count("git push -u origin main"), 1);
        assert_eq!(
            executor.count("ssh-keygen -t ed25519 -C someone@example.com"),
            1
        );

        let reloaded = sandbox.config()?;
        assert!(reloaded.config().is_setup_complete());
        assert_eq!(reloaded.config().vault_path()?, Some(sandbox.vault()));

        let last = drain(&mut rx).pop().expect("events were emitted");
        assert_eq!((last.level, last.progress), (Level::Success, 100));

        Ok(())
    }

    #[tokio::test]
    async fn rejected_key_leaves_setup_unfinished() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.add_key()?;
        let executor = fresh_remote(CommandOutput::failed(
            255,
            "git@github.com: Permission denied (publickey).",
        ));
        let decider = ScriptedDecider::default().yes();
        let (sink, _rx) = EventSink::channel();
        let candidates = [sandbox.editor_pattern.as_str()];
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh)
            .with_editor_candidates(&candidates);
        let options = SetupOptions {
            vault: Some(sandbox.vault()),
            remote: Some(REMOTE_URL.into()),
            ..Default::default()
        };

        let mut file = sandbox.config()?;
        let result = wizard.run(&mut file, &options).await;
        assert!(matches!(result, Err(SetupError::AuthFailure { ref host }) if host == "github.com"));
        assert_eq!(executor.count("git push"), 0);
        assert_eq!(executor.count("ssh-keygen -t"), 0);

        let reloaded = sandbox.config()?;
        assert!(!reloaded.config().is_setup_complete());
        assert_eq!(reloaded.config().vault_path()?, Some(sandbox.vault()));

        Ok(())
    }

    #[tokio::test]
    async fn missing_git_aborts_setup() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let executor = FakeExecutor::default();
        executor.on("git --version", CommandOutput::failed(127, "git: command not found"));
        let decider = ScriptedDecider::default();
        let (sink, _rx) = EventSink::channel();
        let candidates = [sandbox.editor_pattern.as_str()];
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh)
            .with_editor_candidates(&candidates);
        let options = SetupOptions {
            vault: Some(sandbox.vault()),
            ..Default::default()
        };

        let mut file = sandbox.config()?;
        let result = wizard.run(&mut file, &options).await;
        assert!(matches!(result, Err(SetupError::ToolMissing(ref tool)) if tool == "git"));
        assert_eq!(executor.count("git init"), 0);

        Ok(())
    }

    #[tokio::test]
    async fn undiscoverable_editor_is_asked_for() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let executor = FakeExecutor::default();
        let decider = ScriptedDecider::default().skip();
        let (sink, _rx) = EventSink::channel();
        let candidates = ["/nowhere/at/all/obsidian"];
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh)
            .with_editor_candidates(&candidates);

        let mut file = sandbox.config()?;
        let result = wizard.run(&mut file, &SetupOptions::default()).await;
        assert!(matches!(result, Err(SetupError::EditorMissing)));
        assert_eq!(decider.prompts().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn unselected_vault_aborts_setup() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let executor = FakeExecutor::default();
        let decider = ScriptedDecider::default().skip();
        let (sink, _rx) = EventSink::channel();
        let candidates = [sandbox.editor_pattern.as_str()];
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh)
            .with_editor_candidates(&candidates);

        let mut file = sandbox.config()?;
        let result = wizard.run(&mut file, &SetupOptions::default()).await;
        assert!(matches!(result, Err(SetupError::VaultMissing)));

        // Editor choice survives the aborted run.
        let reloaded = sandbox.config()?;
        assert_eq!(
            reloaded.config().editor_path()?,
            Some(sandbox.root.path().join("opt/Obsidian/obsidian"))
        );

        Ok(())
    }

    #[tokio::test]
    async fn retest_finishes_setup_once_key_is_accepted() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let executor = FakeExecutor::default();
        executor
            .on("git remote get-url origin", CommandOutput::ok("git@gitlab.com:someone/vault.git"))
            .on("git rev-parse --verify HEAD", CommandOutput::ok("abc123"))
            .on("ssh -T", CommandOutput::failed(1, "Welcome to GitLab, @someone!"))
            .on(
                "git ls-remote --heads origin main",
                CommandOutput::ok("abc123\trefs/heads/main"),
            );
        let decider = ScriptedDecider::default();
        let (sink, _rx) = EventSink::channel();
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh);

        let mut file = sandbox.config()?;
        file.config_mut().set_vault_path(sandbox.vault());
        let published = wizard.retest(&mut file).await?;
        assert!(!published);
        assert_eq!(executor.count("ssh -T -o BatchMode=yes git@gitlab.com"), 1);
        assert!(sandbox.config()?.config().is_setup_complete());

        Ok(())
    }

    #[tokio::test]
    async fn retest_without_vault_is_rejected() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let executor = FakeExecutor::default();
        let decider = ScriptedDecider::default();
        let (sink, _rx) = EventSink::channel();
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh);

        let mut file = sandbox.config()?;
        let result = wizard.retest(&mut file).await;
        assert!(matches!(result, Err(SetupError::VaultMissing)));
        assert_eq!(executor.count("ssh"), 0);

        Ok(())
    }

    #[tokio::test]
    async fn existing_key_is_never_regenerated() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.add_key()?;
        let executor = FakeExecutor::default();
        let decider = ScriptedDecider::default();
        let (sink, _rx) = EventSink::channel();
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh);

        assert_eq!(wizard.generate_key(Some("someone@example.com")).await?, KeyPair::Existing);
        assert_eq!(executor.count("ssh-keygen"), 0);
        assert_eq!(wizard.public_key()?, "ssh-ed25519 AAAAC3Nza someone@example.com");

        Ok(())
    }

    #[tokio::test]
    async fn key_generation_needs_an_email() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let executor = FakeExecutor::default();
        let decider = ScriptedDecider::default().skip();
        let (sink, _rx) = EventSink::channel();
        let wizard = Wizard::new(&executor, &decider, &sink, &sandbox.ssh);

        let result = wizard.generate_key(None).await;
        assert!(matches!(result, Err(SetupError::EmailMissing)));
        assert_eq!(executor.count("ssh-keygen"), 0);

        Ok(())
    }
}
