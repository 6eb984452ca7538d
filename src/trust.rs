// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! SSH trust establishment.
//!
//! Pushing and pulling over SSH needs three things in place: the remote host
//! must already be trusted (or ssh stops to ask about its fingerprint), the
//! user needs a key pair, and the remote host must accept that key. This
//! module checks and establishes each of them through the ssh tool suite.
//!
//! # Connectivity Detection
//!
//! Git hosts refuse shell access, so `ssh -T` always exits with a nonzero
//! status even when authentication worked. The only reliable signal is the
//! greeting the host prints. We look for any of a small set of known
//! greetings, compared case insensitively. This is inherently tied to what
//! the hosts choose to print.

use crate::{
    event::EventSink,
    exec::{CommandSpec, Executor, LaunchFailure},
};

use std::{
    fs::{read, read_to_string, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, instrument};

/// Host used when a remote URL names none.
pub const DEFAULT_HOST: &str = "github.com";

/// Time limit for any single ssh tool invocation.
pub const SSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Greetings that mean the host accepted our key.
const AUTHENTICATED_MARKERS: &[&str] = &[
    "successfully authenticated",
    "welcome to gitlab",
    "authenticated via ssh key",
];

/// Locations of SSH files vaultsync manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPaths {
    dir: PathBuf,
}

impl SshPaths {
    /// Construct SSH paths rooted at target directory, e.g., `~/.ssh`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn known_hosts(&self) -> PathBuf {
        self.dir.join("known_hosts")
    }

    pub fn private_key(&self) -> PathBuf {
        self.dir.join("id_ed25519")
    }

    pub fn public_key(&self) -> PathBuf {
        self.dir.join("id_ed25519.pub")
    }
}

/// Outcome of making sure a host is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTrust {
    /// Host key was already in the trust store.
    AlreadyTrusted,

    /// Host key was fetched and appended.
    Added,

    /// Host key could not be fetched.
    Unavailable,
}

/// Outcome of making sure a key pair exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPair {
    Existing,
    Generated,
}

/// Establish trusted, authenticated SSH connectivity.
#[derive(Debug)]
pub struct TrustEstablisher<'a, E>
where
    E: Executor,
{
    executor: &'a E,
    paths: &'a SshPaths,
    sink: &'a EventSink,
}

impl<'a, E> TrustEstablisher<'a, E>
where
    E: Executor,
{
    pub fn new(executor: &'a E, paths: &'a SshPaths, sink: &'a EventSink) -> Self {
        Self {
            executor,
            paths,
            sink,
        }
    }

    /// Make sure target host is present in the trust store.
    ///
    /// Failing to fetch the host key is only a warning. If trust was really
    /// needed, the connectivity test fails loudly afterwards.
    ///
    /// # Errors
    ///
    /// - Return [`TrustError::Launch`] if the ssh tools cannot be started.
    /// - Return [`TrustError::SshFile`] if the trust store cannot be
    ///   read or written.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_host_trusted(&self, host: &str) -> Result<HostTrust> {
        let known_hosts = self.paths.known_hosts();
        if self.is_host_trusted(host, &known_hosts).await? {
            debug!("{host} already trusted");
            return Ok(HostTrust::AlreadyTrusted);
        }

        self.sink
            .info(format!("Adding {host} to known hosts (ssh-keyscan)..."), 32);
        let scan = CommandSpec::new("ssh-keyscan")
            .args(["-t", "ed25519,rsa", host])
            .timeout(SSH_TIMEOUT);
        let output = self.executor.run(&scan).await?;
        let keys = output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .collect::<Vec<_>>();
        if !output.success() || keys.is_empty() {
            self.sink.warn(
                format!("Could not fetch the host key of {host} automatically."),
                32,
            );
            return Ok(HostTrust::Unavailable);
        }

        mkdirp::mkdirp(self.paths.dir()).map_err(|source| TrustError::SshFile {
            source,
            path: known_hosts.clone(),
        })?;

        // INVARIANT: Appended entries always start on a fresh line.
        let unterminated = match read(&known_hosts) {
            Ok(bytes) => bytes.last().is_some_and(|byte| *byte != b'\n'),
            Err(error) if error.kind() == ErrorKind::NotFound => false,
            Err(source) => {
                return Err(TrustError::SshFile {
                    source,
                    path: known_hosts,
                })
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&known_hosts)
            .map_err(|source| TrustError::SshFile {
                source,
                path: known_hosts.clone(),
            })?;
        if unterminated {
            writeln!(file).map_err(|source| TrustError::SshFile {
                source,
                path: known_hosts.clone(),
            })?;
        }
        for key in keys {
            writeln!(file, "{key}").map_err(|source| TrustError::SshFile {
                source,
                path: known_hosts.clone(),
            })?;
        }

        Ok(HostTrust::Added)
    }

    async fn is_host_trusted(&self, host: &str, known_hosts: &Path) -> Result<bool> {
        let contents = match read_to_string(known_hosts) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(TrustError::SshFile {
                    source,
                    path: known_hosts.to_path_buf(),
                })
            }
        };

        if contents.lines().any(|line| entry_names_host(line, host)) {
            return Ok(true);
        }

        // INVARIANT: Hashed entries can only be matched by ssh-keygen itself.
        if contents.lines().any(|line| line.starts_with("|1|")) {
            let lookup = CommandSpec::new("ssh-keygen")
                .arg("-F")
                .arg(host)
                .arg("-f")
                .arg(known_hosts)
                .timeout(SSH_TIMEOUT);
            let output = self.executor.run(&lookup).await?;
            return Ok(output.success() && !output.stdout.trim().is_empty());
        }

        Ok(false)
    }

    /// Make sure a key pair exists, generating one if needed.
    ///
    /// An existing key pair is never regenerated or overwritten.
    ///
    /// # Errors
    ///
    /// - Return [`TrustError::Launch`] if ssh-keygen cannot be started.
    /// - Return [`TrustError::KeyGen`] if ssh-keygen fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_key_pair(&self, email: &str) -> Result<KeyPair> {
        let private_key = self.paths.private_key();
        if private_key.exists() {
            debug!("key pair at {:?} already exists", private_key.display());
            return Ok(KeyPair::Existing);
        }

        self.sink.info("Generating SSH key...", 25);
        mkdirp::mkdirp(self.paths.dir()).map_err(|source| TrustError::SshFile {
            source,
            path: self.paths.dir().to_path_buf(),
        })?;
        let keygen = CommandSpec::new("ssh-keygen")
            .args(["-t", "ed25519", "-C", email, "-N", "", "-f"])
            .arg(&private_key)
            .timeout(SSH_TIMEOUT);
        let output = self.executor.run(&keygen).await?;
        if !output.success() {
            return Err(TrustError::KeyGen(output.reason().to_string()));
        }
        self.sink.success(
            format!("SSH key generated at {}.", self.paths.public_key().display()),
            28,
        );

        Ok(KeyPair::Generated)
    }

    /// Check whether target host accepts our key.
    ///
    /// # Errors
    ///
    /// - Return [`TrustError::Launch`] if ssh cannot be started.
    #[instrument(skip(self), level = "debug")]
    pub async fn test_connectivity(&self, host: &str) -> Result<bool> {
        let greeting = CommandSpec::new("ssh")
            .args(["-T", "-o", "BatchMode=yes"])
            .arg(format!("git@{host}"))
            .timeout(SSH_TIMEOUT);
        let output = self.executor.run(&greeting).await?;
        debug!(status = output.status, "ssh -T said: {}", output.combined());

        Ok(AUTHENTICATED_MARKERS
            .iter()
            .any(|marker| output.mentions(marker)))
    }

    /// Read public half of the key pair.
    ///
    /// # Errors
    ///
    /// - Return [`TrustError::MissingKey`] if no public key exists.
    pub fn public_key(&self) -> Result<String> {
        let path = self.paths.public_key();
        read_to_string(&path)
            .map(|key| key.trim().to_string())
            .map_err(|source| TrustError::MissingKey { source, path })
    }
}

/// Determine SSH host named by a remote URL.
///
/// Understands scp-like syntax (`git@host:owner/repo.git`) and `ssh://` URLs.
/// Anything else, e.g., HTTPS URLs, yields [`None`].
pub fn host_from_remote_url(url: &str) -> Option<String> {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("ssh://") {
        let authority = rest.split('/').next()?;
        let host = authority.rsplit('@').next()?;
        let host = host.split(':').next()?;
        return (!host.is_empty()).then(|| host.to_string());
    }

    if url.contains("://") {
        return None;
    }

    let (user_host, _) = url.split_once(':')?;
    let host = user_host.rsplit('@').next()?;
    (!host.is_empty() && !host.contains('/')).then(|| host.to_string())
}

fn entry_names_host(line: &str, host: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return false;
    }

    let Some(hosts) = line.split_whitespace().next() else {
        return false;
    };
    hosts.split(',').any(|entry| {
        entry == host || entry.strip_prefix('[').is_some_and(|rest| rest.starts_with(&format!("{host}]")))
    })
}

/// Trust establishment error types.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// SSH tools cannot be started.
    #[error(transparent)]
    Launch(#[from] LaunchFailure),

    /// SSH directory or trust store cannot be read or written.
    #[error("failed to access SSH file at {:?}", path.display())]
    SshFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Key generation failed.
    #[error("ssh-keygen failed: {0}")]
    KeyGen(String),

    /// Public key cannot be read.
    #[error("no SSH public key at {:?}, generate one first", path.display())]
    MissingKey {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TrustError> = std::result::Result<T, E>;
