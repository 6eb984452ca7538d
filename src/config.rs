// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Vaultsync persists a tiny record of where the vault lives, where the editor
//! lives, and whether first-time setup finished. The record is stored as plain
//! `KEY=VALUE` lines so that it stays trivially editable by hand.
//!
//! # Recognized Keys
//!
//! - `VAULT_PATH`: directory under synchronization.
//! - `OBSIDIAN_PATH`: editor executable to launch for each sync cycle.
//! - `SETUP_DONE`: `"1"` once setup verified connectivity, `"0"` otherwise.
//! - `EDITOR_PROCESS`: optional process name to watch instead of the default.
//!
//! Any other key is kept in place, and written back untouched.
//!
//! # Shell Expansion
//!
//! Path values are shell expanded when read, never when written. Thus, a
//! value like `~/notes` survives a write and reload unchanged.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Key for the vault directory.
pub const VAULT_PATH: &str = "VAULT_PATH";

/// Key for the editor executable.
pub const EDITOR_PATH: &str = "OBSIDIAN_PATH";

/// Key for the setup completion flag.
pub const SETUP_DONE: &str = "SETUP_DONE";

/// Key for the optional process name override.
pub const EDITOR_PROCESS: &str = "EDITOR_PROCESS";

/// Persisted configuration record.
///
/// Keeps entries in insertion order so unknown keys are written back where
/// they were found.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Config {
    entries: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entries: vec![
                (VAULT_PATH.into(), String::new()),
                (EDITOR_PATH.into(), String::new()),
                (SETUP_DONE.into(), "0".into()),
            ],
        }
    }
}

impl Config {
    /// Get raw value of target key.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key.as_ref())
            .map(|(_, v)| v.as_str())
    }

    /// Set raw value of target key.
    ///
    /// Replaces the value in place if the key exists, or appends it otherwise.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Iterate over all keys in stored order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Shell expanded vault path, if any.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if expansion fails.
    pub fn vault_path(&self) -> Result<Option<PathBuf>> {
        self.expanded_path(VAULT_PATH)
    }

    /// Shell expanded editor executable path, if any.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if expansion fails.
    pub fn editor_path(&self) -> Result<Option<PathBuf>> {
        self.expanded_path(EDITOR_PATH)
    }

    /// Process name override for the editor, if any.
    pub fn editor_process(&self) -> Option<&str> {
        self.get(EDITOR_PROCESS).filter(|name| !name.is_empty())
    }

    pub fn is_setup_complete(&self) -> bool {
        self.get(SETUP_DONE) == Some("1")
    }

    pub fn set_vault_path(&mut self, path: impl AsRef<Path>) {
        self.set(VAULT_PATH, path.as_ref().to_string_lossy());
    }

    pub fn set_editor_path(&mut self, path: impl AsRef<Path>) {
        self.set(EDITOR_PATH, path.as_ref().to_string_lossy());
    }

    pub fn set_setup_complete(&mut self, done: bool) {
        self.set(SETUP_DONE, if done { "1" } else { "0" });
    }

    fn expanded_path(&self, key: &str) -> Result<Option<PathBuf>> {
        let Some(raw) = self.get(key).filter(|value| !value.is_empty()) else {
            return Ok(None);
        };

        let expanded = shellexpand::full(raw)?;
        Ok(Some(PathBuf::from(expanded.into_owned())))
    }
}

impl From<&str> for Config {
    fn from(data: &str) -> Self {
        let mut config = Config::default();
        for line in data.lines().map(str::trim) {
            // INVARIANT: Lines without a separator or a key carry no entry.
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }

            config.set(key, value.trim());
        }

        config
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for (key, value) in &self.entries {
            writeln!(fmt, "{key}={value}")?;
        }

        Ok(())
    }
}

/// Configuration bound to the file it was loaded from.
///
/// Constructed once at startup and handed by reference to whatever needs to
/// read or update the configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    config: Config,
}

impl ConfigFile {
    /// Load configuration file at target path.
    ///
    /// A missing file yields the default configuration. Nothing is written
    /// until [`ConfigFile::save`] is called.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file exists but cannot be read.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = match read_to_string(&path) {
            Ok(data) => Config::from(data.as_str()),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no configuration at {:?}, using defaults", path.display());
                Config::default()
            }
            Err(source) => return Err(ConfigError::Read { source, path }),
        };

        Ok(Self { path, config })
    }

    /// Write configuration back to its file.
    ///
    /// Creates missing parent directories. The file is replaced through a
    /// rename so a crash never leaves a half written record behind.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Write`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(|source| ConfigError::Write {
                source,
                path: self.path.clone(),
            })?;
        }

        let staging = self.path.with_extension("tmp");
        write(&staging, self.config.to_string())
            .and_then(|()| rename(&staging, &self.path))
            .map_err(|source| ConfigError::Write {
                source,
                path: self.path.clone(),
            })?;
        debug!("saved configuration to {:?}", self.path.display());

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file exists but cannot be read.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written.
    #[error("failed to write configuration at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to perform shell expansion on configuration value.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
