// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Editor installation discovery.
//!
//! Looks for the editor executable in the places its installers usually put
//! it. Candidates are glob patterns that may reference the home directory or
//! environment variables, expanded before matching. A candidate naming an
//! unset variable is skipped.

use glob::glob;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Conventional install locations on this platform, most preferred first.
#[cfg(target_os = "windows")]
pub const CANDIDATES: &[&str] = &[
    "${LOCALAPPDATA}/Programs/Obsidian/Obsidian.exe",
    "${PROGRAMFILES}/Obsidian/Obsidian.exe",
    "${PROGRAMFILES(X86)}/Obsidian/Obsidian.exe",
];

/// Conventional install locations on this platform, most preferred first.
#[cfg(target_os = "macos")]
pub const CANDIDATES: &[&str] = &[
    "/Applications/Obsidian.app/Contents/MacOS/Obsidian",
    "~/Applications/Obsidian.app/Contents/MacOS/Obsidian",
];

/// Conventional install locations on this platform, most preferred first.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const CANDIDATES: &[&str] = &[
    "/usr/bin/obsidian",
    "/usr/local/bin/obsidian",
    "/opt/Obsidian/obsidian",
    "/opt/obsidian/obsidian",
    "/snap/bin/obsidian",
    "~/.local/bin/obsidian",
    "~/Applications/Obsidian*.AppImage",
    "~/.local/share/flatpak/exports/bin/md.obsidian.Obsidian",
    "/var/lib/flatpak/exports/bin/md.obsidian.Obsidian",
];

/// Find the editor in its conventional install locations.
///
/// # Errors
///
/// - Return [`DiscoveryError`] if a candidate is not a valid glob pattern.
pub fn discover() -> Result<Option<PathBuf>> {
    discover_in(CANDIDATES)
}

/// Find first existing file matched by target candidate patterns.
///
/// Matches of one pattern are taken in sorted order.
///
/// # Errors
///
/// - Return [`DiscoveryError`] if a candidate is not a valid glob pattern.
#[instrument(skip(candidates), level = "debug")]
pub fn discover_in(candidates: &[&str]) -> Result<Option<PathBuf>> {
    for candidate in candidates {
        let pattern = match shellexpand::full(candidate) {
            Ok(pattern) => pattern,
            Err(error) => {
                debug!("skip {candidate}: {error}");
                continue;
            }
        };

        let mut matches = glob(&pattern)?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        matches.sort();

        if let Some(found) = matches.into_iter().next() {
            debug!("found editor at {found:?}");
            return Ok(Some(found));
        }
    }

    Ok(None)
}

/// Editor discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Candidate is not a valid glob pattern.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// Friendly result alias :3
pub type Result<T, E = DiscoveryError> = std::result::Result<T, E>;
