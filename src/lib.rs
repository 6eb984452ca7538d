// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep an editor's vault folder in sync with a remote Git repository.
//!
//! # Sync Cycles
//!
//! Each run of vaultsync is one __sync cycle__ wrapped around one editing
//! session: pull what changed elsewhere, hand the vault to the editor, and
//! commit and push whatever the user changed once the editor closes. See
//! [`sync::Orchestrator`] for the exact steps.
//!
//! Before the first cycle can run, the vault must be a repository the remote
//! host lets us push to. The [`setup::Wizard`] takes care of that once, and
//! records that it did in the configuration file.
//!
//! # Outside World
//!
//! Everything vaultsync does to the outside world goes through two seams:
//! external commands through [`exec::Executor`], and questions to the user
//! through [`prompt::Decider`]. Progress comes back out through an ordered
//! [`event::EventSink`].

pub mod bootstrap;
pub mod config;
pub mod editor;
pub mod event;
pub mod exec;
pub mod git;
pub mod path;
pub mod prompt;
pub mod setup;
pub mod sync;
pub mod trust;
pub mod watch;

#[cfg(test)]
pub(crate) mod testing;
