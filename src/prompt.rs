// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User decisions.
//!
//! Setup needs to ask the user a handful of questions: keep an existing
//! remote, link one now, which email to tag a key with, and so on. Those
//! questions go through the [`Decider`] trait so the code that asks them does
//! not care how they get answered.

use indicatif::ProgressBar;
use inquire::{Confirm, InquireError, Text};
use tracing::{info, instrument};

/// Narrow capability for asking the user things.
pub trait Decider: Send + Sync + 'static {
    /// Ask a yes or no question.
    fn ask_yes_no(&self, prompt: &str) -> Result<bool>;

    /// Ask for a line of text. Empty answers become [`None`].
    fn ask_text(&self, prompt: &str) -> Result<Option<String>>;
}

/// Ask questions on the terminal through inquire.
///
/// Prompts are drawn while the progress bar is suspended, so the two never
/// fight over the terminal.
#[derive(Debug, Clone)]
pub struct InquireDecider {
    bar: ProgressBar,
}

impl InquireDecider {
    /// Construct new terminal decider sharing target progress bar.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    fn blocking<T>(&self, prompt: impl FnOnce() -> T) -> T {
        let ask = || self.bar.suspend(prompt);
        match tokio::runtime::Handle::try_current() {
            Ok(_) => tokio::task::block_in_place(ask),
            Err(_) => ask(),
        }
    }
}

impl Decider for InquireDecider {
    #[instrument(skip(self), level = "debug")]
    fn ask_yes_no(&self, prompt: &str) -> Result<bool> {
        let answer = self.blocking(|| Confirm::new(prompt).with_default(false).prompt())?;
        info!("{prompt} {}", if answer { "yes" } else { "no" });
        Ok(answer)
    }

    #[instrument(skip(self), level = "debug")]
    fn ask_text(&self, prompt: &str) -> Result<Option<String>> {
        let answer = self.blocking(|| Text::new(prompt).prompt_skippable())?;
        Ok(answer
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }
}

/// User decision error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// User interrupted the prompt.
    #[error("prompt canceled by user")]
    Canceled,

    /// Prompt could not be shown.
    #[error(transparent)]
    Inquire(InquireError),
}

impl From<InquireError> for PromptError {
    fn from(error: InquireError) -> Self {
        match error {
            InquireError::OperationCanceled | InquireError::OperationInterrupted => Self::Canceled,
            other => Self::Inquire(other),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;
