// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Scripted stand-ins for the outside world used by unit tests.

use crate::{
    exec::{CommandOutput, CommandSpec, Executor, LaunchFailure, Result},
    prompt::{Decider, PromptError, Result as PromptResult},
};

use std::{collections::VecDeque, sync::Mutex};

/// Executor answering commands from a script.
///
/// Responses are matched by the longest registered prefix of the rendered
/// command line. Queued responses are handed out in order, and the last one
/// repeats. Commands without a script succeed with empty output.
#[derive(Debug, Default)]
pub(crate) struct FakeExecutor {
    rules: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    specs: Mutex<Vec<CommandSpec>>,
    spawned: Mutex<Vec<CommandSpec>>,
    spawn_fails: Mutex<bool>,
}

impl FakeExecutor {
    pub(crate) fn on(&self, prefix: impl Into<String>, output: CommandOutput) -> &Self {
        let prefix = prefix.into();
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, responses)) => responses.push_back(output),
            None => rules.push((prefix, VecDeque::from([output]))),
        }

        self
    }

    pub(crate) fn fail_spawns(&self) {
        *self.spawn_fails.lock().unwrap() = true;
    }

    pub(crate) fn specs(&self) -> Vec<CommandSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Rendered command lines in the order they ran.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.specs().iter().map(ToString::to_string).collect()
    }

    pub(crate) fn spawned(&self) -> Vec<String> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Number of calls whose command line starts with target prefix.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn respond(&self, line: &str) -> CommandOutput {
        let mut rules = self.rules.lock().unwrap();
        let best = rules
            .iter_mut()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match best {
            Some((_, responses)) if responses.len() > 1 => responses.pop_front().unwrap(),
            Some((_, responses)) => responses.front().cloned().unwrap_or_default(),
            None => CommandOutput::default(),
        }
    }
}

impl Executor for FakeExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.specs.lock().unwrap().push(spec.clone());
        Ok(self.respond(&spec.to_string()))
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> Result<()> {
        if *self.spawn_fails.lock().unwrap() {
            return Err(LaunchFailure {
                command: spec.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        self.spawned.lock().unwrap().push(spec.clone());
        Ok(())
    }
}

/// Decider answering questions from a script.
///
/// Running out of scripted answers cancels the prompt.
#[derive(Debug, Default)]
pub(crate) struct ScriptedDecider {
    yes_no: Mutex<VecDeque<bool>>,
    texts: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedDecider {
    pub(crate) fn yes(self) -> Self {
        self.yes_no.lock().unwrap().push_back(true);
        self
    }

    pub(crate) fn no(self) -> Self {
        self.yes_no.lock().unwrap().push_back(false);
        self
    }

    pub(crate) fn text(self, answer: impl Into<String>) -> Self {
        self.texts.lock().unwrap().push_back(Some(answer.into()));
        self
    }

    /// Leave the next text question unanswered.
    pub(crate) fn skip(self) -> Self {
        self.texts.lock().unwrap().push_back(None);
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Decider for ScriptedDecider {
    fn ask_yes_no(&self, prompt: &str) -> PromptResult<bool> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.yes_no
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(PromptError::Canceled)
    }

    fn ask_text(&self, prompt: &str) -> PromptResult<Option<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.texts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(PromptError::Canceled)
    }
}
