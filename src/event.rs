// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Progress event stream.
//!
//! Long running work (setup and sync cycles) reports what it is doing through
//! an ordered channel of [`Event`]s instead of drawing anything itself. The
//! receiving side decides how to render them.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Ordinary step narration.
    Info,

    /// Step finished in the best possible way.
    Success,

    /// Something went wrong, but work continues.
    Warning,

    /// Work was aborted.
    Error,

    /// File level detail line, e.g., one changed path.
    Detail,
}

impl Display for Level {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Info => "info",
            Self::Success => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Detail => "  ✓",
        })
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub message: String,

    /// Overall progress in percent, never lower than any earlier event.
    pub progress: u8,
}

/// Sending half of the event stream.
///
/// Clamps progress so that it never moves backwards, and never exceeds 100.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<Event>,
    progress: Arc<AtomicU8>,
}

impl EventSink {
    /// Construct new event stream.
    pub fn channel() -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = unbounded_channel();
        let sink = Self {
            tx,
            progress: Arc::new(AtomicU8::new(0)),
        };

        (sink, rx)
    }

    /// Emit event, advancing progress to at least target value.
    pub fn emit(&self, level: Level, message: impl Into<String>, progress: Option<u8>) {
        let message = message.into();
        let progress = match progress {
            Some(target) => {
                let target = target.min(100);
                self.progress.fetch_max(target, Ordering::SeqCst).max(target)
            }
            None => self.progress.load(Ordering::SeqCst),
        };
        debug!(%level, progress, "{message}");

        // INVARIANT: A closed receiver only means nobody is watching anymore.
        let _ = self.tx.send(Event {
            level,
            message,
            progress,
        });
    }

    pub fn info(&self, message: impl Into<String>, progress: u8) {
        self.emit(Level::Info, message, Some(progress));
    }

    pub fn success(&self, message: impl Into<String>, progress: u8) {
        self.emit(Level::Success, message, Some(progress));
    }

    pub fn warn(&self, message: impl Into<String>, progress: u8) {
        self.emit(Level::Warning, message, Some(progress));
    }

    pub fn error(&self, message: impl Into<String>, progress: u8) {
        self.emit(Level::Error, message, Some(progress));
    }

    pub fn detail(&self, message: impl Into<String>) {
        self.emit(Level::Detail, message, None);
    }

    /// Current progress value.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }
}

/// Drain every event currently buffered in the receiver.
pub fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    events
}
