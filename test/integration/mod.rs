// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

#[cfg(unix)]
mod bootstrap;
#[cfg(unix)]
mod setup;
#[cfg(unix)]
mod sync;
