// Copyright 2022 pyke.io
//           2019-2021 Tauri Programme within The Commons Conservancy
//                     [https://tauri.studio/]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The application runtime core of the Eden desktop shell.
//!
//! Eden hosts third-party applications inside a single top-level window.
//! Each application is a pair of isolated processes — a rendering view and
//! an optional background worker — talking to the shell and to each other
//! over capability-gated message ports. This crate is the host side of
//! that contract:
//!
//! - [`router`] dispatches namespaced commands, evaluating app permissions
//!   and user grants on every call;
//! - [`scope`] stores per-app capabilities and resolves the grants that
//!   unlock them;
//! - [`event`] fans broadcast subjects out to views, workers, the host
//!   shell, and in-process listeners;
//! - [`appbus`] brokers direct peer-to-peer channels between applications;
//! - [`process`] drives view and worker lifecycles with coordinated
//!   teardown;
//! - [`view`] tiles, stacks, and mode-switches the visible views;
//! - [`user`] authenticates users and holds the grants that gate
//!   everything else.
//!
//! [`Shell::new`] assembles the whole core over an [`eden_runtime::Runtime`]
//! implementation.

#![warn(missing_docs)]

pub mod appbus;
mod endpoints;
pub mod error;
pub mod event;
pub mod package;
pub mod process;
pub mod router;
pub mod scope;
pub mod settings;
pub mod shell;
pub mod store;
pub mod user;
mod util;
pub mod view;

pub use eden_runtime as runtime;
pub use eden_utils as utils;
pub use error::{Error, Result};
pub use shell::{Shell, ShellConfig};
