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

use eden_runtime::ViewId;
use eden_utils::manifest::{ManifestError, WindowMode};

/// Runtime errors that can happen inside the Eden core.
///
/// The display strings of command-facing variants are part of the shell's
/// contract: they travel verbatim to callers as rejected command responses.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The command is not registered with the router.
	#[error("Unknown command: {0}")]
	UnknownCommand(String),
	/// The calling app does not hold the permission a command requires.
	#[error("Permission denied: {permission} required for {command}")]
	PermissionDenied {
		/// The missing permission.
		permission: String,
		/// The command that required it.
		command: String
	},
	/// The current user does not hold the grant a command requires.
	#[error("Grant denied: {grant} required for {command}")]
	GrantDenied {
		/// The missing grant key.
		grant: String,
		/// The command that required it.
		command: String
	},
	/// The app already has a live instance.
	#[error("App {0} is already running")]
	AlreadyRunning(String),
	/// The app has no live instance.
	#[error("App {0} is not running")]
	NotRunning(String),
	/// No app with this identifier is installed.
	#[error("App {0} is not installed")]
	UnknownApp(String),
	/// The current user may not launch the app.
	#[error("Not authorized to launch app {0}")]
	NotAuthorized(String),
	/// No view with this id exists.
	#[error("View {0} not found")]
	ViewNotFound(ViewId),
	/// The view's manifest does not allow the requested layout mode.
	#[error("mode {mode:?} is not allowed for app {app_id}")]
	UnsupportedMode {
		/// The app whose manifest rejected the mode.
		app_id: String,
		/// The rejected mode.
		mode: WindowMode
	},
	/// The manifest failed to parse or validate.
	#[error("invalid manifest: {0}")]
	ManifestInvalid(#[from] ManifestError),
	/// No service with this name is exposed.
	#[error("service {0} is not exposed")]
	UnknownService(String),
	/// The service restricts its clients and the caller is not among them.
	#[error("app {app_id} is not allowed to connect to service {service}")]
	ServiceNotAllowed {
		/// The rejected client.
		app_id: String,
		/// The service it tried to reach.
		service: String
	},
	/// Password verification failed.
	#[error("authentication failed for user {0}")]
	AuthFailed(String),
	/// No user with this name exists.
	#[error("user {0} does not exist")]
	UnknownUser(String),
	/// Vendor seats are seed-only: vendors cannot be demoted and standard
	/// users cannot be promoted.
	#[error("illegal role transition for user {0}")]
	IllegalRoleTransition(String),
	/// A port-channel or process-host error.
	#[error(transparent)]
	Runtime(#[from] eden_runtime::Error),
	/// Failed to serialize/deserialize.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
	/// An error raised inside a command handler.
	#[error(transparent)]
	Command(#[from] anyhow::Error)
}

/// Convenience alias for Eden core results.
pub type Result<T> = std::result::Result<T, Error>;
