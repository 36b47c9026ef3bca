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

/// Errors that can happen at the runtime boundary: port channels, view
/// hosts, and worker processes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A request handler is already installed for the method.
	#[error("Handler already registered for method {0}")]
	HandlerAlreadyRegistered(String),
	/// A correlated request did not complete within its timeout.
	#[error("Request {0} timed out")]
	RequestTimeout(String),
	/// The peer has no request handler installed for the method.
	#[error("No handler registered for method {0}")]
	NoHandler(String),
	/// The port was closed before or during the operation.
	#[error("connection closed")]
	ConnectionClosed,
	/// A transferred port did not arrive in time.
	#[error("Port for connection {connection_id} not received within {timeout_ms}ms")]
	PortArrivalTimeout {
		/// The connection the port was expected for.
		connection_id: String,
		/// How long the endpoint waited.
		timeout_ms: u64
	},
	/// The peer's handler reported an error.
	#[error("{0}")]
	Remote(String),
	/// The view host failed to create a view.
	#[error("failed to create view: {0}")]
	CreateView(String),
	/// The process host failed to spawn a worker.
	#[error("failed to spawn worker: {0}")]
	SpawnWorker(String)
}

/// Prefix of the error string a responder sends when no handler is
/// installed; the requesting end folds it back into [`Error::NoHandler`].
pub(crate) const NO_HANDLER_PREFIX: &str = "No handler registered for method ";

impl Error {
	/// Maps an error string received from the peer back into a typed error.
	pub(crate) fn from_remote(message: String) -> Self {
		match message.strip_prefix(NO_HANDLER_PREFIX) {
			Some(method) => Self::NoHandler(method.to_string()),
			None => Self::Remote(message)
		}
	}
}

/// Convenience alias for runtime-boundary results.
pub type Result<T> = std::result::Result<T, Error>;
