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

//! Runtime abstraction layer for the Eden application runtime.
//!
//! The `eden` crate drives everything through the [`Runtime`] trait: view
//! hosting, worker process spawning, cursor polling, and out-of-band port
//! transfer. The host shell plugs in a real windowing/process
//! implementation; tests use the in-memory [`mock`] runtime.

#![warn(missing_docs)]

use eden_utils::{manifest::FrontendEntry, Position, Rect};

pub mod error;
pub mod mock;
pub mod port;
pub mod transfer;

pub use error::{Error, Result};
pub use port::{ListenerId, Port, PortChannel, PortMessage, DEFAULT_REQUEST_TIMEOUT};
pub use transfer::{PortMailbox, PortRole, PortTransfer};

/// Identifies a view within the host window. `-1` is reserved for
/// worker-only app instances.
pub type ViewId = i64;

/// Everything the runtime needs to materialise a view.
pub struct PendingView {
	/// The view id assigned by the view manager.
	pub id: ViewId,
	/// The owning application.
	pub app_id: String,
	/// The frontend to load, if any.
	pub entry: Option<FrontendEntry>,
	/// Initial bounds in workspace coordinates.
	pub bounds: Rect,
	/// Initial visibility.
	pub visible: bool,
	/// Initial zoom factor.
	pub zoom: f64,
	/// Whether the shell API bridge is injected.
	pub inject_api: bool,
	/// Whether the shell theme variables are injected.
	pub inject_theme: bool,
	/// The view process's end of the shell↔view channel. The shell keeps
	/// and pumps the other end before this view is created, so no message
	/// can be lost to a registration race.
	pub port: Port
}

/// Everything the runtime needs to spawn a worker process.
pub struct WorkerSpec {
	/// The owning application.
	pub app_id: String,
	/// Package-relative worker entry point, exported to the process
	/// environment.
	pub entry: String,
	/// The serialised manifest, exported to the process environment.
	pub manifest_json: String,
	/// The worker process's end of the shell↔worker parent channel.
	pub channel: Port,
	/// The worker's end of the pre-allocated worker↔view channel, present
	/// when the app also has a frontend.
	pub app_port: Option<Port>
}

/// A live view hosted inside the top-level window.
pub trait ViewHandle: Clone + Send + Sync + 'static {
	/// The view id this handle controls.
	fn id(&self) -> ViewId;
	/// Moves and resizes the view.
	fn set_bounds(&self, bounds: Rect) -> Result<()>;
	/// Shows or hides the view.
	fn set_visible(&self, visible: bool) -> Result<()>;
	/// Applies a zoom factor to the view's content.
	fn set_zoom(&self, factor: f64) -> Result<()>;
	/// Hands a port to the view process out-of-band.
	fn transfer_port(&self, transfer: PortTransfer) -> Result<()>;
	/// Destroys the view.
	fn close(&self) -> Result<()>;
}

/// A live worker process.
pub trait WorkerHandle: Send + Sync + 'static {
	/// The owning application.
	fn app_id(&self) -> &str;
	/// Hands a port to the worker process out-of-band.
	fn transfer_port(&self, transfer: PortTransfer) -> Result<()>;
	/// Registers the callback fired when the process exits unexpectedly
	/// with its exit code. Termination through [`kill`](Self::kill) does
	/// not fire it.
	fn on_exit(&self, callback: Box<dyn FnOnce(i32) + Send>);
	/// Terminates the process.
	fn kill(&self) -> Result<()>;
}

/// The host environment the Eden core drives.
pub trait Runtime: Send + Sync + Sized + 'static {
	/// The view handle type of this runtime.
	type View: ViewHandle;
	/// The worker handle type of this runtime.
	type Worker: WorkerHandle;

	/// Creates a view inside the host window.
	fn create_view(&self, pending: PendingView) -> Result<Self::View>;
	/// Spawns a worker process.
	fn spawn_worker(&self, spec: WorkerSpec) -> Result<Self::Worker>;
	/// The workspace rectangle views are laid out in.
	fn workspace(&self) -> Rect;
	/// The current cursor position, polled by the mouse tracker.
	fn cursor_position(&self) -> Position;
	/// Whether the primary mouse button is currently held.
	fn mouse_pressed(&self) -> bool;
	/// Re-inserts every alive view into the host window in the given
	/// bottom-to-top order.
	fn restack(&self, order: &[ViewId]) -> Result<()>;
}
