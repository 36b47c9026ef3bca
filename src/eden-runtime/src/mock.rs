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

//! An in-memory [`Runtime`] for tests.
//!
//! Views and workers are plain records; their process sides are pumped
//! [`PortChannel`]s the test can drive directly. By default a created view
//! immediately reports `view-loaded` and a spawned worker immediately posts
//! `backend-ready`; tests override either with
//! [`MockRuntime::set_auto_load`] and [`MockRuntime::on_worker_spawn`].

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex
	}
};

use eden_utils::{manifest::FrontendEntry, Position, Rect};
use serde_json::json;

use crate::{
	error::Result,
	port::{Port, PortChannel},
	transfer::{PortMailbox, PortTransfer},
	PendingView, Runtime, ViewHandle, ViewId, WorkerHandle, WorkerSpec
};

/// A scripted worker behaviour, run once at spawn with the worker's
/// process-side handle.
pub type WorkerScript = Arc<dyn Fn(MockWorker) + Send + Sync>;

struct MockViewInner {
	id: ViewId,
	app_id: String,
	entry: Option<FrontendEntry>,
	bounds: Mutex<Rect>,
	visible: AtomicBool,
	zoom: Mutex<f64>,
	channel: PortChannel,
	mailbox: PortMailbox,
	closed: AtomicBool
}

/// The mock view handle; doubles as the test's grip on the "view process".
#[derive(Clone)]
pub struct MockView {
	inner: Arc<MockViewInner>
}

impl MockView {
	/// The owning application.
	pub fn app_id(&self) -> &str {
		&self.inner.app_id
	}

	/// The frontend entry the view was created with.
	pub fn entry(&self) -> Option<&FrontendEntry> {
		self.inner.entry.as_ref()
	}

	/// The view's current bounds.
	pub fn bounds(&self) -> Rect {
		*self.inner.bounds.lock().unwrap()
	}

	/// Whether the view is currently shown.
	pub fn visible(&self) -> bool {
		self.inner.visible.load(Ordering::SeqCst)
	}

	/// The view's current zoom factor.
	pub fn zoom(&self) -> f64 {
		*self.inner.zoom.lock().unwrap()
	}

	/// Whether the view has been destroyed.
	pub fn closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	/// The view process's channel to the shell.
	pub fn channel(&self) -> &PortChannel {
		&self.inner.channel
	}

	/// The view process's port mailbox.
	pub fn mailbox(&self) -> &PortMailbox {
		&self.inner.mailbox
	}
}

impl ViewHandle for MockView {
	fn id(&self) -> ViewId {
		self.inner.id
	}

	fn set_bounds(&self, bounds: Rect) -> Result<()> {
		*self.inner.bounds.lock().unwrap() = bounds;
		Ok(())
	}

	fn set_visible(&self, visible: bool) -> Result<()> {
		self.inner.visible.store(visible, Ordering::SeqCst);
		Ok(())
	}

	fn set_zoom(&self, factor: f64) -> Result<()> {
		*self.inner.zoom.lock().unwrap() = factor;
		Ok(())
	}

	fn transfer_port(&self, transfer: PortTransfer) -> Result<()> {
		self.inner.mailbox.deliver(transfer);
		Ok(())
	}

	fn close(&self) -> Result<()> {
		self.inner.closed.store(true, Ordering::SeqCst);
		self.inner.channel.close();
		Ok(())
	}
}

struct MockWorkerInner {
	app_id: String,
	channel: PortChannel,
	mailbox: PortMailbox,
	app_port: Mutex<Option<Port>>,
	exit_callbacks: Mutex<Vec<Box<dyn FnOnce(i32) + Send>>>,
	killed: AtomicBool,
	exited: AtomicBool
}

/// The mock worker handle; doubles as the test's grip on the "worker
/// process".
#[derive(Clone)]
pub struct MockWorker {
	inner: Arc<MockWorkerInner>
}

impl MockWorker {
	/// The worker process's parent channel to the shell.
	pub fn channel(&self) -> &PortChannel {
		&self.inner.channel
	}

	/// The worker process's port mailbox.
	pub fn mailbox(&self) -> &PortMailbox {
		&self.inner.mailbox
	}

	/// Takes the worker's end of the pre-allocated worker↔view channel.
	pub fn take_app_port(&self) -> Option<Port> {
		self.inner.app_port.lock().unwrap().take()
	}

	/// Whether the worker has been killed or has exited.
	pub fn terminated(&self) -> bool {
		self.inner.killed.load(Ordering::SeqCst) || self.inner.exited.load(Ordering::SeqCst)
	}

	/// Simulates an unexpected process exit with the given code, firing
	/// the registered exit callbacks. A no-op for killed workers.
	pub fn simulate_exit(&self, code: i32) {
		if self.inner.killed.load(Ordering::SeqCst) || self.inner.exited.swap(true, Ordering::SeqCst) {
			return;
		}
		self.inner.app_port.lock().unwrap().take();
		self.inner.channel.close();
		let callbacks: Vec<_> = self.inner.exit_callbacks.lock().unwrap().drain(..).collect();
		for callback in callbacks {
			callback(code);
		}
	}
}

impl WorkerHandle for MockWorker {
	fn app_id(&self) -> &str {
		&self.inner.app_id
	}

	fn transfer_port(&self, transfer: PortTransfer) -> Result<()> {
		self.inner.mailbox.deliver(transfer);
		Ok(())
	}

	fn on_exit(&self, callback: Box<dyn FnOnce(i32) + Send>) {
		self.inner.exit_callbacks.lock().unwrap().push(callback);
	}

	fn kill(&self) -> Result<()> {
		if self.inner.killed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		self.inner.exit_callbacks.lock().unwrap().clear();
		self.inner.app_port.lock().unwrap().take();
		self.inner.channel.close();
		Ok(())
	}
}

#[derive(Default)]
struct MockRuntimeInner {
	workspace: Mutex<Option<Rect>>,
	cursor: Mutex<Position>,
	mouse_pressed: AtomicBool,
	views: Mutex<HashMap<ViewId, MockView>>,
	workers: Mutex<HashMap<String, MockWorker>>,
	stacking: Mutex<Vec<ViewId>>,
	manual_load: AtomicBool,
	worker_scripts: Mutex<HashMap<String, WorkerScript>>
}

/// An in-memory runtime for driving the Eden core in tests.
#[derive(Clone, Default)]
pub struct MockRuntime {
	inner: Arc<MockRuntimeInner>
}

impl MockRuntime {
	/// Creates a mock runtime with a 1920×1080 workspace.
	pub fn new() -> Self {
		Self::default()
	}

	/// Overrides the workspace rectangle.
	pub fn set_workspace(&self, workspace: Rect) {
		*self.inner.workspace.lock().unwrap() = Some(workspace);
	}

	/// Moves the mock cursor.
	pub fn set_cursor(&self, position: Position) {
		*self.inner.cursor.lock().unwrap() = position;
	}

	/// Presses or releases the mock primary mouse button.
	pub fn set_mouse_pressed(&self, pressed: bool) {
		self.inner.mouse_pressed.store(pressed, Ordering::SeqCst);
	}

	/// When `auto` is false, created views no longer report `view-loaded`
	/// on their own; the test drives the view channel instead.
	pub fn set_auto_load(&self, auto: bool) {
		self.inner.manual_load.store(!auto, Ordering::SeqCst);
	}

	/// Installs a scripted behaviour for the next spawns of the given
	/// app's worker, replacing the default `backend-ready` post.
	pub fn on_worker_spawn<F: Fn(MockWorker) + Send + Sync + 'static>(&self, app_id: &str, script: F) {
		self.inner.worker_scripts.lock().unwrap().insert(app_id.to_string(), Arc::new(script));
	}

	/// The view with the given id, if it was ever created.
	pub fn view(&self, id: ViewId) -> Option<MockView> {
		self.inner.views.lock().unwrap().get(&id).cloned()
	}

	/// The most recently spawned worker of the given app.
	pub fn worker(&self, app_id: &str) -> Option<MockWorker> {
		self.inner.workers.lock().unwrap().get(app_id).cloned()
	}

	/// The bottom-to-top order of the last restack.
	pub fn stacking(&self) -> Vec<ViewId> {
		self.inner.stacking.lock().unwrap().clone()
	}
}

impl Runtime for MockRuntime {
	type View = MockView;
	type Worker = MockWorker;

	fn create_view(&self, pending: PendingView) -> Result<MockView> {
		let channel = PortChannel::attach(pending.port);
		let view = MockView {
			inner: Arc::new(MockViewInner {
				id: pending.id,
				app_id: pending.app_id,
				entry: pending.entry,
				bounds: Mutex::new(pending.bounds),
				visible: AtomicBool::new(pending.visible),
				zoom: Mutex::new(pending.zoom),
				channel,
				mailbox: PortMailbox::new(),
				closed: AtomicBool::new(false)
			})
		};
		if !self.inner.manual_load.load(Ordering::SeqCst) {
			view.inner.channel.send("view-loaded", json!({}));
		}
		self.inner.views.lock().unwrap().insert(pending.id, view.clone());
		Ok(view)
	}

	fn spawn_worker(&self, spec: WorkerSpec) -> Result<MockWorker> {
		let worker = MockWorker {
			inner: Arc::new(MockWorkerInner {
				app_id: spec.app_id.clone(),
				channel: PortChannel::attach(spec.channel),
				mailbox: PortMailbox::new(),
				app_port: Mutex::new(spec.app_port),
				exit_callbacks: Mutex::new(Vec::new()),
				killed: AtomicBool::new(false),
				exited: AtomicBool::new(false)
			})
		};
		let script = self.inner.worker_scripts.lock().unwrap().get(&spec.app_id).cloned();
		match script {
			Some(script) => script(worker.clone()),
			None => worker.inner.channel.send("backend-ready", json!({}))
		}
		self.inner.workers.lock().unwrap().insert(spec.app_id, worker.clone());
		Ok(worker)
	}

	fn workspace(&self) -> Rect {
		self.inner.workspace.lock().unwrap().unwrap_or(Rect::new(0.0, 0.0, 1920.0, 1080.0))
	}

	fn cursor_position(&self) -> Position {
		*self.inner.cursor.lock().unwrap()
	}

	fn mouse_pressed(&self) -> bool {
		self.inner.mouse_pressed.load(Ordering::SeqCst)
	}

	fn restack(&self, order: &[ViewId]) -> Result<()> {
		*self.inner.stacking.lock().unwrap() = order.to_vec();
		Ok(())
	}
}
