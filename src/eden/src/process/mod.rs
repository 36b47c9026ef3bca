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

//! Process lifecycle.
//!
//! Each application runs as at most two processes: a view and an optional
//! worker. Launching starts the worker first (waiting for `backend-ready`),
//! then the view, and transfers the worker's pre-allocated port to the view
//! once it reports loaded — the sole moment a port transfer may occur.
//! Stopping removes the view before terminating the worker so the worker
//! never crashes under its consumers. Launches are serialised per app id,
//! and a session change drains every running app before new launches may
//! begin.

use std::{
	collections::HashMap,
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, Weak
	},
	time::Duration
};

use once_cell::sync::OnceCell;

use eden_runtime::{Port, PortChannel, PortRole, PortTransfer, Runtime, ViewId, WorkerHandle};
use eden_utils::{manifest::Manifest, Rect};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::{
	appbus::{AppBusHost, PortDispatcher},
	error::{Error, Result},
	event::{subjects, EventBus},
	package::PackageRegistry,
	router::{CallerContext, CommandRouter},
	user::UserManager,
	util::now_millis,
	view::ViewManager
};

/// How long a worker may take to post `backend-ready`.
pub const WORKER_READY_TIMEOUT: Duration = Duration::from_secs(30);
/// How long a view may take to report `view-loaded`.
pub const VIEW_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// The health of a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
	/// Both processes are healthy.
	Running,
	/// The instance hit an unrecoverable launch error.
	Error
}

/// A running application instance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstance {
	/// The manifest the instance was launched from.
	pub manifest: Arc<Manifest>,
	/// Unique id of this run.
	pub instance_id: String,
	/// Where the package contents live on disk.
	pub install_path: PathBuf,
	/// The instance's view, `-1` for worker-only apps.
	pub view_id: ViewId,
	/// Instance health.
	pub state: InstanceState,
	/// Launch time, Unix milliseconds.
	pub last_launched: u64
}

struct RunningApp<R: Runtime> {
	instance: AppInstance,
	worker: Option<Arc<R::Worker>>,
	worker_channel: Option<PortChannel>,
	stopping: Arc<AtomicBool>
}

/// Spawns and terminates view and worker processes.
pub struct ProcessManager<R: Runtime> {
	runtime: Arc<R>,
	router: Arc<CommandRouter>,
	packages: Arc<PackageRegistry>,
	users: Arc<UserManager>,
	events: Arc<EventBus>,
	views: Arc<ViewManager<R>>,
	appbus: Arc<AppBusHost>,
	instances: Mutex<HashMap<String, RunningApp<R>>>,
	launch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
	/// Launches hold this for read; a session drain holds it for write so
	/// the next session's launches wait for the previous session's stops.
	session_gate: tokio::sync::RwLock<()>,
	weak: OnceCell<Weak<Self>>
}

/// Installs the bridge that lets a process issue shell commands over its
/// channel. The caller's identity is fixed at installation; the payload
/// carries `{command, payload}`.
fn install_shell_command_handler(channel: &PortChannel, caller: CallerContext, router: Arc<CommandRouter>) {
	let installed = channel.handle("shell-command", move |payload| {
		let router = router.clone();
		let caller = caller.clone();
		async move {
			let command = payload["command"].as_str().unwrap_or_default().to_string();
			let args = payload.get("payload").cloned().unwrap_or(JsonValue::Null);
			router.execute(&command, args, caller).await.map_err(|error| error.to_string())
		}
	});
	if installed.is_err() {
		tracing::warn!("shell-command bridge was already installed on this channel");
	}
}

impl<R: Runtime> ProcessManager<R> {
	/// Creates a process manager.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		runtime: Arc<R>,
		router: Arc<CommandRouter>,
		packages: Arc<PackageRegistry>,
		users: Arc<UserManager>,
		events: Arc<EventBus>,
		views: Arc<ViewManager<R>>,
		appbus: Arc<AppBusHost>
	) -> Arc<Self> {
		let manager = Arc::new(Self {
			runtime,
			router,
			packages,
			users,
			events,
			views,
			appbus,
			instances: Mutex::new(HashMap::new()),
			launch_locks: Mutex::new(HashMap::new()),
			session_gate: tokio::sync::RwLock::new(()),
			weak: OnceCell::new()
		});
		let _ = manager.weak.set(Arc::downgrade(&manager));
		manager
	}

	fn launch_lock(&self, app_id: &str) -> Arc<tokio::sync::Mutex<()>> {
		self.launch_locks.lock().unwrap().entry(app_id.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
	}

	/// Launches an application.
	pub async fn launch(&self, app_id: &str, bounds: Option<Rect>, launch_args: Option<JsonValue>) -> Result<AppInstance> {
		let _session = self.session_gate.read().await;

		let record = self.packages.get(app_id).ok_or_else(|| Error::UnknownApp(app_id.to_string()))?;
		if !self.packages.is_login_app(app_id) && !self.users.can_launch_app(app_id, record.is_core) {
			return Err(Error::NotAuthorized(app_id.to_string()));
		}

		let app_lock = self.launch_lock(app_id);
		let _guard = app_lock.lock().await;
		if self.instances.lock().unwrap().contains_key(app_id) {
			return Err(Error::AlreadyRunning(app_id.to_string()));
		}

		let manifest = record.manifest.clone();
		let mut worker: Option<Arc<R::Worker>> = None;
		let mut worker_channel: Option<PortChannel> = None;
		let mut view_app_port: Option<Port> = None;

		if let Some(worker_entry) = &manifest.worker {
			let (shell_end, worker_end) = Port::pair();
			let channel = PortChannel::attach(shell_end);

			// the ready listener must exist before the process can speak
			let (ready_sender, ready_receiver) = tokio::sync::oneshot::channel::<()>();
			let pending = Arc::new(Mutex::new(Some(ready_sender)));
			channel.once("backend-ready", move |_| {
				if let Some(sender) = pending.lock().unwrap().take() {
					let _ = sender.send(());
				}
			});
			install_shell_command_handler(&channel, CallerContext::for_worker(app_id), self.router.clone());

			let (worker_app_port, view_port) = if manifest.frontend.is_some() {
				let (worker_side, view_side) = Port::pair();
				(Some(worker_side), Some(view_side))
			} else {
				(None, None)
			};
			view_app_port = view_port;

			let handle = self
				.runtime
				.spawn_worker(eden_runtime::WorkerSpec {
					app_id: app_id.to_string(),
					entry: worker_entry.entry.clone(),
					manifest_json: serde_json::to_string(&*manifest)?,
					channel: worker_end,
					app_port: worker_app_port
				})
				.map_err(Error::from)?;
			let handle = Arc::new(handle);

			match tokio::time::timeout(WORKER_READY_TIMEOUT, ready_receiver).await {
				Ok(Ok(())) => {}
				_ => {
					let _ = handle.kill();
					channel.close();
					return Err(Error::Runtime(eden_runtime::Error::SpawnWorker(format!("worker for {app_id} did not report ready"))));
				}
			}

			self.events.register_worker_channel(app_id, channel.clone());
			if let Some(args) = &launch_args {
				channel.send("launch-args", args.clone());
			}
			worker = Some(handle);
			worker_channel = Some(channel);
		}

		let mut view_id: ViewId = -1;
		if manifest.frontend.is_some() {
			let (shell_end, process_end) = Port::pair();
			let channel = PortChannel::attach(shell_end);

			// loaded/failed listeners must exist before the view can speak
			let (loaded_sender, loaded_receiver) = tokio::sync::oneshot::channel::<bool>();
			let pending = Arc::new(Mutex::new(Some(loaded_sender)));
			let on_loaded = pending.clone();
			channel.once("view-loaded", move |_| {
				if let Some(sender) = on_loaded.lock().unwrap().take() {
					let _ = sender.send(true);
				}
			});
			let on_failed = pending.clone();
			channel.once("view-load-failed", move |_| {
				if let Some(sender) = on_failed.lock().unwrap().take() {
					let _ = sender.send(false);
				}
			});

			view_id = match self.views.create_view(&manifest, channel.clone(), process_end, bounds) {
				Ok(view_id) => view_id,
				Err(error) => {
					self.unwind(app_id, -1, &worker, &worker_channel);
					return Err(error);
				}
			};
			install_shell_command_handler(&channel, CallerContext::for_view(app_id, view_id), self.router.clone());

			let loaded = matches!(tokio::time::timeout(VIEW_LOAD_TIMEOUT, loaded_receiver).await, Ok(Ok(true)));
			if !loaded {
				self.events.emit(subjects::VIEW_LOAD_FAILED, json!({ "appId": app_id, "viewId": view_id }));
				self.unwind(app_id, view_id, &worker, &worker_channel);
				return Err(Error::Runtime(eden_runtime::Error::CreateView(format!("frontend for {app_id} failed to load"))));
			}
			self.events.emit(subjects::VIEW_LOADED, json!({ "appId": app_id, "viewId": view_id }));
			if let Some(args) = &launch_args {
				channel.send("launch-args", args.clone());
			}

			// the sole port-transfer moment
			if let Some(port) = view_app_port.take() {
				let transfer = PortTransfer {
					connection_id: format!("worker/{app_id}"),
					role: PortRole::Worker,
					service_name: None,
					peer_app_id: Some(app_id.to_string()),
					port
				};
				if let Err(error) = self.views.transfer_to_view(view_id, transfer) {
					tracing::warn!("failed to hand worker port to view of {app_id}: {error}");
				}
			}
		}

		let stopping = Arc::new(AtomicBool::new(false));
		if let Some(handle) = &worker {
			let weak = self.weak.get().cloned().unwrap_or_default();
			let app = app_id.to_string();
			let runtime_handle = tokio::runtime::Handle::current();
			let stop_flag = stopping.clone();
			handle.on_exit(Box::new(move |code| {
				if stop_flag.load(Ordering::SeqCst) {
					return;
				}
				runtime_handle.spawn(async move {
					if let Some(manager) = weak.upgrade() {
						manager.handle_crash(&app, code).await;
					}
				});
			}));
		}

		let instance = AppInstance {
			manifest: manifest.clone(),
			instance_id: Uuid::new_v4().to_string(),
			install_path: record.install_path.clone(),
			view_id,
			state: InstanceState::Running,
			last_launched: now_millis()
		};
		self.instances.lock().unwrap().insert(app_id.to_string(), RunningApp {
			instance: instance.clone(),
			worker,
			worker_channel,
			stopping
		});
		self.events.emit(subjects::PROCESS_LAUNCHED, json!({ "appId": app_id, "instanceId": instance.instance_id }));
		Ok(instance)
	}

	fn unwind(&self, app_id: &str, view_id: ViewId, worker: &Option<Arc<R::Worker>>, worker_channel: &Option<PortChannel>) {
		if view_id >= 0 {
			let _ = self.views.remove_view(view_id);
		}
		self.events.unregister_worker_channel(app_id);
		if let Some(channel) = worker_channel {
			channel.close();
		}
		if let Some(worker) = worker {
			let _ = worker.kill();
		}
	}

	/// Stops a running application.
	pub async fn stop(&self, app_id: &str) -> Result<()> {
		let app_lock = self.launch_lock(app_id);
		let _guard = app_lock.lock().await;
		self.teardown(app_id, None)
	}

	/// The shared stop/crash cleanup. With an exit code this is the crash
	/// path and emits `process/exited`; otherwise it emits
	/// `process/stopped`.
	fn teardown(&self, app_id: &str, exit_code: Option<i32>) -> Result<()> {
		let running = match self.instances.lock().unwrap().remove(app_id) {
			Some(running) => running,
			None => return Err(Error::NotRunning(app_id.to_string()))
		};
		running.stopping.store(true, Ordering::SeqCst);

		// services and subscriptions go first so nothing is delivered to a
		// half-dead app
		self.appbus.unexpose_all(app_id);
		self.appbus.close_connections_for(app_id);

		// the view goes before the worker so the worker never loses its
		// consumers mid-teardown
		if running.instance.view_id >= 0 {
			let _ = self.views.remove_view(running.instance.view_id);
		}
		self.events.unregister_worker_channel(app_id);
		if let Some(channel) = &running.worker_channel {
			channel.close();
		}
		if let Some(worker) = &running.worker {
			if let Err(error) = worker.kill() {
				tracing::warn!("failed to kill worker of {app_id}: {error}");
			}
		}

		match exit_code {
			Some(code) => self.events.emit(subjects::PROCESS_EXITED, json!({ "appId": app_id, "code": code })),
			None => self.events.emit(subjects::PROCESS_STOPPED, json!({ "appId": app_id }))
		}
		Ok(())
	}

	/// Cleans up after an unexpected worker exit. A no-op when `stop`
	/// already ran.
	pub async fn handle_crash(&self, app_id: &str, code: i32) {
		let app_lock = self.launch_lock(app_id);
		let _guard = app_lock.lock().await;
		if self.teardown(app_id, Some(code)).is_ok() {
			tracing::warn!("worker of {app_id} exited unexpectedly with code {code}");
		}
	}

	/// Stops every running app sequentially.
	pub async fn shutdown(&self) {
		let ids: Vec<String> = self.instances.lock().unwrap().keys().cloned().collect();
		for app_id in ids {
			let _ = self.stop(&app_id).await;
		}
	}

	/// Stops every running app except the login app and holds back new
	/// launches until the stops have drained. Runs on every session
	/// change.
	pub async fn drain_session(&self) {
		let _gate = self.session_gate.write().await;
		let ids: Vec<String> = self.instances.lock().unwrap().keys().cloned().collect();
		for app_id in ids {
			if self.packages.is_login_app(&app_id) {
				continue;
			}
			let _ = self.stop(&app_id).await;
		}
	}

	/// Whether the app has a live instance.
	pub fn is_running(&self, app_id: &str) -> bool {
		self.instances.lock().unwrap().contains_key(app_id)
	}

	/// Every running instance, sorted by app id.
	pub fn running_apps(&self) -> Vec<AppInstance> {
		let mut instances: Vec<AppInstance> = self.instances.lock().unwrap().values().map(|running| running.instance.clone()).collect();
		instances.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
		instances
	}

	/// The running instance of an app.
	pub fn instance(&self, app_id: &str) -> Option<AppInstance> {
		self.instances.lock().unwrap().get(app_id).map(|running| running.instance.clone())
	}
}

impl<R: Runtime> PortDispatcher for ProcessManager<R> {
	fn is_running(&self, app_id: &str) -> bool {
		ProcessManager::is_running(self, app_id)
	}

	fn dispatch_port(&self, app_id: &str, prefer_backend: bool, transfer: PortTransfer) -> Result<()> {
		let (worker, view_id) = {
			let instances = self.instances.lock().unwrap();
			match instances.get(app_id) {
				Some(running) => (running.worker.clone(), running.instance.view_id),
				None => return Err(Error::NotRunning(app_id.to_string()))
			}
		};
		if prefer_backend {
			if let Some(worker) = &worker {
				return worker.transfer_port(transfer).map_err(Into::into);
			}
		}
		if view_id >= 0 {
			return self.views.transfer_to_view(view_id, transfer);
		}
		match worker {
			Some(worker) => worker.transfer_port(transfer).map_err(Into::into),
			None => Err(Error::NotRunning(app_id.to_string()))
		}
	}

	fn notify_app(&self, app_id: &str, method: &str, payload: JsonValue) {
		let (worker_channel, view_id) = {
			let instances = self.instances.lock().unwrap();
			match instances.get(app_id) {
				Some(running) => (running.worker_channel.clone(), running.instance.view_id),
				None => return
			}
		};
		if let Some(channel) = worker_channel {
			channel.send(method, payload.clone());
		}
		if view_id >= 0 {
			if let Some(channel) = self.views.channel(view_id) {
				channel.send(method, payload);
			}
		}
	}
}
