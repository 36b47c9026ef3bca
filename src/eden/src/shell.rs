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

//! Shell assembly.
//!
//! Construction is two-phase: every manager is built first, then each is
//! invited to register its command table with the router. Must be created
//! inside a tokio runtime; port pumps and the mouse tracker spawn tasks.

use std::sync::{Arc, Mutex};

use eden_runtime::{PortChannel, Runtime};
use serde_json::Value as JsonValue;

use crate::{
	appbus::AppBusHost,
	endpoints,
	error::Result,
	event::{subjects, EventBus},
	package::PackageRegistry,
	process::ProcessManager,
	router::{CallerContext, CommandRouter},
	scope::PermissionRegistry,
	settings::SettingsManager,
	store::{SeedConfig, Stores},
	user::UserManager,
	view::{TilingConfig, ViewManager}
};

/// Boot configuration of the shell.
#[derive(Default)]
pub struct ShellConfig {
	/// The tile layout configuration.
	pub tiling: TilingConfig,
	/// The app exempt from launch authorization and session drains.
	pub login_app: Option<String>,
	/// The startup locale; empty means `en`.
	pub locale: String,
	/// One-shot seed applied before the default user is established.
	pub seed: Option<SeedConfig>
}

/// The assembled application runtime core.
pub struct Shell<R: Runtime> {
	runtime: Arc<R>,
	stores: Stores,
	permissions: Arc<PermissionRegistry>,
	events: Arc<EventBus>,
	users: Arc<UserManager>,
	packages: Arc<PackageRegistry>,
	appbus: Arc<AppBusHost>,
	views: Arc<ViewManager<R>>,
	processes: Arc<ProcessManager<R>>,
	settings: Arc<SettingsManager>,
	router: Arc<CommandRouter>,
	locale: Arc<Mutex<String>>
}

impl<R: Runtime> Shell<R> {
	/// Builds the core over a runtime: applies the seed, wires the
	/// managers and their command tables, hooks the session-change sweep,
	/// and establishes the default user.
	pub fn new(runtime: R, stores: Stores, config: ShellConfig) -> Arc<Self> {
		let runtime = Arc::new(runtime);
		if let Some(seed) = &config.seed {
			seed.apply(&stores);
		}

		let permissions = Arc::new(PermissionRegistry::new());
		let events = Arc::new(EventBus::new(permissions.clone()));
		let users = Arc::new(UserManager::new(stores.users.clone(), events.clone()));
		let router = Arc::new(CommandRouter::new(permissions.clone(), users.clone()));
		let packages = Arc::new(PackageRegistry::new(permissions.clone(), events.clone()));
		if let Some(login_app) = &config.login_app {
			packages.set_login_app(login_app);
		}
		let appbus = Arc::new(AppBusHost::new());
		let views = ViewManager::new(runtime.clone(), events.clone(), config.tiling);
		let processes = ProcessManager::new(
			runtime.clone(),
			router.clone(),
			packages.clone(),
			users.clone(),
			events.clone(),
			views.clone(),
			appbus.clone()
		);
		appbus.set_dispatcher(processes.clone());
		let settings = Arc::new(SettingsManager::new(stores.settings.clone(), events.clone(), users.clone()));
		let locale = Arc::new(Mutex::new(if config.locale.is_empty() { "en".to_string() } else { config.locale }));

		endpoints::process::register(&router, &processes);
		endpoints::view::register(&router, &views);
		endpoints::event::register(&router, &events);
		endpoints::appbus::register(&router, &appbus);
		endpoints::user::register(&router, &users);
		endpoints::settings::register(&router, &settings);
		endpoints::package::register(&router, &packages, &users, &processes, locale.clone());
		endpoints::notification::register(&router, &events);
		endpoints::system::register(&router, &runtime, &views, &events, locale.clone());

		let shell = Arc::new(Self {
			runtime,
			stores,
			permissions,
			events: events.clone(),
			users: users.clone(),
			packages,
			appbus,
			views,
			processes,
			settings,
			router,
			locale
		});

		// every session change drains the previous session's apps, then
		// starts the stored autostart set
		let weak = Arc::downgrade(&shell);
		let handle = tokio::runtime::Handle::current();
		events.subscribe_internal(subjects::USER_CHANGED, move |_payload| {
			if let Some(shell) = weak.upgrade() {
				let processes = shell.processes.clone();
				let settings = shell.settings.clone();
				let signed_in = shell.users.current_user().is_some();
				handle.spawn(async move {
					processes.drain_session().await;
					if !signed_in {
						return;
					}
					for app_id in settings.autostart_apps() {
						if let Err(error) = processes.launch(&app_id, None, None).await {
							tracing::debug!("autostart of {app_id} skipped: {error}");
						}
					}
				});
			}
		});

		users.establish_default();
		shell
	}

	/// Executes a command through the router.
	pub async fn execute(&self, command: &str, payload: JsonValue, caller: CallerContext) -> Result<JsonValue> {
		self.router.execute(command, payload, caller).await
	}

	/// Wires the host shell's own channel into the subscription bus and
	/// returns the foundation's end.
	pub fn attach_foundation(&self) -> PortChannel {
		let (bus_side, foundation_side) = PortChannel::pair();
		self.events.set_foundation_channel(bus_side);
		foundation_side
	}

	/// The runtime the shell drives.
	pub fn runtime(&self) -> &Arc<R> {
		&self.runtime
	}

	/// The persisted stores.
	pub fn stores(&self) -> &Stores {
		&self.stores
	}

	/// The permission and grant engine.
	pub fn permissions(&self) -> &Arc<PermissionRegistry> {
		&self.permissions
	}

	/// The subscription bus.
	pub fn events(&self) -> &Arc<EventBus> {
		&self.events
	}

	/// The user and session manager.
	pub fn users(&self) -> &Arc<UserManager> {
		&self.users
	}

	/// The package registry.
	pub fn packages(&self) -> &Arc<PackageRegistry> {
		&self.packages
	}

	/// The AppBus host.
	pub fn appbus(&self) -> &Arc<AppBusHost> {
		&self.appbus
	}

	/// The view manager.
	pub fn views(&self) -> &Arc<ViewManager<R>> {
		&self.views
	}

	/// The process lifecycle manager.
	pub fn processes(&self) -> &Arc<ProcessManager<R>> {
		&self.processes
	}

	/// The settings manager.
	pub fn settings(&self) -> &Arc<SettingsManager> {
		&self.settings
	}

	/// The command router.
	pub fn router(&self) -> &Arc<CommandRouter> {
		&self.router
	}

	/// The current shell locale.
	pub fn locale(&self) -> String {
		self.locale.lock().unwrap().clone()
	}
}
