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

//! The AppBus: direct peer-to-peer channels between applications.
//!
//! The host side keeps the service registry and the connection table; it
//! mints connection ids, creates the port pairs, and hands one end to each
//! process out-of-band. After the handshake, traffic flows directly over
//! the port without re-traversing the command router. When an app
//! terminates, the host posts `appbus-port-closed` to every surviving
//! peer; endpoints never self-detect peer death.

mod connection;

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex}
};

use eden_runtime::{Port, PortRole, PortTransfer};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

pub use connection::{AppBusEndpoint, BusConnection};

use crate::error::{Error, Result};

/// Where the host can push ports and control messages for a running app.
/// Implemented by the process lifecycle manager; injected after
/// construction to break the ownership cycle.
pub trait PortDispatcher: Send + Sync + 'static {
	/// Whether the app currently has a live instance.
	fn is_running(&self, app_id: &str) -> bool;
	/// Hands a port to one of the app's processes; backend services
	/// receive theirs in the worker, everything else prefers the view.
	fn dispatch_port(&self, app_id: &str, prefer_backend: bool, transfer: PortTransfer) -> Result<()>;
	/// Posts a control message on the app's shell channels.
	fn notify_app(&self, app_id: &str, method: &str, payload: JsonValue);
}

/// A service registry entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
	/// The service name, unique across the shell.
	pub name: String,
	/// The app exposing the service.
	pub owner_app_id: String,
	/// Human-readable description for discovery.
	pub description: Option<String>,
	/// When present, only these apps may connect.
	pub allowed_clients: Option<HashSet<String>>,
	/// Whether connections are served by the owner's worker rather than
	/// its view.
	pub is_backend: bool
}

/// Options for [`AppBusHost::expose_service`].
#[derive(Debug, Clone, Default)]
pub struct ExposeOptions {
	/// Human-readable description for discovery.
	pub description: Option<String>,
	/// When present, only these apps may connect.
	pub allowed_clients: Option<Vec<String>>,
	/// Whether connections are served by the owner's worker.
	pub is_backend: bool
}

#[derive(Debug, Clone)]
struct ConnectionEntry {
	service_app: String,
	client_app: String
}

/// The host side of the AppBus.
#[derive(Default)]
pub struct AppBusHost {
	services: Mutex<HashMap<String, ServiceInfo>>,
	connections: Mutex<HashMap<String, ConnectionEntry>>,
	dispatcher: OnceCell<Arc<dyn PortDispatcher>>
}

impl AppBusHost {
	/// Creates an empty host.
	pub fn new() -> Self {
		Self::default()
	}

	/// Injects the port dispatcher; second phase of shell construction.
	pub fn set_dispatcher(&self, dispatcher: Arc<dyn PortDispatcher>) {
		if self.dispatcher.set(dispatcher).is_err() {
			tracing::warn!("appbus dispatcher was already set");
		}
	}

	fn dispatcher(&self) -> Result<&Arc<dyn PortDispatcher>> {
		self.dispatcher.get().ok_or_else(|| Error::Command(anyhow::anyhow!("appbus host is not wired to a process manager")))
	}

	/// Registers a service in the host registry. The `on_connect` callback
	/// stays local to the exposing process.
	pub fn expose_service(&self, owner_app_id: &str, name: &str, options: ExposeOptions) -> Result<()> {
		let mut services = self.services.lock().unwrap();
		if let Some(existing) = services.get(name) {
			if existing.owner_app_id != owner_app_id {
				return Err(Error::Command(anyhow::anyhow!(
					"service {name} is already exposed by {}",
					existing.owner_app_id
				)));
			}
		}
		services.insert(name.to_string(), ServiceInfo {
			name: name.to_string(),
			owner_app_id: owner_app_id.to_string(),
			description: options.description,
			allowed_clients: options.allowed_clients.map(|clients| clients.into_iter().collect()),
			is_backend: options.is_backend
		});
		Ok(())
	}

	/// Removes a service exposed by the app. Removing a service that does
	/// not exist is a no-op, so `expose` followed by `unexpose` always
	/// returns the registry to its prior state.
	pub fn unexpose_service(&self, owner_app_id: &str, name: &str) {
		let mut services = self.services.lock().unwrap();
		if services.get(name).map(|service| service.owner_app_id == owner_app_id).unwrap_or(false) {
			services.remove(name);
		}
	}

	/// Removes every service exposed by the app.
	pub fn unexpose_all(&self, owner_app_id: &str) {
		self.services.lock().unwrap().retain(|_, service| service.owner_app_id != owner_app_id);
	}

	/// Every exposed service.
	pub fn list_services(&self) -> Vec<ServiceInfo> {
		let mut services: Vec<ServiceInfo> = self.services.lock().unwrap().values().cloned().collect();
		services.sort_by(|a, b| a.name.cmp(&b.name));
		services
	}

	/// Every service exposed by one app.
	pub fn list_services_by_app(&self, owner_app_id: &str) -> Vec<ServiceInfo> {
		self.list_services().into_iter().filter(|service| service.owner_app_id == owner_app_id).collect()
	}

	/// Brokers a connection between the caller and a service. Verifies the
	/// target is running and the caller is an allowed client, mints a
	/// connection id, and hands one port end to each process. The caller
	/// then awaits its port on its endpoint.
	pub fn connect(&self, caller_app_id: &str, target_app_id: &str, service_name: &str) -> Result<String> {
		let dispatcher = self.dispatcher()?.clone();
		if !dispatcher.is_running(target_app_id) {
			return Err(Error::NotRunning(target_app_id.to_string()));
		}

		let service = {
			let services = self.services.lock().unwrap();
			match services.get(service_name) {
				Some(service) if service.owner_app_id == target_app_id => service.clone(),
				_ => return Err(Error::UnknownService(service_name.to_string()))
			}
		};
		if let Some(allowed) = &service.allowed_clients {
			if !allowed.contains(caller_app_id) {
				return Err(Error::ServiceNotAllowed {
					app_id: caller_app_id.to_string(),
					service: service_name.to_string()
				});
			}
		}

		let connection_id = Uuid::new_v4().to_string();
		let (service_port, client_port) = Port::pair();

		dispatcher.dispatch_port(target_app_id, service.is_backend, PortTransfer {
			connection_id: connection_id.clone(),
			role: PortRole::Service,
			service_name: Some(service_name.to_string()),
			peer_app_id: Some(caller_app_id.to_string()),
			port: service_port
		})?;
		if let Err(error) = dispatcher.dispatch_port(caller_app_id, false, PortTransfer {
			connection_id: connection_id.clone(),
			role: PortRole::Client,
			service_name: Some(service_name.to_string()),
			peer_app_id: Some(target_app_id.to_string()),
			port: client_port
		}) {
			// the service end is already out; tell that side the peer is gone
			dispatcher.notify_app(target_app_id, "appbus-port-closed", json!({ "connectionId": connection_id }));
			return Err(error);
		}

		self.connections.lock().unwrap().insert(connection_id.clone(), ConnectionEntry {
			service_app: target_app_id.to_string(),
			client_app: caller_app_id.to_string()
		});
		Ok(connection_id)
	}

	/// Closes every connection involving the app, notifying each
	/// surviving peer exactly once.
	pub fn close_connections_for(&self, app_id: &str) {
		let affected: Vec<(String, ConnectionEntry)> = {
			let mut connections = self.connections.lock().unwrap();
			let ids: Vec<String> = connections
				.iter()
				.filter(|(_, entry)| entry.service_app == app_id || entry.client_app == app_id)
				.map(|(connection_id, _)| connection_id.clone())
				.collect();
			ids.into_iter().filter_map(|connection_id| connections.remove_entry(&connection_id)).collect()
		};

		let dispatcher = match self.dispatcher.get() {
			Some(dispatcher) => dispatcher.clone(),
			None => return
		};
		for (connection_id, entry) in affected {
			let survivor = if entry.service_app == app_id { &entry.client_app } else { &entry.service_app };
			dispatcher.notify_app(survivor, "appbus-port-closed", json!({ "connectionId": connection_id }));
		}
	}

	/// The number of tracked connections.
	pub fn connection_count(&self) -> usize {
		self.connections.lock().unwrap().len()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use eden_runtime::PortTransfer;
	use serde_json::Value as JsonValue;

	use super::{AppBusHost, Error, ExposeOptions, PortDispatcher};
	use crate::error::Result;

	/// Collects dispatched ports and notices without real processes.
	#[derive(Default)]
	struct RecordingDispatcher {
		running: Mutex<Vec<String>>,
		dispatched: Mutex<Vec<(String, bool, String)>>,
		notices: Mutex<Vec<(String, String, JsonValue)>>
	}

	impl PortDispatcher for RecordingDispatcher {
		fn is_running(&self, app_id: &str) -> bool {
			self.running.lock().unwrap().iter().any(|running| running == app_id)
		}

		fn dispatch_port(&self, app_id: &str, prefer_backend: bool, transfer: PortTransfer) -> Result<()> {
			self.dispatched.lock().unwrap().push((app_id.to_string(), prefer_backend, transfer.connection_id));
			Ok(())
		}

		fn notify_app(&self, app_id: &str, method: &str, payload: JsonValue) {
			self.notices.lock().unwrap().push((app_id.to_string(), method.to_string(), payload));
		}
	}

	fn host() -> (Arc<RecordingDispatcher>, AppBusHost) {
		let dispatcher = Arc::new(RecordingDispatcher::default());
		dispatcher.running.lock().unwrap().extend(["app.service".to_string(), "app.client".to_string()]);
		let host = AppBusHost::new();
		host.set_dispatcher(dispatcher.clone());
		(dispatcher, host)
	}

	#[test]
	fn expose_unexpose_round_trip() {
		let (_dispatcher, host) = host();
		assert!(host.list_services().is_empty());

		host.expose_service("app.service", "chat-relay", ExposeOptions::default()).unwrap();
		assert_eq!(host.list_services().len(), 1);
		assert_eq!(host.list_services_by_app("app.service").len(), 1);

		// a different owner cannot squat the name
		assert!(host.expose_service("app.other", "chat-relay", ExposeOptions::default()).is_err());
		// unexposing by a non-owner is a no-op
		host.unexpose_service("app.other", "chat-relay");
		assert_eq!(host.list_services().len(), 1);

		host.unexpose_service("app.service", "chat-relay");
		assert!(host.list_services().is_empty());
	}

	#[test]
	fn connect_dispatches_both_ends() {
		let (dispatcher, host) = host();
		host.expose_service("app.service", "chat-relay", ExposeOptions {
			is_backend: true,
			..Default::default()
		})
		.unwrap();

		let connection_id = host.connect("app.client", "app.service", "chat-relay").unwrap();
		let dispatched = dispatcher.dispatched.lock().unwrap();
		assert_eq!(dispatched.len(), 2);
		assert_eq!(dispatched[0], ("app.service".to_string(), true, connection_id.clone()));
		assert_eq!(dispatched[1], ("app.client".to_string(), false, connection_id.clone()));
		assert_eq!(host.connection_count(), 1);
	}

	#[test]
	fn connect_guards() {
		let (_dispatcher, host) = host();
		host.expose_service("app.service", "private", ExposeOptions {
			allowed_clients: Some(vec!["app.friend".into()]),
			..Default::default()
		})
		.unwrap();

		assert!(matches!(host.connect("app.client", "app.gone", "private"), Err(Error::NotRunning(_))));
		assert!(matches!(host.connect("app.client", "app.service", "missing"), Err(Error::UnknownService(_))));
		assert!(matches!(
			host.connect("app.client", "app.service", "private"),
			Err(Error::ServiceNotAllowed { .. })
		));
	}

	#[test]
	fn terminating_app_notifies_surviving_peers() {
		let (dispatcher, host) = host();
		host.expose_service("app.service", "chat-relay", ExposeOptions::default()).unwrap();
		let connection_id = host.connect("app.client", "app.service", "chat-relay").unwrap();

		host.close_connections_for("app.service");
		let notices = dispatcher.notices.lock().unwrap();
		assert_eq!(notices.len(), 1);
		assert_eq!(notices[0].0, "app.client");
		assert_eq!(notices[0].1, "appbus-port-closed");
		assert_eq!(notices[0].2["connectionId"], JsonValue::String(connection_id));
		assert_eq!(host.connection_count(), 0);
	}
}
