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

//! The process-side half of the AppBus: connection objects and the
//! per-process endpoint that routes transferred ports.

use std::{
	collections::HashMap,
	fmt,
	sync::{Arc, Mutex},
	time::Duration
};

use eden_runtime::{Error as RuntimeError, ListenerId, PortChannel, PortMailbox, PortRole, PortTransfer};
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;

use crate::error::Result;

/// A peer-to-peer channel between two applications, identical on both
/// ends: fire-and-forget `send`/`on`/`off` plus correlated
/// `request`/`handle`.
#[derive(Clone)]
pub struct BusConnection {
	channel: PortChannel,
	connection_id: String,
	service_name: String,
	peer_app_id: String,
	role: PortRole
}

impl fmt::Debug for BusConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BusConnection")
			.field("connection_id", &self.connection_id)
			.field("service_name", &self.service_name)
			.field("peer_app_id", &self.peer_app_id)
			.field("role", &self.role)
			.finish()
	}
}

impl BusConnection {
	/// Wraps a transferred port and begins pumping it.
	pub fn from_transfer(transfer: PortTransfer) -> Self {
		Self {
			channel: PortChannel::attach(transfer.port),
			connection_id: transfer.connection_id,
			service_name: transfer.service_name.unwrap_or_default(),
			peer_app_id: transfer.peer_app_id.unwrap_or_default(),
			role: transfer.role
		}
	}

	/// The unique connection id minted by the host.
	pub fn connection_id(&self) -> &str {
		&self.connection_id
	}

	/// The service this connection was brokered for.
	pub fn service_name(&self) -> &str {
		&self.service_name
	}

	/// The application on the other end.
	pub fn peer_app_id(&self) -> &str {
		&self.peer_app_id
	}

	/// Which end of the connection this is.
	pub fn role(&self) -> PortRole {
		self.role
	}

	/// Whether the underlying port is still open.
	pub fn is_connected(&self) -> bool {
		self.channel.is_connected()
	}

	/// Sends a fire-and-forget message to the peer's `on` listeners.
	pub fn send(&self, method: &str, payload: JsonValue) {
		self.channel.send(method, payload);
	}

	/// Registers a fire-and-forget listener.
	pub fn on<F: Fn(JsonValue) + Send + Sync + 'static>(&self, method: &str, callback: F) -> ListenerId {
		self.channel.on(method, callback)
	}

	/// Registers a listener that removes itself after the first delivery.
	pub fn once<F: Fn(JsonValue) + Send + Sync + 'static>(&self, method: &str, callback: F) -> ListenerId {
		self.channel.once(method, callback)
	}

	/// Removes a fire-and-forget listener.
	pub fn off(&self, method: &str, id: ListenerId) {
		self.channel.off(method, id);
	}

	/// Installs the request handler for a method; exactly one may exist
	/// per method.
	pub fn handle<F, Fut>(&self, method: &str, handler: F) -> Result<()>
	where
		F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = std::result::Result<JsonValue, String>> + Send + 'static
	{
		self.channel.handle(method, handler).map_err(Into::into)
	}

	/// Removes the request handler for a method.
	pub fn remove_handler(&self, method: &str) {
		self.channel.remove_handler(method);
	}

	/// Sends a correlated request with the default 30 second timeout.
	pub async fn request(&self, method: &str, payload: JsonValue) -> Result<JsonValue> {
		self.channel.request(method, payload).await.map_err(Into::into)
	}

	/// Sends a correlated request with an explicit timeout.
	pub async fn request_with_timeout(&self, method: &str, payload: JsonValue, timeout: Duration) -> Result<JsonValue> {
		self.channel.request_with_timeout(method, payload, timeout).await.map_err(Into::into)
	}

	/// Registers a callback fired exactly once when either end closes or
	/// the host reports the peer gone.
	pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) {
		self.channel.on_close(callback);
	}

	/// Tears down local listeners and closes the port.
	pub fn close(&self) {
		self.channel.close();
	}
}

type ConnectCallback = Arc<dyn Fn(BusConnection) + Send + Sync>;

#[derive(Default)]
struct EndpointInner {
	connect_handlers: Mutex<HashMap<String, ConnectCallback>>,
	pending: Mutex<HashMap<String, PortTransfer>>,
	waiters: Mutex<HashMap<String, oneshot::Sender<BusConnection>>>,
	connections: Mutex<HashMap<String, BusConnection>>
}

/// The per-process AppBus endpoint.
///
/// Routes service-role transfers to locally stored `on_connect` callbacks,
/// parks client-role transfers until [`wait_for_connection`] claims them,
/// and closes surviving connections when the host posts
/// `appbus-port-closed`.
///
/// [`wait_for_connection`]: Self::wait_for_connection
#[derive(Clone, Default)]
pub struct AppBusEndpoint {
	inner: Arc<EndpointInner>
}

impl AppBusEndpoint {
	/// Creates an endpoint fed by the process's port mailbox, listening
	/// for peer-gone notices on the process's shell channel.
	pub fn new(mailbox: &PortMailbox, shell_channel: &PortChannel) -> Self {
		let endpoint = Self::default();

		let transfers = endpoint.clone();
		mailbox.on_transfer(move |transfer| transfers.handle_transfer(transfer));

		let closures = endpoint.clone();
		shell_channel.on("appbus-port-closed", move |payload| {
			if let Some(connection_id) = payload["connectionId"].as_str() {
				closures.handle_peer_gone(connection_id);
			}
		});

		endpoint
	}

	fn track(&self, connection: &BusConnection) {
		self.inner.connections.lock().unwrap().insert(connection.connection_id().to_string(), connection.clone());
		let inner = self.inner.clone();
		let connection_id = connection.connection_id().to_string();
		connection.on_close(move || {
			inner.connections.lock().unwrap().remove(&connection_id);
		});
	}

	fn handle_transfer(&self, transfer: PortTransfer) {
		match transfer.role {
			PortRole::Service => {
				let handler = transfer
					.service_name
					.as_ref()
					.and_then(|service| self.inner.connect_handlers.lock().unwrap().get(service).cloned());
				match handler {
					Some(handler) => {
						let connection = BusConnection::from_transfer(transfer);
						self.track(&connection);
						handler(connection);
					}
					None => tracing::warn!("dropping service connection {}: no on_connect for {:?}", transfer.connection_id, transfer.service_name)
				}
			}
			PortRole::Client | PortRole::Worker => {
				let waiter = self.inner.waiters.lock().unwrap().remove(&transfer.connection_id);
				match waiter {
					Some(waiter) => {
						let connection = BusConnection::from_transfer(transfer);
						self.track(&connection);
						if let Err(connection) = waiter.send(connection) {
							// claimant timed out in the meantime
							connection.close();
						}
					}
					None => {
						self.inner.pending.lock().unwrap().insert(transfer.connection_id.clone(), transfer);
					}
				}
			}
		}
	}

	fn handle_peer_gone(&self, connection_id: &str) {
		let connection = self.inner.connections.lock().unwrap().remove(connection_id);
		if let Some(connection) = connection {
			connection.close();
		}
	}

	/// Stores the `on_connect` callback for a service exposed by this
	/// process.
	pub fn on_connect<F: Fn(BusConnection) + Send + Sync + 'static>(&self, service_name: &str, callback: F) {
		self.inner.connect_handlers.lock().unwrap().insert(service_name.to_string(), Arc::new(callback));
	}

	/// Removes the `on_connect` callback for a service.
	pub fn remove_on_connect(&self, service_name: &str) {
		self.inner.connect_handlers.lock().unwrap().remove(service_name);
	}

	/// Waits for the port of a brokered connection to arrive, wrapping it
	/// in a connection object.
	pub async fn wait_for_connection(&self, connection_id: &str, timeout: Duration) -> Result<BusConnection> {
		if let Some(transfer) = self.inner.pending.lock().unwrap().remove(connection_id) {
			let connection = BusConnection::from_transfer(transfer);
			self.track(&connection);
			return Ok(connection);
		}

		let (sender, receiver) = oneshot::channel();
		self.inner.waiters.lock().unwrap().insert(connection_id.to_string(), sender);

		// the transfer may have landed between the check and the waiter
		// registration
		if let Some(transfer) = self.inner.pending.lock().unwrap().remove(connection_id) {
			self.inner.waiters.lock().unwrap().remove(connection_id);
			let connection = BusConnection::from_transfer(transfer);
			self.track(&connection);
			return Ok(connection);
		}

		match tokio::time::timeout(timeout, receiver).await {
			Ok(Ok(connection)) => Ok(connection),
			_ => {
				self.inner.waiters.lock().unwrap().remove(connection_id);
				Err(RuntimeError::PortArrivalTimeout {
					connection_id: connection_id.to_string(),
					timeout_ms: timeout.as_millis() as u64
				}
				.into())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		sync::{
			atomic::{AtomicUsize, Ordering},
			Arc
		},
		time::Duration
	};

	use eden_runtime::{Port, PortChannel, PortMailbox, PortRole, PortTransfer};
	use serde_json::json;

	use super::{AppBusEndpoint, BusConnection};

	fn transfer_pair(connection_id: &str, service: &str) -> (PortTransfer, PortTransfer) {
		let (port_a, port_b) = Port::pair();
		(
			PortTransfer {
				connection_id: connection_id.to_string(),
				role: PortRole::Service,
				service_name: Some(service.to_string()),
				peer_app_id: Some("app.client".into()),
				port: port_a
			},
			PortTransfer {
				connection_id: connection_id.to_string(),
				role: PortRole::Client,
				service_name: Some(service.to_string()),
				peer_app_id: Some("app.service".into()),
				port: port_b
			}
		)
	}

	#[tokio::test]
	async fn request_response_between_endpoints() {
		let (service_end, client_end) = transfer_pair("c1", "chat-relay");

		let service_mailbox = PortMailbox::new();
		let (service_shell, _shell_a) = PortChannel::pair();
		let service_endpoint = AppBusEndpoint::new(&service_mailbox, &service_shell);
		service_endpoint.on_connect("chat-relay", |connection: BusConnection| {
			connection
				.handle("echo", |payload| async move { Ok(json!(payload.as_i64().unwrap_or(0) + 1)) })
				.unwrap();
		});

		let client_mailbox = PortMailbox::new();
		let (client_shell, _shell_b) = PortChannel::pair();
		let client_endpoint = AppBusEndpoint::new(&client_mailbox, &client_shell);

		service_mailbox.deliver(service_end);
		client_mailbox.deliver(client_end);

		let connection = client_endpoint.wait_for_connection("c1", Duration::from_millis(100)).await.unwrap();
		assert_eq!(connection.service_name(), "chat-relay");
		assert_eq!(connection.request("echo", json!(41)).await.unwrap(), json!(42));
	}

	#[tokio::test]
	async fn port_arrival_timeout() {
		let mailbox = PortMailbox::new();
		let (shell, _peer) = PortChannel::pair();
		let endpoint = AppBusEndpoint::new(&mailbox, &shell);
		let error = endpoint.wait_for_connection("ghost", Duration::from_millis(10)).await.unwrap_err();
		assert_eq!(error.to_string(), "Port for connection ghost not received within 10ms");
	}

	#[tokio::test]
	async fn host_peer_gone_notice_closes_connection_once() {
		let (service_end, client_end) = transfer_pair("c2", "svc");
		let _service_channel = PortChannel::attach(service_end.port);

		let mailbox = PortMailbox::new();
		let (shell, host_side) = PortChannel::pair();
		let endpoint = AppBusEndpoint::new(&mailbox, &shell);
		mailbox.deliver(client_end);

		let connection = endpoint.wait_for_connection("c2", Duration::from_millis(100)).await.unwrap();
		let closes = Arc::new(AtomicUsize::new(0));
		let counter = closes.clone();
		connection.on_close(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		host_side.send("appbus-port-closed", json!({ "connectionId": "c2" }));
		tokio::time::sleep(Duration::from_millis(20)).await;

		assert_eq!(closes.load(Ordering::SeqCst), 1);
		assert!(!connection.is_connected());
	}
}
