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

//! Duplex message ports.
//!
//! A [`Port`] is one end of a bidirectional, ordered, reliable message
//! channel. A [`PortChannel`] wraps a port and pumps it, exposing the two
//! roles every endpoint has: fire-and-forget `send`/`on`/`off` and
//! correlated `request`/`handle`/`remove_handler`. Correlation uses
//! monotonically unique message ids minted by the requesting end.

use std::{
	collections::HashMap,
	fmt,
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc, Mutex
	},
	time::Duration
};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result, NO_HANDLER_PREFIX};

/// Default timeout applied to [`PortChannel::request`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The framed messages that travel over a port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PortMessage {
	/// Fire-and-forget message.
	#[serde(rename_all = "camelCase")]
	Message {
		/// Method the listeners are keyed by.
		method: String,
		/// Arbitrary JSON payload.
		payload: JsonValue
	},
	/// Correlated request; the peer must answer with a `Response` carrying
	/// the same message id.
	#[serde(rename_all = "camelCase")]
	Request {
		/// Method the handler is keyed by.
		method: String,
		/// Arbitrary JSON payload.
		payload: JsonValue,
		/// Correlation id, unique per requesting endpoint.
		message_id: u64
	},
	/// Answer to a `Request`; carries either a payload or an error string.
	#[serde(rename_all = "camelCase")]
	Response {
		/// Correlation id of the request being answered.
		message_id: u64,
		/// The handler's return value.
		#[serde(skip_serializing_if = "Option::is_none")]
		payload: Option<JsonValue>,
		/// The handler's error, if it failed.
		#[serde(skip_serializing_if = "Option::is_none")]
		error: Option<String>
	}
}

/// One end of a duplex message channel. Transferable between processes;
/// wrap it in a [`PortChannel`] to start pumping.
pub struct Port {
	tx: mpsc::UnboundedSender<PortMessage>,
	rx: mpsc::UnboundedReceiver<PortMessage>
}

impl Port {
	/// Creates a connected pair of ports.
	pub fn pair() -> (Port, Port) {
		let (tx_a, rx_a) = mpsc::unbounded_channel();
		let (tx_b, rx_b) = mpsc::unbounded_channel();
		(Port { tx: tx_a, rx: rx_b }, Port { tx: tx_b, rx: rx_a })
	}
}

impl fmt::Debug for Port {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Port").finish_non_exhaustive()
	}
}

/// Identifies a fire-and-forget listener for [`PortChannel::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerFn = Arc<dyn Fn(JsonValue) + Send + Sync>;
type HandlerFn = Arc<dyn Fn(JsonValue) -> BoxFuture<'static, std::result::Result<JsonValue, String>> + Send + Sync>;

struct Listener {
	id: ListenerId,
	once: bool,
	callback: ListenerFn
}

struct ChannelInner {
	tx: Mutex<Option<mpsc::UnboundedSender<PortMessage>>>,
	listeners: Mutex<HashMap<String, Vec<Listener>>>,
	handlers: Mutex<HashMap<String, HandlerFn>>,
	pending: Mutex<HashMap<u64, oneshot::Sender<std::result::Result<JsonValue, String>>>>,
	close_listeners: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
	closed: AtomicBool,
	next_message_id: AtomicU64,
	next_listener_id: AtomicU64
}

impl ChannelInner {
	fn post(&self, message: PortMessage) -> Result<()> {
		let tx = self.tx.lock().unwrap();
		match tx.as_ref() {
			Some(tx) if tx.send(message).is_ok() => Ok(()),
			_ => Err(Error::ConnectionClosed)
		}
	}

	fn dispatch_message(&self, method: &str, payload: JsonValue) {
		let callbacks: Vec<ListenerFn> = {
			let mut listeners = self.listeners.lock().unwrap();
			match listeners.get_mut(method) {
				Some(entries) => {
					let callbacks = entries.iter().map(|listener| listener.callback.clone()).collect();
					entries.retain(|listener| !listener.once);
					if entries.is_empty() {
						listeners.remove(method);
					}
					callbacks
				}
				None => {
					tracing::debug!("dropping message `{method}` with no listeners");
					return;
				}
			}
		};
		for callback in callbacks {
			callback(payload.clone());
		}
	}

	fn complete_request(&self, message_id: u64, result: std::result::Result<JsonValue, String>) {
		if let Some(sender) = self.pending.lock().unwrap().remove(&message_id) {
			// the requester may have timed out and dropped the receiver
			let _ = sender.send(result);
		} else {
			tracing::debug!("dropping response for unknown message id {message_id}");
		}
	}

	/// Runs the close path exactly once, no matter which end initiated it.
	fn shutdown(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.tx.lock().unwrap().take();
		self.listeners.lock().unwrap().clear();
		self.handlers.lock().unwrap().clear();
		// dropping the senders rejects every outstanding request with
		// `ConnectionClosed` on the requesting side
		self.pending.lock().unwrap().clear();
		let close_listeners: Vec<_> = self.close_listeners.lock().unwrap().drain(..).collect();
		for listener in close_listeners {
			listener();
		}
	}
}

/// A pumped duplex message port.
///
/// Cloning yields another handle to the same endpoint. The channel closes
/// when [`close`](Self::close) is called on either end or when the peer's
/// port is dropped; every outstanding request is then rejected with
/// [`Error::ConnectionClosed`] and close listeners fire exactly once.
#[derive(Clone)]
pub struct PortChannel {
	inner: Arc<ChannelInner>
}

impl fmt::Debug for PortChannel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PortChannel").field("connected", &self.is_connected()).finish()
	}
}

impl PortChannel {
	/// Wraps a port and begins pumping it on the current tokio runtime.
	pub fn attach(port: Port) -> Self {
		let Port { tx, mut rx } = port;
		let inner = Arc::new(ChannelInner {
			tx: Mutex::new(Some(tx)),
			listeners: Mutex::new(HashMap::new()),
			handlers: Mutex::new(HashMap::new()),
			pending: Mutex::new(HashMap::new()),
			close_listeners: Mutex::new(Vec::new()),
			closed: AtomicBool::new(false),
			next_message_id: AtomicU64::new(1),
			next_listener_id: AtomicU64::new(1)
		});

		let pump = inner.clone();
		tokio::spawn(async move {
			while let Some(message) = rx.recv().await {
				if pump.closed.load(Ordering::SeqCst) {
					break;
				}
				match message {
					PortMessage::Message { method, payload } => pump.dispatch_message(&method, payload),
					PortMessage::Request { method, payload, message_id } => {
						let handler = pump.handlers.lock().unwrap().get(&method).cloned();
						match handler {
							Some(handler) => {
								let responder = pump.clone();
								tokio::spawn(async move {
									let response = match handler(payload).await {
										Ok(payload) => PortMessage::Response { message_id, payload: Some(payload), error: None },
										Err(error) => PortMessage::Response { message_id, payload: None, error: Some(error) }
									};
									if responder.post(response).is_err() {
										tracing::debug!("response for message {message_id} dropped: port closed");
									}
								});
							}
							None => {
								let _ = pump.post(PortMessage::Response {
									message_id,
									payload: None,
									error: Some(format!("{NO_HANDLER_PREFIX}{method}"))
								});
							}
						}
					}
					PortMessage::Response { message_id, payload, error } => match error {
						Some(error) => pump.complete_request(message_id, Err(error)),
						None => pump.complete_request(message_id, Ok(payload.unwrap_or(JsonValue::Null)))
					}
				}
			}
			// peer end closed or dropped
			pump.shutdown();
		});

		Self { inner }
	}

	/// Creates a connected pair of pumped channels, mostly useful in tests
	/// and for in-process endpoints.
	pub fn pair() -> (Self, Self) {
		let (a, b) = Port::pair();
		(Self::attach(a), Self::attach(b))
	}

	/// Whether the channel is still connected.
	pub fn is_connected(&self) -> bool {
		!self.inner.closed.load(Ordering::SeqCst)
	}

	/// Sends a fire-and-forget message. Send failures are swallowed and
	/// logged.
	pub fn send(&self, method: &str, payload: JsonValue) {
		if self
			.inner
			.post(PortMessage::Message {
				method: method.to_string(),
				payload
			})
			.is_err()
		{
			tracing::debug!("send `{method}` dropped: port closed");
		}
	}

	/// Registers a fire-and-forget listener. Listeners for the same method
	/// run in registration order.
	pub fn on<F: Fn(JsonValue) + Send + Sync + 'static>(&self, method: &str, callback: F) -> ListenerId {
		self.register_listener(method, false, Arc::new(callback))
	}

	/// Registers a listener that removes itself after the first delivery.
	pub fn once<F: Fn(JsonValue) + Send + Sync + 'static>(&self, method: &str, callback: F) -> ListenerId {
		self.register_listener(method, true, Arc::new(callback))
	}

	fn register_listener(&self, method: &str, once: bool, callback: ListenerFn) -> ListenerId {
		let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst));
		self.inner.listeners.lock().unwrap().entry(method.to_string()).or_default().push(Listener { id, once, callback });
		id
	}

	/// Removes a previously registered listener.
	pub fn off(&self, method: &str, id: ListenerId) {
		let mut listeners = self.inner.listeners.lock().unwrap();
		if let Some(entries) = listeners.get_mut(method) {
			entries.retain(|listener| listener.id != id);
			if entries.is_empty() {
				listeners.remove(method);
			}
		}
	}

	/// Installs the request handler for a method. Exactly one handler may
	/// exist per method per endpoint.
	pub fn handle<F, Fut>(&self, method: &str, handler: F) -> Result<()>
	where
		F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = std::result::Result<JsonValue, String>> + Send + 'static
	{
		use std::collections::hash_map::Entry;
		let mut handlers = self.inner.handlers.lock().unwrap();
		match handlers.entry(method.to_string()) {
			Entry::Occupied(_) => Err(Error::HandlerAlreadyRegistered(method.to_string())),
			Entry::Vacant(entry) => {
				entry.insert(Arc::new(move |payload| Box::pin(handler(payload))));
				Ok(())
			}
		}
	}

	/// Removes the request handler for a method, if any.
	pub fn remove_handler(&self, method: &str) {
		self.inner.handlers.lock().unwrap().remove(method);
	}

	/// Sends a correlated request with the default 30 second timeout.
	pub async fn request(&self, method: &str, payload: JsonValue) -> Result<JsonValue> {
		self.request_with_timeout(method, payload, DEFAULT_REQUEST_TIMEOUT).await
	}

	/// Sends a correlated request, rejecting with [`Error::RequestTimeout`]
	/// if no response arrives within `timeout`.
	pub async fn request_with_timeout(&self, method: &str, payload: JsonValue, timeout: Duration) -> Result<JsonValue> {
		if !self.is_connected() {
			return Err(Error::ConnectionClosed);
		}

		let message_id = self.inner.next_message_id.fetch_add(1, Ordering::SeqCst);
		let (sender, receiver) = oneshot::channel();
		self.inner.pending.lock().unwrap().insert(message_id, sender);

		if let Err(error) = self.inner.post(PortMessage::Request {
			method: method.to_string(),
			payload,
			message_id
		}) {
			self.inner.pending.lock().unwrap().remove(&message_id);
			return Err(error);
		}

		match tokio::time::timeout(timeout, receiver).await {
			Err(_) => {
				self.inner.pending.lock().unwrap().remove(&message_id);
				Err(Error::RequestTimeout(method.to_string()))
			}
			Ok(Err(_)) => Err(Error::ConnectionClosed),
			Ok(Ok(Ok(payload))) => Ok(payload),
			Ok(Ok(Err(error))) => Err(Error::from_remote(error))
		}
	}

	/// Registers a callback fired exactly once when the channel closes,
	/// from either end.
	pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) {
		if !self.is_connected() {
			callback();
			return;
		}
		self.inner.close_listeners.lock().unwrap().push(Box::new(callback));
	}

	/// Closes the channel: clears local listeners and handlers, rejects
	/// outstanding requests, and drops the sending half so the peer
	/// observes the closure.
	pub fn close(&self) {
		self.inner.shutdown();
	}
}

#[cfg(test)]
mod tests {
	use std::{
		sync::{
			atomic::{AtomicUsize, Ordering},
			Arc, Mutex
		},
		time::Duration
	};

	use serde_json::{json, Value as JsonValue};

	use super::{PortChannel, PortMessage};
	use crate::error::Error;

	async fn settle() {
		// lets pump tasks drain their queues
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	#[test]
	fn wire_format_matches_protocol() {
		let message = serde_json::to_value(PortMessage::Message {
			method: "ping".into(),
			payload: json!({ "n": 1 })
		})
		.unwrap();
		assert_eq!(message, json!({ "type": "message", "method": "ping", "payload": { "n": 1 } }));

		let request = serde_json::to_value(PortMessage::Request {
			method: "ping".into(),
			payload: JsonValue::Null,
			message_id: 7
		})
		.unwrap();
		assert_eq!(request, json!({ "type": "request", "method": "ping", "payload": null, "messageId": 7 }));

		let ok = serde_json::to_value(PortMessage::Response {
			message_id: 7,
			payload: Some(json!(42)),
			error: None
		})
		.unwrap();
		assert_eq!(ok, json!({ "type": "response", "messageId": 7, "payload": 42 }));

		let err = serde_json::to_value(PortMessage::Response {
			message_id: 7,
			payload: None,
			error: Some("boom".into())
		})
		.unwrap();
		assert_eq!(err, json!({ "type": "response", "messageId": 7, "error": "boom" }));
	}

	#[tokio::test]
	async fn send_reaches_listeners_in_order() {
		let (a, b) = PortChannel::pair();
		let received = Arc::new(Mutex::new(Vec::new()));

		let first = received.clone();
		b.on("greet", move |payload| first.lock().unwrap().push(format!("first:{payload}")));
		let second = received.clone();
		b.on("greet", move |payload| second.lock().unwrap().push(format!("second:{payload}")));

		a.send("greet", json!("hi"));
		settle().await;

		assert_eq!(*received.lock().unwrap(), vec![r#"first:"hi""#.to_string(), r#"second:"hi""#.to_string()]);
	}

	#[tokio::test]
	async fn once_listener_fires_a_single_time() {
		let (a, b) = PortChannel::pair();
		let count = Arc::new(AtomicUsize::new(0));
		let counter = count.clone();
		b.once("tick", move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		a.send("tick", JsonValue::Null);
		a.send("tick", JsonValue::Null);
		settle().await;

		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn off_unregisters_listener() {
		let (a, b) = PortChannel::pair();
		let count = Arc::new(AtomicUsize::new(0));
		let counter = count.clone();
		let id = b.on("tick", move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		b.off("tick", id);

		a.send("tick", JsonValue::Null);
		settle().await;

		assert_eq!(count.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn request_round_trip() {
		let (a, b) = PortChannel::pair();
		b.handle("add-one", |payload| async move { Ok(json!(payload.as_i64().unwrap() + 1)) }).unwrap();

		let response = a.request("add-one", json!(41)).await.unwrap();
		assert_eq!(response, json!(42));
	}

	#[tokio::test]
	async fn concurrent_requests_correlate_out_of_order() {
		let (a, b) = PortChannel::pair();
		b.handle("echo-after", |payload| async move {
			let delay = payload["delay"].as_u64().unwrap();
			tokio::time::sleep(Duration::from_millis(delay)).await;
			Ok(payload["value"].clone())
		})
		.unwrap();

		let slow = a.request("echo-after", json!({ "delay": 50, "value": "slow" }));
		let fast = a.request("echo-after", json!({ "delay": 1, "value": "fast" }));
		let (slow, fast) = tokio::join!(slow, fast);
		assert_eq!(slow.unwrap(), json!("slow"));
		assert_eq!(fast.unwrap(), json!("fast"));
	}

	#[tokio::test]
	async fn request_without_handler_rejects() {
		let (a, _b) = PortChannel::pair();
		let error = a.request("missing", JsonValue::Null).await.unwrap_err();
		assert!(matches!(error, Error::NoHandler(method) if method == "missing"));
	}

	#[tokio::test]
	async fn duplicate_handler_is_rejected() {
		let (_a, b) = PortChannel::pair();
		b.handle("work", |_| async { Ok(JsonValue::Null) }).unwrap();
		let error = b.handle("work", |_| async { Ok(JsonValue::Null) }).unwrap_err();
		assert_eq!(error.to_string(), "Handler already registered for method work");

		b.remove_handler("work");
		b.handle("work", |_| async { Ok(JsonValue::Null) }).unwrap();
	}

	#[tokio::test]
	async fn request_times_out() {
		let (a, b) = PortChannel::pair();
		b.handle("stall", |_| async {
			tokio::time::sleep(Duration::from_secs(60)).await;
			Ok(JsonValue::Null)
		})
		.unwrap();

		let error = a.request_with_timeout("stall", JsonValue::Null, Duration::from_millis(20)).await.unwrap_err();
		assert_eq!(error.to_string(), "Request stall timed out");
	}

	#[tokio::test]
	async fn close_rejects_pending_and_fires_close_listeners_once() {
		let (a, b) = PortChannel::pair();
		b.handle("stall", |_| async {
			tokio::time::sleep(Duration::from_secs(60)).await;
			Ok(JsonValue::Null)
		})
		.unwrap();

		let closes = Arc::new(AtomicUsize::new(0));
		let counter = closes.clone();
		a.on_close(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		let pending = tokio::spawn({
			let a = a.clone();
			async move { a.request("stall", JsonValue::Null).await }
		});
		settle().await;

		a.close();
		a.close();
		settle().await;

		assert!(matches!(pending.await.unwrap().unwrap_err(), Error::ConnectionClosed));
		assert_eq!(closes.load(Ordering::SeqCst), 1);
		assert!(!a.is_connected());
	}

	#[tokio::test]
	async fn peer_close_propagates() {
		let (a, b) = PortChannel::pair();
		let closed = Arc::new(AtomicUsize::new(0));
		let counter = closed.clone();
		b.on_close(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		a.close();
		settle().await;

		assert_eq!(closed.load(Ordering::SeqCst), 1);
		assert!(!b.is_connected());
	}
}
