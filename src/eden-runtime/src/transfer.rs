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

//! Out-of-band port passing.
//!
//! Ports never travel inside the JSON wire format; the host hands them to a
//! process through a side channel, tagged with enough metadata for the
//! receiving endpoint to route them. Each process drains its transfers
//! through a [`PortMailbox`].

use std::{
	collections::HashMap,
	fmt,
	sync::{Arc, Mutex},
	time::Duration
};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{
	error::{Error, Result},
	port::Port
};

/// Which end of a brokered channel a transferred port is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortRole {
	/// The service end of an AppBus connection.
	Service,
	/// The client end of an AppBus connection.
	Client,
	/// The view's end of the app's worker channel, delivered once the view
	/// has loaded.
	Worker
}

/// A port handed to a process out-of-band, with routing metadata.
pub struct PortTransfer {
	/// The connection this port belongs to. Worker-channel transfers use
	/// `worker/<appId>`.
	pub connection_id: String,
	/// Which end of the channel this is.
	pub role: PortRole,
	/// The brokered service, for AppBus transfers.
	pub service_name: Option<String>,
	/// The app on the other end of the channel.
	pub peer_app_id: Option<String>,
	/// The port itself.
	pub port: Port
}

impl fmt::Debug for PortTransfer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PortTransfer")
			.field("connection_id", &self.connection_id)
			.field("role", &self.role)
			.field("service_name", &self.service_name)
			.field("peer_app_id", &self.peer_app_id)
			.finish_non_exhaustive()
	}
}

type TransferHandler = Box<dyn Fn(PortTransfer) + Send + Sync>;

#[derive(Default)]
struct MailboxInner {
	queued: Mutex<HashMap<String, PortTransfer>>,
	waiters: Mutex<HashMap<String, oneshot::Sender<PortTransfer>>>,
	handler: Mutex<Option<TransferHandler>>
}

/// Receives the ports transferred to a single process.
///
/// A transfer is routed to a waiter registered for its connection id first,
/// then to the process-wide handler, and is queued otherwise.
#[derive(Clone, Default)]
pub struct PortMailbox {
	inner: Arc<MailboxInner>
}

impl fmt::Debug for PortMailbox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PortMailbox").finish_non_exhaustive()
	}
}

impl PortMailbox {
	/// Creates an empty mailbox.
	pub fn new() -> Self {
		Self::default()
	}

	/// Delivers a transfer to this process.
	pub fn deliver(&self, transfer: PortTransfer) {
		let waiter = self.inner.waiters.lock().unwrap().remove(&transfer.connection_id);
		if let Some(waiter) = waiter {
			if let Err(transfer) = waiter.send(transfer) {
				// waiter timed out between lookup and send
				self.route_unclaimed(transfer);
			}
			return;
		}
		self.route_unclaimed(transfer);
	}

	fn route_unclaimed(&self, transfer: PortTransfer) {
		let handler = self.inner.handler.lock().unwrap();
		match handler.as_ref() {
			Some(handler) => handler(transfer),
			None => {
				self.inner.queued.lock().unwrap().insert(transfer.connection_id.clone(), transfer);
			}
		}
	}

	/// Installs the process-wide handler for transfers nobody is waiting
	/// on, draining anything already queued.
	pub fn on_transfer<F: Fn(PortTransfer) + Send + Sync + 'static>(&self, handler: F) {
		*self.inner.handler.lock().unwrap() = Some(Box::new(handler));
		let queued: Vec<PortTransfer> = self.inner.queued.lock().unwrap().drain().map(|(_, transfer)| transfer).collect();
		for transfer in queued {
			self.route_unclaimed(transfer);
		}
	}

	/// Waits for the port of a specific connection, rejecting with
	/// [`Error::PortArrivalTimeout`] when it does not arrive in time.
	pub async fn await_port(&self, connection_id: &str, timeout: Duration) -> Result<PortTransfer> {
		if let Some(transfer) = self.inner.queued.lock().unwrap().remove(connection_id) {
			return Ok(transfer);
		}

		let (sender, receiver) = oneshot::channel();
		self.inner.waiters.lock().unwrap().insert(connection_id.to_string(), sender);

		// a transfer may have been queued between the check and the waiter
		// registration; claim it back if so
		if let Some(transfer) = self.inner.queued.lock().unwrap().remove(connection_id) {
			self.inner.waiters.lock().unwrap().remove(connection_id);
			return Ok(transfer);
		}

		match tokio::time::timeout(timeout, receiver).await {
			Ok(Ok(transfer)) => Ok(transfer),
			_ => {
				self.inner.waiters.lock().unwrap().remove(connection_id);
				Err(Error::PortArrivalTimeout {
					connection_id: connection_id.to_string(),
					timeout_ms: timeout.as_millis() as u64
				})
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::{PortMailbox, PortRole, PortTransfer};
	use crate::{error::Error, port::Port};

	fn transfer(connection_id: &str) -> PortTransfer {
		let (port, _peer) = Port::pair();
		PortTransfer {
			connection_id: connection_id.to_string(),
			role: PortRole::Client,
			service_name: Some("svc".into()),
			peer_app_id: Some("app.peer".into()),
			port
		}
	}

	#[tokio::test]
	async fn queued_transfer_is_claimed() {
		let mailbox = PortMailbox::new();
		mailbox.deliver(transfer("c1"));
		let claimed = mailbox.await_port("c1", Duration::from_millis(10)).await.unwrap();
		assert_eq!(claimed.connection_id, "c1");
	}

	#[tokio::test]
	async fn waiter_receives_late_transfer() {
		let mailbox = PortMailbox::new();
		let waiting = tokio::spawn({
			let mailbox = mailbox.clone();
			async move { mailbox.await_port("c2", Duration::from_secs(1)).await }
		});
		tokio::time::sleep(Duration::from_millis(10)).await;
		mailbox.deliver(transfer("c2"));
		assert!(waiting.await.unwrap().is_ok());
	}

	#[tokio::test]
	async fn arrival_timeout() {
		let mailbox = PortMailbox::new();
		let error = mailbox.await_port("c3", Duration::from_millis(10)).await.unwrap_err();
		assert_eq!(error.to_string(), "Port for connection c3 not received within 10ms");
		assert!(matches!(error, Error::PortArrivalTimeout { .. }));
	}

	#[tokio::test]
	async fn handler_receives_unclaimed_transfers() {
		let mailbox = PortMailbox::new();
		mailbox.deliver(transfer("early"));

		let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
		mailbox.on_transfer(move |transfer| {
			let _ = sender.send(transfer.connection_id.clone());
		});
		mailbox.deliver(transfer("late"));

		assert_eq!(receiver.recv().await.unwrap(), "early");
		assert_eq!(receiver.recv().await.unwrap(), "late");
	}
}
