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

//! The subscription bus.
//!
//! Every broadcast subject carries four disjoint subscriber sets: views
//! (keyed by view id), workers (keyed by app id), the host shell, and
//! in-process callbacks. Notification order is internal → foundation →
//! views → workers; individual deliveries are fire-and-forget and failures
//! never abort the loop.

pub mod subjects;

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex}
};

use eden_runtime::{PortChannel, ViewId};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::{
	error::{Error, Result},
	scope::PermissionRegistry
};

/// Identifies an internal subscription for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

type InternalListener = Arc<dyn Fn(&JsonValue) + Send + Sync>;

#[derive(Default)]
struct SubjectSinks {
	views: HashSet<ViewId>,
	workers: HashSet<String>,
	foundation: bool,
	internal: HashMap<Uuid, InternalListener>
}

impl SubjectSinks {
	fn is_empty(&self) -> bool {
		self.views.is_empty() && self.workers.is_empty() && !self.foundation && self.internal.is_empty()
	}
}

#[derive(Default)]
struct EventBusInner {
	subjects: HashMap<String, SubjectSinks>,
	/// view id → (owning app, shell-side channel)
	view_channels: HashMap<ViewId, (String, PortChannel)>,
	/// app id → shell-side parent channel of the worker
	worker_channels: HashMap<String, PortChannel>,
	foundation: Option<PortChannel>
}

/// Multi-subject publish/subscribe with targeted delivery.
pub struct EventBus {
	permissions: Arc<PermissionRegistry>,
	inner: Mutex<EventBusInner>
}

impl EventBus {
	/// Creates an event bus gated by the given permission registry.
	pub fn new(permissions: Arc<PermissionRegistry>) -> Self {
		Self {
			permissions,
			inner: Mutex::new(EventBusInner::default())
		}
	}

	fn guard_subscription(&self, app_id: &str, subject: &str) -> Result<()> {
		if let Some(required) = self.permissions.event_permission(subject) {
			if !self.permissions.has_permission(app_id, &required) {
				return Err(Error::PermissionDenied {
					permission: required,
					command: format!("event/subscribe {subject}")
				});
			}
		}
		Ok(())
	}

	/// Makes a view's channel addressable by the bus.
	pub fn register_view_channel(&self, view_id: ViewId, app_id: &str, channel: PortChannel) {
		self.inner.lock().unwrap().view_channels.insert(view_id, (app_id.to_string(), channel));
	}

	/// Drops a view's channel and every subscription it holds.
	pub fn unregister_view_channel(&self, view_id: ViewId) {
		let mut inner = self.inner.lock().unwrap();
		inner.view_channels.remove(&view_id);
		inner.subjects.retain(|_, sinks| {
			sinks.views.remove(&view_id);
			!sinks.is_empty()
		});
	}

	/// Makes a worker's parent channel addressable by the bus.
	pub fn register_worker_channel(&self, app_id: &str, channel: PortChannel) {
		self.inner.lock().unwrap().worker_channels.insert(app_id.to_string(), channel);
	}

	/// Drops a worker's channel and every subscription it holds.
	pub fn unregister_worker_channel(&self, app_id: &str) {
		let mut inner = self.inner.lock().unwrap();
		inner.worker_channels.remove(app_id);
		inner.subjects.retain(|_, sinks| {
			sinks.workers.remove(app_id);
			!sinks.is_empty()
		});
	}

	/// Sets the host shell's channel.
	pub fn set_foundation_channel(&self, channel: PortChannel) {
		self.inner.lock().unwrap().foundation = Some(channel);
	}

	/// Subscribes a view to a subject, enforcing the subject's required
	/// permission against the view's app.
	pub fn subscribe_view(&self, view_id: ViewId, subject: &str) -> Result<()> {
		let app_id = {
			let inner = self.inner.lock().unwrap();
			match inner.view_channels.get(&view_id) {
				Some((app_id, _)) => app_id.clone(),
				None => return Err(Error::ViewNotFound(view_id))
			}
		};
		self.guard_subscription(&app_id, subject)?;
		self.inner.lock().unwrap().subjects.entry(subject.to_string()).or_default().views.insert(view_id);
		Ok(())
	}

	/// Removes a view's subscription to a subject.
	pub fn unsubscribe_view(&self, view_id: ViewId, subject: &str) {
		let mut inner = self.inner.lock().unwrap();
		if let Some(sinks) = inner.subjects.get_mut(subject) {
			sinks.views.remove(&view_id);
			if sinks.is_empty() {
				inner.subjects.remove(subject);
			}
		}
	}

	/// Subscribes an app's worker to a subject, enforcing the subject's
	/// required permission against the app.
	pub fn subscribe_worker(&self, app_id: &str, subject: &str) -> Result<()> {
		if !self.inner.lock().unwrap().worker_channels.contains_key(app_id) {
			return Err(Error::NotRunning(app_id.to_string()));
		}
		self.guard_subscription(app_id, subject)?;
		self.inner.lock().unwrap().subjects.entry(subject.to_string()).or_default().workers.insert(app_id.to_string());
		Ok(())
	}

	/// Removes a worker's subscription to a subject.
	pub fn unsubscribe_worker(&self, app_id: &str, subject: &str) {
		let mut inner = self.inner.lock().unwrap();
		if let Some(sinks) = inner.subjects.get_mut(subject) {
			sinks.workers.remove(app_id);
			if sinks.is_empty() {
				inner.subjects.remove(subject);
			}
		}
	}

	/// Subscribes the host shell to a subject.
	pub fn subscribe_foundation(&self, subject: &str) {
		self.inner.lock().unwrap().subjects.entry(subject.to_string()).or_default().foundation = true;
	}

	/// Removes the host shell's subscription to a subject.
	pub fn unsubscribe_foundation(&self, subject: &str) {
		let mut inner = self.inner.lock().unwrap();
		if let Some(sinks) = inner.subjects.get_mut(subject) {
			sinks.foundation = false;
			if sinks.is_empty() {
				inner.subjects.remove(subject);
			}
		}
	}

	/// Subscribes an in-process callback to a subject. Internal
	/// subscriptions are unrestricted.
	pub fn subscribe_internal<F: Fn(&JsonValue) + Send + Sync + 'static>(&self, subject: &str, listener: F) -> SubscriptionToken {
		let token = Uuid::new_v4();
		self.inner.lock().unwrap().subjects.entry(subject.to_string()).or_default().internal.insert(token, Arc::new(listener));
		SubscriptionToken(token)
	}

	/// Removes an internal subscription.
	pub fn unsubscribe_internal(&self, subject: &str, token: SubscriptionToken) {
		let mut inner = self.inner.lock().unwrap();
		if let Some(sinks) = inner.subjects.get_mut(subject) {
			sinks.internal.remove(&token.0);
			if sinks.is_empty() {
				inner.subjects.remove(subject);
			}
		}
	}

	/// Broadcasts a payload to every subscriber of a subject, in the order
	/// internal → foundation → views → workers.
	pub fn emit(&self, subject: &str, payload: JsonValue) {
		let (internal, foundation, views, workers) = {
			let inner = self.inner.lock().unwrap();
			let sinks = match inner.subjects.get(subject) {
				Some(sinks) => sinks,
				None => return
			};
			let internal: Vec<InternalListener> = sinks.internal.values().cloned().collect();
			let foundation = if sinks.foundation { inner.foundation.clone() } else { None };
			let views: Vec<PortChannel> = sinks
				.views
				.iter()
				.filter_map(|view_id| inner.view_channels.get(view_id).map(|(_, channel)| channel.clone()))
				.collect();
			let workers: Vec<PortChannel> = sinks
				.workers
				.iter()
				.filter_map(|app_id| inner.worker_channels.get(app_id).cloned())
				.collect();
			(internal, foundation, views, workers)
		};

		for listener in internal {
			listener(&payload);
		}
		if let Some(channel) = foundation {
			channel.send(subject, payload.clone());
		}
		for channel in views {
			channel.send(subject, payload.clone());
		}
		for channel in workers {
			channel.send("shell-event", json!({ "kind": "shell-event", "eventName": subject, "payload": payload }));
		}
	}

	/// Delivers a payload to a single view, only if that view is
	/// subscribed to the subject.
	pub fn notify_view(&self, subject: &str, view_id: ViewId, payload: JsonValue) {
		let channel = {
			let inner = self.inner.lock().unwrap();
			match inner.subjects.get(subject) {
				Some(sinks) if sinks.views.contains(&view_id) => inner.view_channels.get(&view_id).map(|(_, channel)| channel.clone()),
				_ => None
			}
		};
		if let Some(channel) = channel {
			channel.send(subject, payload);
		}
	}

	/// The number of subjects with at least one subscriber.
	pub fn subject_count(&self) -> usize {
		self.inner.lock().unwrap().subjects.len()
	}
}
