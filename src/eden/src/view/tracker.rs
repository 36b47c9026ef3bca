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

//! The shared mouse tracker.
//!
//! The host keeps exactly one cursor-polling interval; drag and resize
//! gestures subscribe to it and the interval runs only while at least one
//! subscriber exists.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration
};

use eden_runtime::Runtime;
use eden_utils::Position;
use tokio::task::JoinHandle;

/// The polling cadence of the tracker.
pub const TRACKER_INTERVAL: Duration = Duration::from_millis(8);

/// Identifies a tracker subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerToken(u64);

type TickFn = Arc<dyn Fn(Position, bool) + Send + Sync>;

struct TrackerState {
	subscribers: HashMap<u64, TickFn>,
	next_token: u64,
	task: Option<JoinHandle<()>>
}

/// Reference-counted cursor polling.
pub struct MouseTracker<R: Runtime> {
	runtime: Arc<R>,
	state: Arc<Mutex<TrackerState>>
}

impl<R: Runtime> MouseTracker<R> {
	/// Creates a stopped tracker.
	pub fn new(runtime: Arc<R>) -> Self {
		Self {
			runtime,
			state: Arc::new(Mutex::new(TrackerState {
				subscribers: HashMap::new(),
				next_token: 1,
				task: None
			}))
		}
	}

	/// Adds a subscriber, starting the polling interval if it is the
	/// first. The callback receives the cursor position and whether the
	/// primary button is held.
	pub fn subscribe<F: Fn(Position, bool) + Send + Sync + 'static>(&self, callback: F) -> TrackerToken {
		let mut state = self.state.lock().unwrap();
		let token = state.next_token;
		state.next_token += 1;
		state.subscribers.insert(token, Arc::new(callback));

		if state.task.is_none() {
			let runtime = self.runtime.clone();
			let shared = self.state.clone();
			state.task = Some(tokio::spawn(async move {
				let mut interval = tokio::time::interval(TRACKER_INTERVAL);
				loop {
					interval.tick().await;
					let subscribers: Vec<TickFn> = {
						let state = shared.lock().unwrap();
						if state.subscribers.is_empty() {
							break;
						}
						state.subscribers.values().cloned().collect()
					};
					let position = runtime.cursor_position();
					let pressed = runtime.mouse_pressed();
					for subscriber in subscribers {
						subscriber(position, pressed);
					}
				}
			}));
		}
		TrackerToken(token)
	}

	/// Removes a subscriber, stopping the interval when none remain.
	pub fn unsubscribe(&self, token: TrackerToken) {
		let mut state = self.state.lock().unwrap();
		state.subscribers.remove(&token.0);
		if state.subscribers.is_empty() {
			if let Some(task) = state.task.take() {
				task.abort();
			}
		}
	}

	/// The number of live subscribers.
	pub fn subscriber_count(&self) -> usize {
		self.state.lock().unwrap().subscribers.len()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc
	};

	use eden_runtime::mock::MockRuntime;
	use eden_utils::Position;

	use super::MouseTracker;

	#[tokio::test]
	async fn polls_while_subscribed() {
		let runtime = Arc::new(MockRuntime::new());
		runtime.set_cursor(Position::new(10.0, 20.0));
		let tracker = MouseTracker::new(runtime.clone());

		let ticks = Arc::new(AtomicUsize::new(0));
		let counter = ticks.clone();
		let token = tracker.subscribe(move |position, _pressed| {
			assert_eq!(position, Position::new(10.0, 20.0));
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(tracker.subscriber_count(), 1);

		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		assert!(ticks.load(Ordering::SeqCst) >= 2);

		tracker.unsubscribe(token);
		assert_eq!(tracker.subscriber_count(), 0);
		let settled = ticks.load(Ordering::SeqCst);
		tokio::time::sleep(std::time::Duration::from_millis(30)).await;
		assert!(ticks.load(Ordering::SeqCst) <= settled + 1);
	}
}
