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

//! Persisted key-value stores.
//!
//! The shell keeps three string-keyed stores: user profiles
//! (`user:<username>`, `users:index`, `users:default`), settings
//! (`<appId>:<key>`), and app-scoped blobs (`<appId>:<key>`). The [`Store`]
//! trait abstracts the backing database; the in-memory implementation backs
//! tests and ephemeral sessions.

mod seed;

use std::{
	collections::HashMap,
	sync::{Arc, Mutex}
};

use serde_json::Value as JsonValue;

pub use seed::{SeedConfig, SeedSettings, SeedUser, SeedUsers};

/// A string-keyed JSON store.
pub trait Store: Send + Sync + 'static {
	/// Reads the value at `key`.
	fn get(&self, key: &str) -> Option<JsonValue>;
	/// Writes `value` at `key`, replacing any previous value.
	fn set(&self, key: &str, value: JsonValue);
	/// Deletes the value at `key`, returning whether it existed.
	fn delete(&self, key: &str) -> bool;
	/// All keys starting with the given prefix.
	fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// A [`Store`] backed by a process-local map.
#[derive(Default)]
pub struct MemoryStore {
	entries: Mutex<HashMap<String, JsonValue>>
}

impl MemoryStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}
}

impl Store for MemoryStore {
	fn get(&self, key: &str) -> Option<JsonValue> {
		self.entries.lock().unwrap().get(key).cloned()
	}

	fn set(&self, key: &str, value: JsonValue) {
		self.entries.lock().unwrap().insert(key.to_string(), value);
	}

	fn delete(&self, key: &str) -> bool {
		self.entries.lock().unwrap().remove(key).is_some()
	}

	fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
		let mut keys: Vec<String> = self.entries.lock().unwrap().keys().filter(|key| key.starts_with(prefix)).cloned().collect();
		keys.sort();
		keys
	}
}

/// The three stores the shell persists state in.
#[derive(Clone)]
pub struct Stores {
	/// User profiles and credentials.
	pub users: Arc<dyn Store>,
	/// Per-app settings.
	pub settings: Arc<dyn Store>,
	/// App-scoped blobs.
	pub blobs: Arc<dyn Store>
}

impl Stores {
	/// Creates a set of in-memory stores.
	pub fn in_memory() -> Self {
		Self {
			users: Arc::new(MemoryStore::new()),
			settings: Arc::new(MemoryStore::new()),
			blobs: Arc::new(MemoryStore::new())
		}
	}
}
