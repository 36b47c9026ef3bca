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

//! Per-app settings over the settings store.
//!
//! Keys are laid out as `<appId>:<key>`. Apps read and write their own
//! namespace freely; touching another app's namespace goes through the
//! superuser verbs, gated by the `settings/<appId>/<key>` grant of the
//! current user. Autostart toggles live under the shell's own namespace
//! and are read after a session change, never from the seed directly.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::{
	error::{Error, Result},
	event::{subjects, EventBus},
	store::Store,
	user::UserManager
};

/// The shell's own settings namespace.
pub const SHELL_NAMESPACE: &str = "eden";
/// Key prefix of the per-app autostart toggles.
pub const AUTOSTART_PREFIX: &str = "autostart/";

/// Scoped access to the settings store.
pub struct SettingsManager {
	store: Arc<dyn Store>,
	events: Arc<EventBus>,
	users: Arc<UserManager>
}

impl SettingsManager {
	/// Creates a settings manager over the given store.
	pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>, users: Arc<UserManager>) -> Self {
		Self { store, events, users }
	}

	fn storage_key(app_id: &str, key: &str) -> String {
		format!("{app_id}:{key}")
	}

	/// Reads a setting in the app's own namespace.
	pub fn get(&self, app_id: &str, key: &str) -> Option<JsonValue> {
		self.store.get(&Self::storage_key(app_id, key))
	}

	/// Writes a setting in the app's own namespace.
	pub fn set(&self, app_id: &str, key: &str, value: JsonValue) {
		self.store.set(&Self::storage_key(app_id, key), value.clone());
		self.events.emit(subjects::SETTINGS_CHANGED, json!({ "appId": app_id, "key": key, "value": value }));
	}

	/// Deletes a setting in the app's own namespace.
	pub fn delete(&self, app_id: &str, key: &str) {
		if self.store.delete(&Self::storage_key(app_id, key)) {
			self.events.emit(subjects::SETTINGS_CHANGED, json!({ "appId": app_id, "key": key, "value": JsonValue::Null }));
		}
	}

	/// Reads a setting in another app's namespace; the current user must
	/// hold the covering `settings/<appId>/<key>` grant.
	pub fn get_su(&self, app_id: &str, key: &str) -> Result<Option<JsonValue>> {
		self.authorize(app_id, key, "settings/get/su")?;
		Ok(self.get(app_id, key))
	}

	/// Writes a setting in another app's namespace; the current user must
	/// hold the covering `settings/<appId>/<key>` grant.
	pub fn set_su(&self, app_id: &str, key: &str, value: JsonValue) -> Result<()> {
		self.authorize(app_id, key, "settings/set/su")?;
		self.set(app_id, key, value);
		Ok(())
	}

	fn authorize(&self, app_id: &str, key: &str, command: &str) -> Result<()> {
		if !self.users.can_access_setting(app_id, key) {
			return Err(Error::GrantDenied {
				grant: format!("settings/{app_id}/{key}"),
				command: command.to_string()
			});
		}
		Ok(())
	}

	/// The apps whose autostart toggle is set.
	pub fn autostart_apps(&self) -> Vec<String> {
		let prefix = Self::storage_key(SHELL_NAMESPACE, AUTOSTART_PREFIX);
		self.store
			.keys_with_prefix(&prefix)
			.into_iter()
			.filter(|key| self.store.get(key).and_then(|value| value.as_bool()).unwrap_or(false))
			.filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
			.collect()
	}

	/// Turns an app's autostart toggle on or off.
	pub fn set_autostart(&self, app_id: &str, enabled: bool) {
		self.set(SHELL_NAMESPACE, &format!("{AUTOSTART_PREFIX}{app_id}"), json!(enabled));
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use super::SettingsManager;
	use crate::{
		error::Error,
		event::{subjects, EventBus},
		scope::PermissionRegistry,
		store::{SeedConfig, Stores},
		user::UserManager
	};

	fn fixture() -> (Arc<EventBus>, SettingsManager) {
		let stores = Stores::in_memory();
		SeedConfig::parse(
			r#"{ "users": { "version": 1, "users": [
				{ "username": "alice", "displayName": "Alice", "grants": ["settings/io.pyke.clock/*"], "password": "pw" }
			], "defaultUser": "alice" } }"#
		)
		.unwrap()
		.apply(&stores);
		let events = Arc::new(EventBus::new(Arc::new(PermissionRegistry::new())));
		let users = Arc::new(UserManager::new(stores.users.clone(), events.clone()));
		users.establish_default();
		(events.clone(), SettingsManager::new(stores.settings.clone(), events, users))
	}

	#[test]
	fn scoped_read_write_and_change_events() {
		let (events, settings) = fixture();
		let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
		let sink = seen.clone();
		events.subscribe_internal(subjects::SETTINGS_CHANGED, move |payload| sink.lock().unwrap().push(payload.clone()));

		settings.set("io.pyke.files", "sort", json!("name"));
		assert_eq!(settings.get("io.pyke.files", "sort"), Some(json!("name")));
		assert_eq!(settings.get("io.pyke.files", "missing"), None);

		settings.delete("io.pyke.files", "sort");
		settings.delete("io.pyke.files", "sort");
		assert_eq!(settings.get("io.pyke.files", "sort"), None);

		let seen = seen.lock().unwrap();
		assert_eq!(seen.len(), 2, "one change per write and one per effective delete");
	}

	#[test]
	fn superuser_access_is_grant_gated() {
		let (_events, settings) = fixture();
		settings.set("io.pyke.clock", "format", json!("24h"));

		assert_eq!(settings.get_su("io.pyke.clock", "format").unwrap(), Some(json!("24h")));
		settings.set_su("io.pyke.clock", "format", json!("12h")).unwrap();

		let error = settings.get_su("io.pyke.files", "sort").unwrap_err();
		assert_eq!(error.to_string(), "Grant denied: settings/io.pyke.files/sort required for settings/get/su");
		assert!(matches!(error, Error::GrantDenied { .. }));
	}

	#[test]
	fn autostart_toggles() {
		let (_events, settings) = fixture();
		assert!(settings.autostart_apps().is_empty());
		settings.set_autostart("io.pyke.clock", true);
		settings.set_autostart("io.pyke.files", false);
		assert_eq!(settings.autostart_apps(), vec!["io.pyke.clock".to_string()]);
	}
}
