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

//! One-shot seed configuration.
//!
//! A seed file populates the stores on first boot. Each section carries a
//! version; a section is applied only when its version is newer than the
//! marker persisted by a previous application, so re-running the same seed
//! is a no-op and user edits survive restarts.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::Stores;
use crate::user::{self, StoredUser, UserProfile, UserRole};

const USERS_SEED_MARKER: &str = "_seed:users:version";
const SETTINGS_SEED_MARKER: &str = "_seed:settings:version";

/// A user record in the seed file. The only path that may create vendor
/// users.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
	/// Unique username.
	pub username: String,
	/// Display name shown in the shell.
	pub display_name: String,
	/// The user's role.
	#[serde(default)]
	pub role: UserRole,
	/// The grants the user holds.
	#[serde(default)]
	pub grants: Vec<String>,
	/// Initial plain-text password, hashed at application time.
	pub password: String
}

/// The `users` section of a seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUsers {
	/// Section version; bump to re-apply.
	pub version: u64,
	/// The users to create.
	pub users: Vec<SeedUser>,
	/// The username established as current on startup.
	#[serde(default)]
	pub default_user: Option<String>
}

/// The `settings` section of a seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSettings {
	/// Section version; bump to re-apply.
	pub version: u64,
	/// Settings to write, keyed by app id and then by setting key.
	#[serde(default)]
	pub entries: HashMap<String, HashMap<String, JsonValue>>
}

/// A parsed seed file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedConfig {
	/// The users section.
	#[serde(default)]
	pub users: Option<SeedUsers>,
	/// The settings section.
	#[serde(default)]
	pub settings: Option<SeedSettings>
}

impl SeedConfig {
	/// Parses a seed file from JSON.
	pub fn parse(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}

	/// Applies every section whose version is newer than its persisted
	/// marker.
	pub fn apply(&self, stores: &Stores) {
		if let Some(users) = &self.users {
			let applied = stores.users.get(USERS_SEED_MARKER).and_then(|marker| marker.as_u64()).unwrap_or(0);
			if users.version > applied {
				tracing::debug!("applying users seed version {} (was {applied})", users.version);
				let mut index = Vec::new();
				for seed_user in &users.users {
					let salt = user::generate_salt();
					let stored = StoredUser {
						profile: UserProfile {
							username: seed_user.username.clone(),
							display_name: seed_user.display_name.clone(),
							role: seed_user.role,
							grants: seed_user.grants.clone(),
							created_at: crate::util::now_millis(),
							updated_at: crate::util::now_millis()
						},
						password_hash: user::hash_password(&seed_user.password, &salt),
						salt
					};
					stores.users.set(&format!("user:{}", seed_user.username), serde_json::to_value(&stored).expect("user records always serialize"));
					index.push(seed_user.username.clone());
				}
				stores.users.set("users:index", json!(index));
				if let Some(default_user) = &users.default_user {
					stores.users.set("users:default", json!(default_user));
				}
				stores.users.set(USERS_SEED_MARKER, json!(users.version));
			}
		}

		if let Some(settings) = &self.settings {
			let applied = stores.settings.get(SETTINGS_SEED_MARKER).and_then(|marker| marker.as_u64()).unwrap_or(0);
			if settings.version > applied {
				tracing::debug!("applying settings seed version {} (was {applied})", settings.version);
				for (app_id, entries) in &settings.entries {
					for (key, value) in entries {
						stores.settings.set(&format!("{app_id}:{key}"), value.clone());
					}
				}
				stores.settings.set(SETTINGS_SEED_MARKER, json!(settings.version));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::SeedConfig;
	use crate::store::Stores;

	const SEED: &str = r#"{
		"users": {
			"version": 1,
			"users": [
				{ "username": "vendor", "displayName": "Vendor", "role": "vendor", "grants": ["*"], "password": "hunter2" },
				{ "username": "alice", "displayName": "Alice", "grants": ["apps/launch/io.pyke.files"], "password": "wonderland" }
			],
			"defaultUser": "alice"
		},
		"settings": {
			"version": 1,
			"entries": {
				"eden": { "locale": "en" }
			}
		}
	}"#;

	#[test]
	fn seed_applies_once() {
		let stores = Stores::in_memory();
		let seed = SeedConfig::parse(SEED).unwrap();

		seed.apply(&stores);
		assert_eq!(stores.users.get("users:default"), Some(json!("alice")));
		assert_eq!(stores.users.get("users:index"), Some(json!(["vendor", "alice"])));
		assert_eq!(stores.settings.get("eden:locale"), Some(json!("en")));

		// user edits survive a second application of the same version
		stores.settings.set("eden:locale", json!("de"));
		seed.apply(&stores);
		assert_eq!(stores.settings.get("eden:locale"), Some(json!("de")));
	}

	#[test]
	fn newer_version_reapplies() {
		let stores = Stores::in_memory();
		let seed = SeedConfig::parse(SEED).unwrap();
		seed.apply(&stores);
		stores.settings.set("eden:locale", json!("de"));

		let mut newer = seed.clone();
		newer.settings.as_mut().unwrap().version = 2;
		newer.apply(&stores);
		assert_eq!(stores.settings.get("eden:locale"), Some(json!("en")));
	}
}
