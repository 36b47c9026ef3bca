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

//! Users and the login session.
//!
//! Profiles persist in the user store under `user:<username>` with an index
//! at `users:index` and the startup default at `users:default`. Exactly one
//! user is current at any instant; vendors bypass every grant check.

use std::sync::{Arc, Mutex};

use eden_utils::pattern;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
	error::{Error, Result},
	event::{subjects, EventBus},
	store::Store,
	util::now_millis
};

/// A user's role. Vendor seats are seed-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
	/// Bypasses all grant checks; cannot be created or demoted at runtime.
	Vendor,
	/// A regular user gated by grants.
	Standard
}

impl Default for UserRole {
	fn default() -> Self {
		Self::Standard
	}
}

/// Why the current user changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionChangeReason {
	/// A user logged in.
	Login,
	/// The current user logged out.
	Logout,
	/// The shell switched users on its own, e.g. at startup.
	System
}

/// A user profile, without credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
	/// Unique username.
	pub username: String,
	/// Display name shown in the shell.
	pub display_name: String,
	/// The user's role.
	pub role: UserRole,
	/// The grants the user holds, in declaration order.
	pub grants: Vec<String>,
	/// Creation time, Unix milliseconds.
	pub created_at: u64,
	/// Last update time, Unix milliseconds.
	pub updated_at: u64
}

/// The persisted form of a user: profile plus credential digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredUser {
	#[serde(flatten)]
	pub profile: UserProfile,
	pub password_hash: String,
	pub salt: String
}

/// Generates a fresh random salt.
pub(crate) fn generate_salt() -> String {
	let mut bytes = [0u8; 16];
	rand::thread_rng().fill_bytes(&mut bytes);
	bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Computes the salted digest stored for a password.
pub(crate) fn hash_password(password: &str, salt: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(salt.as_bytes());
	hasher.update(b":");
	hasher.update(password.as_bytes());
	hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Authenticates users and evaluates the current user's grants.
pub struct UserManager {
	store: Arc<dyn Store>,
	events: Arc<EventBus>,
	current: Mutex<Option<UserProfile>>
}

impl UserManager {
	/// Creates a user manager over the given store.
	pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>) -> Self {
		Self {
			store,
			events,
			current: Mutex::new(None)
		}
	}

	fn load(&self, username: &str) -> Option<StoredUser> {
		let value = self.store.get(&format!("user:{username}"))?;
		serde_json::from_value(value).ok()
	}

	fn persist(&self, stored: &StoredUser) {
		self.store
			.set(&format!("user:{}", stored.profile.username), serde_json::to_value(stored).expect("user records always serialize"));
	}

	fn index(&self) -> Vec<String> {
		self.store
			.get("users:index")
			.and_then(|value| serde_json::from_value(value).ok())
			.unwrap_or_default()
	}

	fn emit_changed(&self, previous: Option<String>, reason: SessionChangeReason) {
		let current = self.current_user();
		self.events.emit(
			subjects::USER_CHANGED,
			json!({
				"currentUser": current,
				"previousUsername": previous,
				"reason": reason
			})
		);
	}

	/// Establishes the configured default user as current at startup.
	pub fn establish_default(&self) {
		let default_user = self.store.get("users:default").and_then(|value| value.as_str().map(str::to_string));
		if let Some(username) = default_user {
			match self.load(&username) {
				Some(stored) => {
					let previous = {
						let mut current = self.current.lock().unwrap();
						current.replace(stored.profile).map(|profile| profile.username)
					};
					self.emit_changed(previous, SessionChangeReason::System);
				}
				None => tracing::warn!("default user `{username}` does not exist")
			}
		}
	}

	/// Verifies the password and switches the current user.
	pub fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
		// unknown users fail the same way as wrong passwords
		let stored = self.load(username).ok_or_else(|| Error::AuthFailed(username.to_string()))?;
		if hash_password(password, &stored.salt) != stored.password_hash {
			return Err(Error::AuthFailed(username.to_string()));
		}
		let profile = stored.profile;
		let previous = {
			let mut current = self.current.lock().unwrap();
			current.replace(profile.clone()).map(|previous| previous.username)
		};
		self.emit_changed(previous, SessionChangeReason::Login);
		Ok(profile)
	}

	/// Clears the current user.
	pub fn logout(&self) {
		let previous = self.current.lock().unwrap().take().map(|profile| profile.username);
		if previous.is_some() {
			self.emit_changed(previous, SessionChangeReason::Logout);
		}
	}

	/// The current user, if any.
	pub fn current_user(&self) -> Option<UserProfile> {
		self.current.lock().unwrap().clone()
	}

	/// Creates a standard user. Vendor seats can only come from the seed.
	pub fn create_user(&self, username: &str, display_name: &str, grants: Vec<String>, password: &str) -> Result<UserProfile> {
		if self.load(username).is_some() {
			return Err(Error::Command(anyhow::anyhow!("user {username} already exists")));
		}
		let salt = generate_salt();
		let stored = StoredUser {
			profile: UserProfile {
				username: username.to_string(),
				display_name: display_name.to_string(),
				role: UserRole::Standard,
				grants,
				created_at: now_millis(),
				updated_at: now_millis()
			},
			password_hash: hash_password(password, &salt),
			salt
		};
		self.persist(&stored);
		let mut index = self.index();
		if !index.iter().any(|entry| entry == username) {
			index.push(username.to_string());
			self.store.set("users:index", json!(index));
		}
		Ok(stored.profile)
	}

	/// Updates a user's display name, grants, or role. Role transitions
	/// into or out of vendor are rejected.
	pub fn update_user(&self, username: &str, display_name: Option<String>, grants: Option<Vec<String>>, role: Option<UserRole>) -> Result<UserProfile> {
		let mut stored = self.load(username).ok_or_else(|| Error::UnknownUser(username.to_string()))?;
		if let Some(role) = role {
			if role != stored.profile.role {
				return Err(Error::IllegalRoleTransition(username.to_string()));
			}
		}
		if let Some(display_name) = display_name {
			stored.profile.display_name = display_name;
		}
		if let Some(grants) = grants {
			stored.profile.grants = grants;
		}
		stored.profile.updated_at = now_millis();
		self.persist(&stored);

		let refreshed = {
			let mut current = self.current.lock().unwrap();
			match current.as_mut() {
				Some(profile) if profile.username == username => {
					*profile = stored.profile.clone();
					true
				}
				_ => false
			}
		};
		if refreshed {
			self.emit_changed(Some(username.to_string()), SessionChangeReason::System);
		}
		Ok(stored.profile)
	}

	/// Changes a user's password after verifying the current one.
	pub fn change_password(&self, username: &str, current_password: &str, new_password: &str) -> Result<()> {
		let stored = self.load(username).ok_or_else(|| Error::UnknownUser(username.to_string()))?;
		if hash_password(current_password, &stored.salt) != stored.password_hash {
			return Err(Error::AuthFailed(username.to_string()));
		}
		self.set_password(username, new_password)
	}

	/// Overwrites a user's password without verification; gated by the
	/// `users/manage` grant at the command layer.
	pub fn set_password(&self, username: &str, new_password: &str) -> Result<()> {
		let mut stored = self.load(username).ok_or_else(|| Error::UnknownUser(username.to_string()))?;
		stored.salt = generate_salt();
		stored.password_hash = hash_password(new_password, &stored.salt);
		stored.profile.updated_at = now_millis();
		self.persist(&stored);
		Ok(())
	}

	/// Deletes a user. Vendors cannot be deleted; deleting the current
	/// user logs them out first.
	pub fn delete_user(&self, username: &str) -> Result<()> {
		let stored = self.load(username).ok_or_else(|| Error::UnknownUser(username.to_string()))?;
		if stored.profile.role == UserRole::Vendor {
			return Err(Error::IllegalRoleTransition(username.to_string()));
		}
		let was_current = self.current_user().map(|profile| profile.username == username).unwrap_or(false);
		if was_current {
			self.logout();
		}
		self.store.delete(&format!("user:{username}"));
		let index: Vec<String> = self.index().into_iter().filter(|entry| entry != username).collect();
		self.store.set("users:index", json!(index));
		Ok(())
	}

	/// Every known user's profile, in index order.
	pub fn list_users(&self) -> Vec<UserProfile> {
		self.index().iter().filter_map(|username| self.load(username)).map(|stored| stored.profile).collect()
	}

	/// Whether the current user holds a grant: vendors always pass; others
	/// pass when their grant set contains the grant, `*`, or a covering
	/// `ns/*` pattern.
	pub fn has_grant(&self, required: &str) -> bool {
		let current = self.current.lock().unwrap();
		match current.as_ref() {
			Some(profile) => profile.role == UserRole::Vendor || pattern::any_matches(profile.grants.iter().map(String::as_str), required),
			None => false
		}
	}

	/// Whether the current user may launch the app.
	pub fn can_launch_app(&self, app_id: &str, is_core: bool) -> bool {
		is_core || self.has_grant(&format!("apps/launch/{app_id}"))
	}

	/// Whether the current user may touch another app's setting.
	pub fn can_access_setting(&self, app_id: &str, key: &str) -> bool {
		self.has_grant(&format!("settings/{app_id}/{key}"))
	}
}
