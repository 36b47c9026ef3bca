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

//! The permission and grant engine.
//!
//! Every installed application registers its base permissions and the
//! permission sets of its resolved grants here. The command router and the
//! subscription bus consult this registry on every gated operation.

use std::{
	collections::HashMap,
	sync::Mutex
};

use eden_utils::pattern;

#[derive(Debug, Default, Clone)]
struct AppPermissions {
	base: Vec<String>,
	grants: HashMap<String, Vec<String>>
}

#[derive(Default)]
struct RegistryInner {
	apps: HashMap<String, AppPermissions>,
	/// subject → permission required to subscribe to it
	event_permissions: HashMap<String, String>
}

/// Per-application capability registry.
#[derive(Default)]
pub struct PermissionRegistry {
	inner: Mutex<RegistryInner>
}

impl PermissionRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an application's base permissions and grant permission
	/// sets. Registering with empty bases and grants unregisters the app;
	/// both directions are idempotent.
	pub fn register(&self, app_id: &str, base: Vec<String>, grants: HashMap<String, Vec<String>>) {
		let mut inner = self.inner.lock().unwrap();
		if base.is_empty() && grants.is_empty() {
			inner.apps.remove(app_id);
			return;
		}
		inner.apps.insert(app_id.to_string(), AppPermissions { base, grants });
	}

	/// Removes an application from the registry.
	pub fn unregister(&self, app_id: &str) {
		self.inner.lock().unwrap().apps.remove(app_id);
	}

	/// Whether any base pattern or any grant's pattern of the app covers
	/// the permission.
	pub fn has_permission(&self, app_id: &str, permission: &str) -> bool {
		let inner = self.inner.lock().unwrap();
		match inner.apps.get(app_id) {
			Some(app) => {
				pattern::any_matches(app.base.iter().map(String::as_str), permission)
					|| app.grants.values().any(|patterns| pattern::any_matches(patterns.iter().map(String::as_str), permission))
			}
			None => false
		}
	}

	/// Whether a base pattern of the app covers the permission, ignoring
	/// grants.
	pub fn is_base_permission(&self, app_id: &str, permission: &str) -> bool {
		let inner = self.inner.lock().unwrap();
		inner
			.apps
			.get(app_id)
			.map(|app| pattern::any_matches(app.base.iter().map(String::as_str), permission))
			.unwrap_or(false)
	}

	/// The grant ids whose patterns cover the permission, or an empty list
	/// when the permission is already covered by a base pattern.
	pub fn required_grant_ids(&self, app_id: &str, permission: &str) -> Vec<String> {
		let inner = self.inner.lock().unwrap();
		let app = match inner.apps.get(app_id) {
			Some(app) => app,
			None => return Vec::new()
		};
		if pattern::any_matches(app.base.iter().map(String::as_str), permission) {
			return Vec::new();
		}
		let mut grant_ids: Vec<String> = app
			.grants
			.iter()
			.filter(|(_, patterns)| pattern::any_matches(patterns.iter().map(String::as_str), permission))
			.map(|(grant_id, _)| grant_id.clone())
			.collect();
		grant_ids.sort();
		grant_ids
	}

	/// Declares that subscribing to an event subject requires a permission.
	pub fn set_event_permission(&self, subject: &str, permission: &str) {
		self.inner.lock().unwrap().event_permissions.insert(subject.to_string(), permission.to_string());
	}

	/// The permission required to subscribe to a subject, if any.
	pub fn event_permission(&self, subject: &str) -> Option<String> {
		self.inner.lock().unwrap().event_permissions.get(subject).cloned()
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::PermissionRegistry;

	fn grants(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
		entries
			.iter()
			.map(|(grant_id, patterns)| (grant_id.to_string(), patterns.iter().map(|pattern| pattern.to_string()).collect()))
			.collect()
	}

	#[test]
	fn base_patterns_gate_permissions() {
		let registry = PermissionRegistry::new();
		registry.register("io.pyke.files", vec!["fs/*".into(), "view/manage".into()], HashMap::new());

		assert!(registry.has_permission("io.pyke.files", "fs/read"));
		assert!(registry.has_permission("io.pyke.files", "view/manage"));
		assert!(!registry.has_permission("io.pyke.files", "view/create"));
		assert!(!registry.has_permission("io.pyke.other", "fs/read"));

		assert!(registry.is_base_permission("io.pyke.files", "fs/read"));
		assert!(!registry.is_base_permission("io.pyke.files", "process/manage"));
	}

	#[test]
	fn grant_patterns_count_for_has_permission_only() {
		let registry = PermissionRegistry::new();
		registry.register("io.pyke.editor", vec!["view/manage".into()], grants(&[("fs-access", &["fs/*"]), ("trash", &["fs/trash"])]));

		assert!(registry.has_permission("io.pyke.editor", "fs/read"));
		assert!(!registry.is_base_permission("io.pyke.editor", "fs/read"));
		assert_eq!(registry.required_grant_ids("io.pyke.editor", "fs/read"), vec!["fs-access".to_string()]);
		assert_eq!(registry.required_grant_ids("io.pyke.editor", "fs/trash"), vec!["fs-access".to_string(), "trash".to_string()]);
		// base permissions need no grant
		assert!(registry.required_grant_ids("io.pyke.editor", "view/manage").is_empty());
	}

	#[test]
	fn empty_registration_unregisters() {
		let registry = PermissionRegistry::new();
		registry.register("io.pyke.tmp", vec!["fs/read".into()], HashMap::new());
		assert!(registry.has_permission("io.pyke.tmp", "fs/read"));

		registry.register("io.pyke.tmp", Vec::new(), HashMap::new());
		assert!(!registry.has_permission("io.pyke.tmp", "fs/read"));
		// idempotent
		registry.register("io.pyke.tmp", Vec::new(), HashMap::new());
		registry.unregister("io.pyke.tmp");
	}

	#[test]
	fn event_permission_table() {
		let registry = PermissionRegistry::new();
		assert_eq!(registry.event_permission("clock/tick"), None);
		registry.set_event_permission("process/launched", "process/observe");
		assert_eq!(registry.event_permission("process/launched"), Some("process/observe".to_string()));
	}
}
