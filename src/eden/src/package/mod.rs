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

//! The package registry.
//!
//! Owns the runtime records of installed applications for the lifetime of
//! the installation: the parsed manifest, resolved grants, and the core /
//! prebuilt / login-app designations. Installation registers the app's
//! capabilities with the permission engine; uninstallation revokes them.

use std::{
	collections::{HashMap, HashSet},
	path::PathBuf,
	sync::{Arc, Mutex}
};

use eden_utils::manifest::{GrantDecl, Manifest, ResolvedGrant};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::json;

use crate::{
	error::{Error, Result},
	event::{subjects, EventBus},
	scope::PermissionRegistry,
	user::UserManager
};

/// The built-in grant presets a manifest may reference by id.
static GRANT_PRESETS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
	HashMap::from([
		("fs-read", vec!["fs/read", "fs/list"]),
		("fs-full", vec!["fs/*"]),
		("notifications", vec!["notification/send"]),
		("settings", vec!["settings/read", "settings/write"]),
		("process-control", vec!["process/manage"]),
		("appbus", vec!["appbus/*"])
	])
});

/// Runtime form of an installed application.
#[derive(Debug, Clone)]
pub struct AppRecord {
	/// The parsed manifest.
	pub manifest: Arc<Manifest>,
	/// Where the package contents live on disk.
	pub install_path: PathBuf,
	/// Shipped with the shell image rather than installed by a user.
	pub is_prebuilt: bool,
	/// Core apps are launchable by every user.
	pub is_core: bool,
	/// Grants after preset expansion, empty grants filtered.
	pub resolved_grants: Vec<ResolvedGrant>
}

/// One row of a package listing, with the visibility flags resolved for
/// the current user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppListing {
	/// The app id.
	pub id: String,
	/// Display name for the shell locale.
	pub name: String,
	/// Manifest version string.
	pub version: String,
	/// Hidden from default listings (`manifest.hidden` or overlay).
	pub hidden: bool,
	/// The current user cannot launch this app.
	pub restricted: bool,
	/// Whether the app is part of the core set.
	pub is_core: bool
}

/// Expands preset references and filters empty grants.
pub fn resolve_grants(manifest: &Manifest) -> Vec<ResolvedGrant> {
	let mut resolved = Vec::new();
	for grant in &manifest.grants {
		let expanded = match grant {
			GrantDecl::Preset(preset_id) => match GRANT_PRESETS.get(preset_id.as_str()) {
				Some(permissions) => ResolvedGrant {
					id: preset_id.clone(),
					permissions: permissions.iter().map(|permission| permission.to_string()).collect()
				},
				None => {
					tracing::warn!("manifest for {} references unknown grant preset `{preset_id}`", manifest.id);
					continue;
				}
			},
			GrantDecl::Scoped { id, permissions, .. } => ResolvedGrant {
				id: id.clone(),
				permissions: permissions.clone()
			}
		};
		if expanded.permissions.is_empty() {
			continue;
		}
		resolved.push(expanded);
	}
	resolved
}

/// Options for [`PackageRegistry::install`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
	/// Mark the app as shipped with the shell image.
	pub prebuilt: bool,
	/// Mark the app as launchable by every user.
	pub core: bool
}

/// Owns every installed application record.
pub struct PackageRegistry {
	permissions: Arc<PermissionRegistry>,
	events: Arc<EventBus>,
	apps: Mutex<HashMap<String, Arc<AppRecord>>>,
	core_apps: Mutex<HashSet<String>>,
	login_app: Mutex<Option<String>>
}

impl PackageRegistry {
	/// Creates an empty registry.
	pub fn new(permissions: Arc<PermissionRegistry>, events: Arc<EventBus>) -> Self {
		Self {
			permissions,
			events,
			apps: Mutex::new(HashMap::new()),
			core_apps: Mutex::new(HashSet::new()),
			login_app: Mutex::new(None)
		}
	}

	/// Installs an application from its parsed manifest, registering its
	/// permissions and grants. Installing over an existing id upgrades it.
	pub fn install(&self, manifest: Manifest, install_path: PathBuf, options: InstallOptions) -> Result<Arc<AppRecord>> {
		manifest.validate()?;
		let resolved_grants = resolve_grants(&manifest);
		let record = Arc::new(AppRecord {
			manifest: Arc::new(manifest),
			install_path,
			is_prebuilt: options.prebuilt,
			is_core: options.core,
			resolved_grants
		});

		let app_id = record.manifest.id.clone();
		let grants: HashMap<String, Vec<String>> = record.resolved_grants.iter().map(|grant| (grant.id.clone(), grant.permissions.clone())).collect();
		self.permissions.register(&app_id, record.manifest.permissions.clone(), grants);

		if self.apps.lock().unwrap().insert(app_id.clone(), record.clone()).is_some() {
			tracing::debug!("upgraded package {app_id}");
		}
		if options.core {
			self.core_apps.lock().unwrap().insert(app_id.clone());
		}
		self.events.emit(subjects::PACKAGE_INSTALLED, json!({ "appId": app_id }));
		Ok(record)
	}

	/// Removes an application and revokes its capabilities. The caller is
	/// responsible for stopping a running instance first.
	pub fn uninstall(&self, app_id: &str) -> Result<()> {
		let removed = self.apps.lock().unwrap().remove(app_id);
		match removed {
			Some(_) => {
				self.permissions.unregister(app_id);
				self.core_apps.lock().unwrap().remove(app_id);
				self.events.emit(subjects::PACKAGE_UNINSTALLED, json!({ "appId": app_id }));
				Ok(())
			}
			None => Err(Error::UnknownApp(app_id.to_string()))
		}
	}

	/// The record of an installed app.
	pub fn get(&self, app_id: &str) -> Option<Arc<AppRecord>> {
		self.apps.lock().unwrap().get(app_id).cloned()
	}

	/// Whether the app is part of the core set.
	pub fn is_core(&self, app_id: &str) -> bool {
		self.core_apps.lock().unwrap().contains(app_id)
	}

	/// Designates the login app, exempt from launch authorization and
	/// session drains.
	pub fn set_login_app(&self, app_id: &str) {
		*self.login_app.lock().unwrap() = Some(app_id.to_string());
	}

	/// Whether the app is the designated login app.
	pub fn is_login_app(&self, app_id: &str) -> bool {
		self.login_app.lock().unwrap().as_deref() == Some(app_id)
	}

	/// Lists installed apps. Hidden apps (manifest hidden or overlay) are
	/// omitted unless `show_hidden`; apps the current user cannot launch
	/// are omitted unless `show_restricted`. Both flags are always
	/// reported on the rows that remain.
	pub fn list(&self, users: &UserManager, locale: &str, show_hidden: bool, show_restricted: bool) -> Vec<AppListing> {
		let apps: Vec<Arc<AppRecord>> = self.apps.lock().unwrap().values().cloned().collect();
		let mut listings: Vec<AppListing> = apps
			.into_iter()
			.filter_map(|record| {
				let hidden = record.manifest.is_hidden();
				let restricted = !users.can_launch_app(&record.manifest.id, record.is_core);
				if (hidden && !show_hidden) || (restricted && !show_restricted) {
					return None;
				}
				Some(AppListing {
					id: record.manifest.id.clone(),
					name: record.manifest.display_name(locale).to_string(),
					version: record.manifest.version.clone(),
					hidden,
					restricted,
					is_core: record.is_core
				})
			})
			.collect();
		listings.sort_by(|a, b| a.id.cmp(&b.id));
		listings
	}
}
