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

//! The application manifest: the immutable descriptor of an installed
//! application.
//!
//! A manifest is shipped inside the application package as a JSON document.
//! The package registry parses and validates it once at install time; every
//! other subsystem receives the parsed [`Manifest`] by reference.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{
	geometry::{Position, Size},
	pattern
};

/// Represents all the errors that can happen while reading a manifest.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
	/// The manifest document is not valid JSON.
	#[error("unable to parse manifest: {0}")]
	Parse(#[from] serde_json::Error),
	/// A generic IO error with context of what caused it.
	#[error("unable to read manifest at {path}: {error}")]
	Io {
		/// The path that could not be read.
		path: std::path::PathBuf,
		/// The underlying IO error.
		error: std::io::Error
	},
	/// A manifest field failed validation.
	#[error("manifest field `{field}` is invalid: {reason}")]
	InvalidField {
		/// The offending field.
		field: &'static str,
		/// Why the field was rejected.
		reason: String
	},
	/// The manifest declares neither a frontend nor a worker entry.
	#[error("manifest declares neither a frontend nor a worker entry")]
	NoEntry
}

/// An application display name, either a plain string or a mapping from
/// locale to string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayName {
	/// A single name used for every locale.
	Plain(String),
	/// Locale-specific names, keyed by locale identifier.
	Localized(BTreeMap<String, String>)
}

impl DisplayName {
	/// Resolves the display name for the given locale, falling back to `en`
	/// and then to any available entry.
	pub fn resolve(&self, locale: &str) -> &str {
		match self {
			Self::Plain(name) => name,
			Self::Localized(names) => names
				.get(locale)
				.or_else(|| names.get("en"))
				.or_else(|| names.values().next())
				.map(String::as_str)
				.unwrap_or_default()
		}
	}
}

/// Where a frontend entry is loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontendSource {
	/// A remote URL loaded over the network.
	Remote(Url),
	/// A path into the installed package.
	Local(String)
}

/// The frontend (view) entry of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendEntry {
	/// The entry source, either a package-relative path or a remote URL.
	pub entry: FrontendSource,
	/// Whether other applications may embed this frontend.
	#[serde(default)]
	pub allow_embedding: bool
}

/// The background worker entry of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerEntry {
	/// Package-relative path to the worker entry point.
	pub entry: String
}

/// The layout modes a view is allowed to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
	/// The view only floats.
	Floating,
	/// The view only participates in the tile layout.
	Tiled,
	/// The view may switch between floating and tiled.
	Both
}

impl Default for WindowMode {
	fn default() -> Self {
		Self::Both
	}
}

/// How the host-wide zoom factor applies to a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
	/// The view follows the host-wide zoom factor.
	Auto,
	/// The view manages its own scale; host zoom changes are not applied.
	Manual
}

impl Default for ScalingMode {
	fn default() -> Self {
		Self::Auto
	}
}

/// Per-application window policy, derived from the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowConfig {
	/// Allowed layout modes.
	pub mode: WindowMode,
	/// Initial size of a floating view.
	pub default_size: Size,
	/// Minimum size the view may be resized to.
	pub min_size: Option<Size>,
	/// Maximum size the view may be resized to.
	pub max_size: Option<Size>,
	/// Initial position; centred in the workspace when absent.
	pub default_position: Option<Position>,
	/// Whether the user may drag the view.
	pub movable: bool,
	/// Whether the user may resize the view.
	pub resizable: bool,
	/// How the host zoom factor applies.
	pub scaling: ScalingMode,
	/// Whether the shell API bridge is injected into the view.
	pub inject_api: bool,
	/// Whether the shell theme variables are injected into the view.
	pub inject_theme: bool
}

impl Default for WindowConfig {
	fn default() -> Self {
		Self {
			mode: WindowMode::default(),
			default_size: Size::default(),
			min_size: None,
			max_size: None,
			default_position: None,
			movable: true,
			resizable: true,
			scaling: ScalingMode::default(),
			inject_api: true,
			inject_theme: true
		}
	}
}

/// A grant declaration in the manifest: either a preset reference or an
/// app-scoped grant carrying its own permission list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantDecl {
	/// Reference into the built-in preset table.
	Preset(String),
	/// An app-scoped grant.
	Scoped {
		/// Grant identifier, unique within the application.
		id: String,
		/// The permissions this grant unlocks.
		#[serde(default)]
		permissions: Vec<String>,
		/// Human-readable description shown in permission prompts.
		#[serde(default)]
		description: Option<String>
	}
}

/// A grant after preset expansion. Empty grants are filtered during
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGrant {
	/// The grant identifier.
	pub id: String,
	/// The expanded permission patterns.
	pub permissions: Vec<String>
}

/// An immutable descriptor for an installed application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
	/// Unique dotted identifier, e.g. `io.pyke.files`.
	pub id: String,
	/// Display name, plain or per-locale.
	pub name: DisplayName,
	/// Optional package-relative icon path.
	#[serde(default)]
	pub icon: Option<String>,
	/// Application version string.
	pub version: String,
	/// Hidden applications are omitted from default listings.
	#[serde(default)]
	pub hidden: bool,
	/// Overlay applications float above every normal view.
	#[serde(default)]
	pub overlay: bool,
	/// The view entry, if the application has one.
	#[serde(default)]
	pub frontend: Option<FrontendEntry>,
	/// The background worker entry, if the application has one.
	#[serde(default)]
	pub worker: Option<WorkerEntry>,
	/// Window policy for the application's view.
	#[serde(default)]
	pub window: WindowConfig,
	/// Permissions the application declares for itself.
	#[serde(default)]
	pub permissions: Vec<String>,
	/// Grants the application declares.
	#[serde(default)]
	pub grants: Vec<GrantDecl>
}

impl Manifest {
	/// Parses and validates a manifest from a JSON document.
	pub fn parse(json: &str) -> Result<Self, ManifestError> {
		let manifest: Self = serde_json::from_str(json)?;
		manifest.validate()?;
		Ok(manifest)
	}

	/// Parses and validates a manifest from an already-deserialized JSON
	/// value.
	pub fn from_value(value: serde_json::Value) -> Result<Self, ManifestError> {
		let manifest: Self = serde_json::from_value(value)?;
		manifest.validate()?;
		Ok(manifest)
	}

	/// Reads, parses and validates a manifest file.
	pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
		let path = path.as_ref();
		let contents = std::fs::read_to_string(path).map_err(|error| ManifestError::Io { path: path.to_path_buf(), error })?;
		Self::parse(&contents)
	}

	/// Validates the manifest fields.
	pub fn validate(&self) -> Result<(), ManifestError> {
		if self.id.is_empty() || !self.id.split('.').all(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')) {
			return Err(ManifestError::InvalidField {
				field: "id",
				reason: format!("`{}` is not a dotted identifier", self.id)
			});
		}
		if self.version.is_empty() {
			return Err(ManifestError::InvalidField {
				field: "version",
				reason: "version must not be empty".into()
			});
		}
		if self.frontend.is_none() && self.worker.is_none() {
			return Err(ManifestError::NoEntry);
		}
		if let Some(FrontendEntry { entry: FrontendSource::Local(path), .. }) = &self.frontend {
			if path.is_empty() {
				return Err(ManifestError::InvalidField {
					field: "frontend.entry",
					reason: "local entry path must not be empty".into()
				});
			}
		}
		if let Some(worker) = &self.worker {
			if worker.entry.is_empty() {
				return Err(ManifestError::InvalidField {
					field: "worker.entry",
					reason: "worker entry path must not be empty".into()
				});
			}
		}
		for permission in &self.permissions {
			if !pattern::is_valid(permission) {
				return Err(ManifestError::InvalidField {
					field: "permissions",
					reason: format!("`{permission}` is not a valid capability")
				});
			}
		}
		let window = &self.window;
		for (field, size) in [("window.defaultSize", Some(window.default_size)), ("window.minSize", window.min_size), ("window.maxSize", window.max_size)] {
			if let Some(size) = size {
				if size.width <= 0.0 || size.height <= 0.0 {
					return Err(ManifestError::InvalidField {
						field,
						reason: format!("{}x{} is not a valid size", size.width, size.height)
					});
				}
			}
		}
		if let Some(min) = window.min_size {
			if min.width > window.default_size.width || min.height > window.default_size.height {
				return Err(ManifestError::InvalidField {
					field: "window.minSize",
					reason: "minimum size exceeds the default size".into()
				});
			}
		}
		if let Some(max) = window.max_size {
			if max.width < window.default_size.width || max.height < window.default_size.height {
				return Err(ManifestError::InvalidField {
					field: "window.maxSize",
					reason: "maximum size is below the default size".into()
				});
			}
		}
		Ok(())
	}

	/// Whether the application is hidden from default listings. Overlay
	/// applications are implicitly hidden.
	pub fn is_hidden(&self) -> bool {
		self.hidden || self.overlay
	}

	/// Resolves the display name for the given locale.
	pub fn display_name(&self, locale: &str) -> &str {
		self.name.resolve(locale)
	}
}

#[cfg(test)]
mod tests {
	use super::{DisplayName, FrontendSource, GrantDecl, Manifest, ManifestError, ScalingMode, WindowMode};

	fn parse(json: &str) -> Result<Manifest, ManifestError> {
		Manifest::parse(json)
	}

	#[test]
	fn parses_full_manifest() {
		let manifest = parse(
			r#"{
				"id": "io.pyke.files",
				"name": { "en": "Files", "de": "Dateien" },
				"icon": "assets/icon.svg",
				"version": "1.2.0",
				"frontend": { "entry": "index.html", "allowEmbedding": true },
				"worker": { "entry": "worker.js" },
				"window": {
					"mode": "both",
					"defaultSize": { "width": 1024, "height": 768 },
					"minSize": { "width": 400, "height": 300 },
					"scaling": "manual"
				},
				"permissions": ["fs/read", "fs/write"],
				"grants": [
					"fs-full",
					{ "id": "trash", "permissions": ["fs/trash"], "description": "Move files to the trash" }
				]
			}"#
		)
		.unwrap();

		assert_eq!(manifest.id, "io.pyke.files");
		assert_eq!(manifest.display_name("de"), "Dateien");
		assert_eq!(manifest.display_name("fr"), "Files");
		assert_eq!(manifest.window.mode, WindowMode::Both);
		assert_eq!(manifest.window.scaling, ScalingMode::Manual);
		assert!(matches!(manifest.grants[0], GrantDecl::Preset(ref id) if id == "fs-full"));
		assert!(matches!(manifest.grants[1], GrantDecl::Scoped { ref id, .. } if id == "trash"));
	}

	#[test]
	fn parses_minimal_worker_only_manifest() {
		let manifest = parse(r#"{ "id": "io.pyke.clock", "name": "Clock", "version": "0.1.0", "worker": { "entry": "main.js" } }"#).unwrap();
		assert!(manifest.frontend.is_none());
		assert_eq!(manifest.name, DisplayName::Plain("Clock".into()));
		assert_eq!(manifest.window.mode, WindowMode::Both);
		assert!(manifest.window.movable);
	}

	#[test]
	fn remote_frontend_entry() {
		let manifest = parse(
			r#"{ "id": "io.pyke.remote", "name": "Remote", "version": "0.1.0", "frontend": { "entry": "https://apps.pyke.io/remote/" } }"#
		)
		.unwrap();
		assert!(matches!(manifest.frontend.unwrap().entry, FrontendSource::Remote(_)));

		let manifest = parse(r#"{ "id": "io.pyke.local", "name": "Local", "version": "0.1.0", "frontend": { "entry": "index.html" } }"#).unwrap();
		assert!(matches!(manifest.frontend.unwrap().entry, FrontendSource::Local(_)));
	}

	#[test]
	fn rejects_entryless_manifest() {
		let err = parse(r#"{ "id": "io.pyke.empty", "name": "Empty", "version": "0.1.0" }"#).unwrap_err();
		assert!(matches!(err, ManifestError::NoEntry));
	}

	#[test]
	fn rejects_malformed_id() {
		for id in ["", "no spaces.app", "double..dot", ".leading"] {
			let err = parse(&format!(r#"{{ "id": "{id}", "name": "X", "version": "0.1.0", "worker": {{ "entry": "w.js" }} }}"#)).unwrap_err();
			assert!(matches!(err, ManifestError::InvalidField { field: "id", .. }), "id `{id}` should be rejected");
		}
	}

	#[test]
	fn rejects_invalid_permission() {
		let err = parse(r#"{ "id": "io.pyke.x", "name": "X", "version": "0.1.0", "worker": { "entry": "w.js" }, "permissions": ["notacapability"] }"#).unwrap_err();
		assert!(matches!(err, ManifestError::InvalidField { field: "permissions", .. }));
	}

	#[test]
	fn rejects_contradictory_sizes() {
		let err = parse(
			r#"{
				"id": "io.pyke.x", "name": "X", "version": "0.1.0", "worker": { "entry": "w.js" },
				"window": { "defaultSize": { "width": 300, "height": 300 }, "minSize": { "width": 400, "height": 300 } }
			}"#
		)
		.unwrap_err();
		assert!(matches!(err, ManifestError::InvalidField { field: "window.minSize", .. }));
	}

	#[test]
	fn overlay_implies_hidden() {
		let manifest = parse(r#"{ "id": "io.pyke.dock", "name": "Dock", "version": "0.1.0", "overlay": true, "frontend": { "entry": "index.html" } }"#).unwrap();
		assert!(manifest.overlay);
		assert!(manifest.is_hidden());
	}
}
