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

use std::{path::PathBuf, sync::Arc};

use eden_runtime::Runtime;
use eden_utils::manifest::Manifest;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::parse_args;
use crate::{
	package::{InstallOptions, PackageRegistry},
	process::ProcessManager,
	router::{CommandRegistration, CommandRouter},
	user::UserManager
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListArgs {
	#[serde(default)]
	show_hidden: bool,
	#[serde(default)]
	show_restricted: bool,
	#[serde(default)]
	locale: Option<String>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppIdArgs {
	app_id: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallArgs {
	manifest: JsonValue,
	install_path: PathBuf,
	#[serde(default)]
	prebuilt: bool,
	#[serde(default)]
	core: bool
}

pub(crate) fn register<R: Runtime>(
	router: &CommandRouter,
	packages: &Arc<PackageRegistry>,
	users: &Arc<UserManager>,
	processes: &Arc<ProcessManager<R>>,
	locale: Arc<std::sync::Mutex<String>>
) {
	let registry = packages.clone();
	let user_manager = users.clone();
	let shell_locale = locale;
	router.register(CommandRegistration::new("package/list", "list", move |context| {
		let registry = registry.clone();
		let user_manager = user_manager.clone();
		let shell_locale = shell_locale.clone();
		async move {
			let args: ListArgs = parse_args(context.payload)?;
			let locale = args.locale.unwrap_or_else(|| shell_locale.lock().unwrap().clone());
			Ok(serde_json::to_value(registry.list(&user_manager, &locale, args.show_hidden, args.show_restricted))?)
		}
	}));

	let registry = packages.clone();
	router.register(CommandRegistration::new("package/get", "get", move |context| {
		let registry = registry.clone();
		async move {
			let args: AppIdArgs = parse_args(context.payload)?;
			match registry.get(&args.app_id) {
				Some(record) => Ok(json!({
					"manifest": &*record.manifest,
					"installPath": record.install_path,
					"isPrebuilt": record.is_prebuilt,
					"isCore": record.is_core,
					"resolvedGrants": record.resolved_grants
				})),
				None => Ok(JsonValue::Null)
			}
		}
	}));

	let registry = packages.clone();
	router.register(
		CommandRegistration::new("package/install", "install", move |context| {
			let registry = registry.clone();
			async move {
				let args: InstallArgs = parse_args(context.payload)?;
				let manifest = Manifest::from_value(args.manifest)?;
				let record = registry.install(manifest, args.install_path, InstallOptions {
					prebuilt: args.prebuilt,
					core: args.core
				})?;
				Ok(json!({ "appId": record.manifest.id }))
			}
		})
		.require_grant("packages/manage")
	);

	let registry = packages.clone();
	let process_manager = processes.clone();
	router.register(
		CommandRegistration::new("package/uninstall", "uninstall", move |context| {
			let registry = registry.clone();
			let process_manager = process_manager.clone();
			async move {
				let args: AppIdArgs = parse_args(context.payload)?;
				// a running instance goes down before the record does
				if process_manager.is_running(&args.app_id) {
					process_manager.stop(&args.app_id).await?;
				}
				registry.uninstall(&args.app_id)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_grant("packages/manage")
	);
}
