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

use std::sync::Arc;

use eden_runtime::Runtime;
use eden_utils::Rect;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::parse_args;
use crate::{
	process::ProcessManager,
	router::{CommandRegistration, CommandRouter}
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchArgs {
	app_id: String,
	bounds: Option<Rect>,
	#[serde(default)]
	args: Option<JsonValue>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppIdArgs {
	app_id: String
}

pub(crate) fn register<R: Runtime>(router: &CommandRouter, processes: &Arc<ProcessManager<R>>) {
	let manager = processes.clone();
	router.register(
		CommandRegistration::new("process/launch", "launch", move |context| {
			let manager = manager.clone();
			async move {
				let args: LaunchArgs = parse_args(context.payload)?;
				let instance = manager.launch(&args.app_id, args.bounds, args.args).await?;
				Ok(serde_json::to_value(instance)?)
			}
		})
		.require_permission("process/manage")
	);

	let manager = processes.clone();
	router.register(
		CommandRegistration::new("process/stop", "stop", move |context| {
			let manager = manager.clone();
			async move {
				let args: AppIdArgs = parse_args(context.payload)?;
				manager.stop(&args.app_id).await?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("process/manage")
	);

	let manager = processes.clone();
	router.register(
		CommandRegistration::new("process/running", "running_apps", move |_context| {
			let manager = manager.clone();
			async move { Ok(serde_json::to_value(manager.running_apps())?) }
		})
		.require_permission("process/list")
	);

	let manager = processes.clone();
	router.register(
		CommandRegistration::new("process/is-running", "is_running", move |context| {
			let manager = manager.clone();
			async move {
				let args: AppIdArgs = parse_args(context.payload)?;
				Ok(json!(manager.is_running(&args.app_id)))
			}
		})
		.require_permission("process/list")
	);
}
