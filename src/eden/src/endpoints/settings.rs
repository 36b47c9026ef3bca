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

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{caller_app, parse_args};
use crate::{
	router::{CommandRegistration, CommandRouter},
	settings::SettingsManager
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyArgs {
	key: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetArgs {
	key: String,
	value: JsonValue
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuKeyArgs {
	app_id: String,
	key: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuSetArgs {
	app_id: String,
	key: String,
	value: JsonValue
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutostartArgs {
	app_id: String,
	enabled: bool
}

pub(crate) fn register(router: &CommandRouter, settings: &Arc<SettingsManager>) {
	let manager = settings.clone();
	router.register(
		CommandRegistration::new("settings/get", "get", move |context| {
			let manager = manager.clone();
			async move {
				let args: KeyArgs = parse_args(context.payload.clone())?;
				Ok(manager.get(&caller_app(&context)?, &args.key).unwrap_or(JsonValue::Null))
			}
		})
		.require_permission("settings/read")
	);

	let manager = settings.clone();
	router.register(
		CommandRegistration::new("settings/set", "set", move |context| {
			let manager = manager.clone();
			async move {
				let args: SetArgs = parse_args(context.payload.clone())?;
				manager.set(&caller_app(&context)?, &args.key, args.value);
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("settings/write")
	);

	let manager = settings.clone();
	router.register(
		CommandRegistration::new("settings/delete", "delete", move |context| {
			let manager = manager.clone();
			async move {
				let args: KeyArgs = parse_args(context.payload.clone())?;
				manager.delete(&caller_app(&context)?, &args.key);
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("settings/write")
	);

	// superuser verbs take an explicit app id and address that app's
	// namespace; the per-key grant is checked inside the manager
	let manager = settings.clone();
	router.register(
		CommandRegistration::new("settings/get/su", "get_su", move |context| {
			let manager = manager.clone();
			async move {
				let args: SuKeyArgs = parse_args(context.payload)?;
				Ok(manager.get_su(&args.app_id, &args.key)?.unwrap_or(JsonValue::Null))
			}
		})
		.require_permission("settings/manage")
	);

	let manager = settings.clone();
	router.register(
		CommandRegistration::new("settings/set/su", "set_su", move |context| {
			let manager = manager.clone();
			async move {
				let args: SuSetArgs = parse_args(context.payload)?;
				manager.set_su(&args.app_id, &args.key, args.value)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("settings/manage")
	);

	let manager = settings.clone();
	router.register(
		CommandRegistration::new("settings/autostart", "set_autostart", move |context| {
			let manager = manager.clone();
			async move {
				let args: AutostartArgs = parse_args(context.payload)?;
				manager.set_autostart(&args.app_id, args.enabled);
				Ok(json!({ "success": true }))
			}
		})
		.require_grant("settings/autostart")
	);
}
