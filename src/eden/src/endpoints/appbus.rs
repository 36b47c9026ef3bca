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
use serde_json::json;

use super::{caller_app, parse_args};
use crate::{
	appbus::{AppBusHost, ExposeOptions},
	router::{CommandRegistration, CommandRouter}
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExposeArgs {
	name: String,
	#[serde(default)]
	description: Option<String>,
	#[serde(default)]
	allowed_clients: Option<Vec<String>>,
	#[serde(default)]
	is_backend: Option<bool>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnexposeArgs {
	name: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectArgs {
	target_app_id: String,
	service_name: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByAppArgs {
	app_id: String
}

pub(crate) fn register(router: &CommandRouter, appbus: &Arc<AppBusHost>) {
	let host = appbus.clone();
	router.register(
		CommandRegistration::new("appbus/expose", "expose_service", move |context| {
			let host = host.clone();
			async move {
				let args: ExposeArgs = parse_args(context.payload.clone())?;
				let owner = caller_app(&context)?;
				// workers expose backend services unless stated otherwise
				let is_backend = args.is_backend.unwrap_or(context.caller.view_id.is_none());
				host.expose_service(&owner, &args.name, ExposeOptions {
					description: args.description,
					allowed_clients: args.allowed_clients,
					is_backend
				})?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("appbus/expose")
	);

	let host = appbus.clone();
	router.register(
		CommandRegistration::new("appbus/unexpose", "unexpose_service", move |context| {
			let host = host.clone();
			async move {
				let args: UnexposeArgs = parse_args(context.payload.clone())?;
				host.unexpose_service(&caller_app(&context)?, &args.name);
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("appbus/expose")
	);

	let host = appbus.clone();
	router.register(
		CommandRegistration::new("appbus/connect", "connect", move |context| {
			let host = host.clone();
			async move {
				let args: ConnectArgs = parse_args(context.payload.clone())?;
				let connection_id = host.connect(&caller_app(&context)?, &args.target_app_id, &args.service_name)?;
				Ok(json!({ "success": true, "connectionId": connection_id }))
			}
		})
		.require_permission("appbus/connect")
	);

	let host = appbus.clone();
	router.register(CommandRegistration::new("appbus/list-services", "list_services", move |_context| {
		let host = host.clone();
		async move { Ok(serde_json::to_value(host.list_services())?) }
	}));

	let host = appbus.clone();
	router.register(CommandRegistration::new("appbus/list-services-by-app", "list_services_by_app", move |context| {
		let host = host.clone();
		async move {
			let args: ByAppArgs = parse_args(context.payload)?;
			Ok(serde_json::to_value(host.list_services_by_app(&args.app_id))?)
		}
	}));
}
