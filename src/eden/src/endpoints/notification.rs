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
use uuid::Uuid;

use super::parse_args;
use crate::{
	event::{subjects, EventBus},
	router::{CommandRegistration, CommandRouter}
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddArgs {
	title: String,
	#[serde(default)]
	body: Option<String>,
	#[serde(default)]
	icon: Option<String>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DismissArgs {
	id: String
}

pub(crate) fn register(router: &CommandRouter, events: &Arc<EventBus>) {
	let bus = events.clone();
	router.register(
		CommandRegistration::new("notification/add", "add", move |context| {
			let bus = bus.clone();
			async move {
				let args: AddArgs = parse_args(context.payload.clone())?;
				let id = Uuid::new_v4().to_string();
				bus.emit(
					subjects::NOTIFICATION_ADDED,
					json!({
						"id": id,
						"title": args.title,
						"body": args.body,
						"icon": args.icon,
						"appId": context.caller.app_id
					})
				);
				Ok(json!({ "id": id }))
			}
		})
		.require_permission("notification/send")
	);

	let bus = events.clone();
	router.register(
		CommandRegistration::new("notification/dismiss", "dismiss", move |context| {
			let bus = bus.clone();
			async move {
				let args: DismissArgs = parse_args(context.payload)?;
				bus.emit("notification/dismissed", json!({ "id": args.id }));
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("notification/send")
	);
}
