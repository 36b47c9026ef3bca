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
	event::EventBus,
	router::{CommandRegistration, CommandRouter, InvokeContext}
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectArgs {
	subject: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmitArgs {
	subject: String,
	#[serde(default)]
	payload: JsonValue
}

/// Routes a subscription to the sink matching the caller's process kind:
/// views subscribe their view, workers their app, the foundation the
/// host-shell channel.
fn subscribe_for_caller(events: &EventBus, context: &InvokeContext, subject: &str) -> crate::Result<()> {
	if let Some(view_id) = context.caller.view_id {
		return events.subscribe_view(view_id, subject);
	}
	if context.caller.is_foundation {
		events.subscribe_foundation(subject);
		return Ok(());
	}
	events.subscribe_worker(&caller_app(context)?, subject)
}

fn unsubscribe_for_caller(events: &EventBus, context: &InvokeContext, subject: &str) -> crate::Result<()> {
	if let Some(view_id) = context.caller.view_id {
		events.unsubscribe_view(view_id, subject);
		return Ok(());
	}
	if context.caller.is_foundation {
		events.unsubscribe_foundation(subject);
		return Ok(());
	}
	events.unsubscribe_worker(&caller_app(context)?, subject);
	Ok(())
}

pub(crate) fn register(router: &CommandRouter, events: &Arc<EventBus>) {
	let bus = events.clone();
	router.register(CommandRegistration::new("event/subscribe", "subscribe", move |context| {
		let bus = bus.clone();
		async move {
			let args: SubjectArgs = parse_args(context.payload.clone())?;
			subscribe_for_caller(&bus, &context, &args.subject)?;
			Ok(json!({ "success": true }))
		}
	}));

	let bus = events.clone();
	router.register(CommandRegistration::new("event/unsubscribe", "unsubscribe", move |context| {
		let bus = bus.clone();
		async move {
			let args: SubjectArgs = parse_args(context.payload.clone())?;
			unsubscribe_for_caller(&bus, &context, &args.subject)?;
			Ok(json!({ "success": true }))
		}
	}));

	let bus = events.clone();
	router.register(
		CommandRegistration::new("event/emit", "emit", move |context| {
			let bus = bus.clone();
			async move {
				let args: EmitArgs = parse_args(context.payload)?;
				bus.emit(&args.subject, args.payload);
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("event/emit")
	);
}
