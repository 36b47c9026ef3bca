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

use eden_runtime::{Runtime, ViewId};
use eden_utils::Rect;
use serde::Deserialize;
use serde_json::json;

use super::parse_args;
use crate::{
	router::{CommandRegistration, CommandRouter, InvokeContext},
	view::{ViewManager, ViewMode}
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewIdArgs {
	view_id: Option<ViewId>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleModeArgs {
	view_id: Option<ViewId>,
	mode: Option<ViewMode>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBoundsArgs {
	view_id: Option<ViewId>,
	bounds: Rect
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetZoomArgs {
	factor: f64
}

/// The caller's own view unless an explicit view id is given.
fn target_view(context: &InvokeContext, explicit: Option<ViewId>) -> crate::Result<ViewId> {
	explicit
		.or(context.caller.view_id)
		.ok_or_else(|| crate::Error::Command(anyhow::anyhow!("no view id given and the caller has no view")))
}

pub(crate) fn register<R: Runtime>(router: &CommandRouter, views: &Arc<ViewManager<R>>) {
	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/focus", "focus_view", move |context| {
			let manager = manager.clone();
			async move {
				let args: ViewIdArgs = parse_args(context.payload.clone())?;
				manager.focus_view(target_view(&context, args.view_id)?)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/show", "show_view", move |context| {
			let manager = manager.clone();
			async move {
				let args: ViewIdArgs = parse_args(context.payload.clone())?;
				manager.show_view(target_view(&context, args.view_id)?)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/hide", "hide_view", move |context| {
			let manager = manager.clone();
			async move {
				let args: ViewIdArgs = parse_args(context.payload.clone())?;
				manager.hide_view(target_view(&context, args.view_id)?)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/toggle-mode", "toggle_mode", move |context| {
			let manager = manager.clone();
			async move {
				let args: ToggleModeArgs = parse_args(context.payload.clone())?;
				let mode = manager.toggle_mode(target_view(&context, args.view_id)?, args.mode)?;
				Ok(json!({ "mode": mode }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/set-bounds", "update_bounds", move |context| {
			let manager = manager.clone();
			async move {
				let args: SetBoundsArgs = parse_args(context.payload.clone())?;
				manager.update_bounds(target_view(&context, args.view_id)?, args.bounds)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/begin-drag", "begin_drag", move |context| {
			let manager = manager.clone();
			async move {
				let args: ViewIdArgs = parse_args(context.payload.clone())?;
				manager.begin_drag(target_view(&context, args.view_id)?)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/begin-resize", "begin_resize", move |context| {
			let manager = manager.clone();
			async move {
				let args: ViewIdArgs = parse_args(context.payload.clone())?;
				manager.begin_resize(target_view(&context, args.view_id)?)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/end-drag", "end_gesture", move |_context| {
			let manager = manager.clone();
			async move {
				manager.end_gesture();
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/list", "list_views", move |_context| {
			let manager = manager.clone();
			async move { Ok(serde_json::to_value(manager.list_views())?) }
		})
		.require_permission("view/manage")
	);

	let manager = views.clone();
	router.register(
		CommandRegistration::new("view/set-zoom", "set_zoom", move |context| {
			let manager = manager.clone();
			async move {
				let args: SetZoomArgs = parse_args(context.payload)?;
				manager.set_zoom(args.factor);
				Ok(json!({ "factor": manager.zoom() }))
			}
		})
		.require_grant("settings/appearance")
	);

	let manager = views.clone();
	router.register(CommandRegistration::new("view/get-zoom", "zoom", move |_context| {
		let manager = manager.clone();
		async move { Ok(json!({ "factor": manager.zoom() })) }
	}));
}
