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

use std::sync::{Arc, Mutex};

use eden_runtime::Runtime;
use serde::Deserialize;
use serde_json::json;

use super::parse_args;
use crate::{
	event::{subjects, EventBus},
	router::{CommandRegistration, CommandRouter},
	view::ViewManager
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetLocaleArgs {
	locale: String
}

pub(crate) fn register<R: Runtime>(
	router: &CommandRouter,
	runtime: &Arc<R>,
	views: &Arc<ViewManager<R>>,
	events: &Arc<EventBus>,
	locale: Arc<Mutex<String>>
) {
	let host = runtime.clone();
	let view_manager = views.clone();
	let shell_locale = locale.clone();
	router.register(CommandRegistration::new("system/info", "info", move |_context| {
		let host = host.clone();
		let view_manager = view_manager.clone();
		let shell_locale = shell_locale.clone();
		async move {
			Ok(json!({
				"version": env!("CARGO_PKG_VERSION"),
				"locale": &*shell_locale.lock().unwrap(),
				"zoom": view_manager.zoom(),
				"workspace": host.workspace()
			}))
		}
	}));

	let shell_locale = locale.clone();
	router.register(CommandRegistration::new("i18n/get-locale", "locale", move |_context| {
		let shell_locale = shell_locale.clone();
		async move { Ok(json!(&*shell_locale.lock().unwrap())) }
	}));

	let shell_locale = locale;
	let bus = events.clone();
	router.register(
		CommandRegistration::new("i18n/set-locale", "set_locale", move |context| {
			let shell_locale = shell_locale.clone();
			let bus = bus.clone();
			async move {
				let args: SetLocaleArgs = parse_args(context.payload)?;
				*shell_locale.lock().unwrap() = args.locale.clone();
				bus.emit(subjects::LOCALE_CHANGED, json!({ "locale": args.locale }));
				Ok(json!({ "success": true }))
			}
		})
		.require_grant("settings/i18n")
	);
}
