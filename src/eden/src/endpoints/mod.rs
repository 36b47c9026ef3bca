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

//! The command endpoints: one module per reserved namespace, each
//! contributing an explicit registration table to the router.

pub(crate) mod appbus;
pub(crate) mod event;
pub(crate) mod notification;
pub(crate) mod package;
pub(crate) mod process;
pub(crate) mod settings;
pub(crate) mod system;
pub(crate) mod user;
pub(crate) mod view;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{
	error::{Error, Result},
	router::InvokeContext
};

/// Deserializes a command payload into its argument struct.
pub(crate) fn parse_args<T: DeserializeOwned>(payload: JsonValue) -> Result<T> {
	serde_json::from_value(payload).map_err(Error::from)
}

/// The calling app's id; superuser verbs aside, commands address the
/// caller's own namespace.
pub(crate) fn caller_app(context: &InvokeContext) -> Result<String> {
	context
		.caller
		.app_id
		.clone()
		.ok_or_else(|| Error::Command(anyhow::anyhow!("this command requires an app caller")))
}
