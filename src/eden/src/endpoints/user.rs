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

use super::parse_args;
use crate::{
	router::{CommandRegistration, CommandRouter},
	user::{UserManager, UserRole}
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginArgs {
	username: String,
	password: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserArgs {
	username: String,
	display_name: String,
	#[serde(default)]
	grants: Vec<String>,
	password: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserArgs {
	username: String,
	#[serde(default)]
	display_name: Option<String>,
	#[serde(default)]
	grants: Option<Vec<String>>,
	#[serde(default)]
	role: Option<UserRole>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsernameArgs {
	username: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetPasswordArgs {
	username: String,
	password: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordArgs {
	username: String,
	current_password: String,
	new_password: String
}

pub(crate) fn register(router: &CommandRouter, users: &Arc<UserManager>) {
	let manager = users.clone();
	router.register(
		CommandRegistration::new("user/login", "login", move |context| {
			let manager = manager.clone();
			async move {
				let args: LoginArgs = parse_args(context.payload)?;
				let profile = manager.login(&args.username, &args.password)?;
				Ok(serde_json::to_value(profile)?)
			}
		})
		.require_permission("user/auth")
	);

	let manager = users.clone();
	router.register(
		CommandRegistration::new("user/logout", "logout", move |_context| {
			let manager = manager.clone();
			async move {
				manager.logout();
				Ok(json!({ "success": true }))
			}
		})
		.require_permission("user/auth")
	);

	let manager = users.clone();
	router.register(CommandRegistration::new("user/current", "current_user", move |_context| {
		let manager = manager.clone();
		async move { Ok(serde_json::to_value(manager.current_user())?) }
	}));

	let manager = users.clone();
	router.register(
		CommandRegistration::new("user/list", "list_users", move |_context| {
			let manager = manager.clone();
			async move { Ok(serde_json::to_value(manager.list_users())?) }
		})
		.require_grant("users/manage")
	);

	let manager = users.clone();
	router.register(
		CommandRegistration::new("user/create", "create_user", move |context| {
			let manager = manager.clone();
			async move {
				let args: CreateUserArgs = parse_args(context.payload)?;
				let profile = manager.create_user(&args.username, &args.display_name, args.grants, &args.password)?;
				Ok(serde_json::to_value(profile)?)
			}
		})
		.require_grant("users/manage")
	);

	let manager = users.clone();
	router.register(
		CommandRegistration::new("user/update", "update_user", move |context| {
			let manager = manager.clone();
			async move {
				let args: UpdateUserArgs = parse_args(context.payload)?;
				let profile = manager.update_user(&args.username, args.display_name, args.grants, args.role)?;
				Ok(serde_json::to_value(profile)?)
			}
		})
		.require_grant("users/manage")
	);

	let manager = users.clone();
	router.register(
		CommandRegistration::new("user/delete", "delete_user", move |context| {
			let manager = manager.clone();
			async move {
				let args: UsernameArgs = parse_args(context.payload)?;
				manager.delete_user(&args.username)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_grant("users/manage")
	);

	let manager = users.clone();
	router.register(
		CommandRegistration::new("user/set-password", "set_password", move |context| {
			let manager = manager.clone();
			async move {
				let args: SetPasswordArgs = parse_args(context.payload)?;
				manager.set_password(&args.username, &args.password)?;
				Ok(json!({ "success": true }))
			}
		})
		.require_grant("users/manage")
	);

	let manager = users.clone();
	router.register(CommandRegistration::new("user/change-password", "change_password", move |context| {
		let manager = manager.clone();
		async move {
			let args: ChangePasswordArgs = parse_args(context.payload)?;
			manager.change_password(&args.username, &args.current_password, &args.new_password)?;
			Ok(json!({ "success": true }))
		}
	}));
}
