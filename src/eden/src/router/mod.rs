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

//! The command router.
//!
//! Every cross-process call enters the shell as a `namespace/verb` command.
//! The router resolves the handler, checks the calling app's permissions
//! and the current user's grants, and invokes the handler with the caller's
//! identity carried in an explicit [`CallerContext`] beside the payload.
//!
//! Managers register their verbs through explicit registration tables built
//! at construction time; the shell constructs every manager first and then
//! invites each to register, which resolves the manager ↔ router cycle.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex}
};

use eden_runtime::ViewId;
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;

use crate::{
	error::{Error, Result},
	scope::PermissionRegistry,
	user::UserManager
};

/// The identity of a command's caller, established by the shell and never
/// merged into the user-visible payload.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
	/// The calling app, absent for the trusted foundation.
	pub app_id: Option<String>,
	/// The calling view, absent for workers and the foundation.
	pub view_id: Option<ViewId>,
	/// Whether the call originates from the host shell itself.
	pub is_foundation: bool
}

impl CallerContext {
	/// The trusted foundation: permission checks are skipped, user-grant
	/// checks are not.
	pub fn foundation() -> Self {
		Self {
			app_id: None,
			view_id: None,
			is_foundation: true
		}
	}

	/// A call originating from an app's view process.
	pub fn for_view(app_id: &str, view_id: ViewId) -> Self {
		Self {
			app_id: Some(app_id.to_string()),
			view_id: Some(view_id),
			is_foundation: false
		}
	}

	/// A call originating from an app's worker process.
	pub fn for_worker(app_id: &str) -> Self {
		Self {
			app_id: Some(app_id.to_string()),
			view_id: None,
			is_foundation: false
		}
	}
}

/// What a handler receives: the caller's identity and the JSON payload.
#[derive(Debug, Clone)]
pub struct InvokeContext {
	/// The caller's identity.
	pub caller: CallerContext,
	/// The command arguments.
	pub payload: JsonValue
}

type CommandFn = Arc<dyn Fn(InvokeContext) -> BoxFuture<'static, Result<JsonValue>> + Send + Sync>;

/// A single `(command, permission?, grant?, invoke)` registration row.
pub struct CommandRegistration {
	command: String,
	method_name: String,
	required_permission: Option<String>,
	required_grant: Option<String>,
	invoke: CommandFn
}

impl CommandRegistration {
	/// Creates a registration for a command, naming the manager method it
	/// dispatches to.
	pub fn new<F, Fut>(command: &str, method_name: &str, invoke: F) -> Self
	where
		F: Fn(InvokeContext) -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = Result<JsonValue>> + Send + 'static
	{
		Self {
			command: command.to_string(),
			method_name: method_name.to_string(),
			required_permission: None,
			required_grant: None,
			invoke: Arc::new(move |context| Box::pin(invoke(context)))
		}
	}

	/// Requires the calling app to hold a permission.
	pub fn require_permission(mut self, permission: &str) -> Self {
		self.required_permission = Some(permission.to_string());
		self
	}

	/// Requires the current user to hold a grant.
	pub fn require_grant(mut self, grant: &str) -> Self {
		self.required_grant = Some(grant.to_string());
		self
	}
}

struct HandlerEntry {
	method_name: String,
	required_permission: Option<String>,
	required_grant: Option<String>,
	invoke: CommandFn
}

/// Dispatches namespaced commands to handlers, evaluating permissions and
/// grants.
pub struct CommandRouter {
	permissions: Arc<PermissionRegistry>,
	users: Arc<UserManager>,
	handlers: Mutex<HashMap<String, HandlerEntry>>
}

impl CommandRouter {
	/// Creates a router gated by the given permission registry and user
	/// manager.
	pub fn new(permissions: Arc<PermissionRegistry>, users: Arc<UserManager>) -> Self {
		Self {
			permissions,
			users,
			handlers: Mutex::new(HashMap::new())
		}
	}

	/// Registers a command. Registration is idempotent per command;
	/// overwriting an existing handler logs a warning and replaces it.
	pub fn register(&self, registration: CommandRegistration) {
		let CommandRegistration {
			command,
			method_name,
			required_permission,
			required_grant,
			invoke
		} = registration;
		let mut handlers = self.handlers.lock().unwrap();
		if let Some(previous) = handlers.get(&command) {
			tracing::warn!("command {command} was already registered by `{}`; overwriting with `{method_name}`", previous.method_name);
		}
		handlers.insert(command, HandlerEntry {
			method_name,
			required_permission,
			required_grant,
			invoke
		});
	}

	/// Whether a command is registered.
	pub fn is_registered(&self, command: &str) -> bool {
		self.handlers.lock().unwrap().contains_key(command)
	}

	/// Executes a command on behalf of a caller.
	///
	/// Permission checks apply only when the caller carries an app id; the
	/// trusted foundation skips them. User-grant checks always apply. When
	/// the required permission is covered only by the app's grants, the
	/// current user must hold `app/<appId>/<grantId>` for at least one
	/// grant that unlocks it.
	pub async fn execute(&self, command: &str, payload: JsonValue, caller: CallerContext) -> Result<JsonValue> {
		let (required_permission, required_grant, invoke) = {
			let handlers = self.handlers.lock().unwrap();
			match handlers.get(command) {
				Some(entry) => (entry.required_permission.clone(), entry.required_grant.clone(), entry.invoke.clone()),
				None => return Err(Error::UnknownCommand(command.to_string()))
			}
		};

		if let (Some(permission), Some(app_id)) = (&required_permission, &caller.app_id) {
			if !self.permissions.has_permission(app_id, permission) {
				return Err(Error::PermissionDenied {
					permission: permission.clone(),
					command: command.to_string()
				});
			}
			if !self.permissions.is_base_permission(app_id, permission) {
				let grant_ids = self.permissions.required_grant_ids(app_id, permission);
				let unlocked = grant_ids.iter().any(|grant_id| self.users.has_grant(&format!("app/{app_id}/{grant_id}")));
				if !unlocked {
					let grant = grant_ids
						.first()
						.map(|grant_id| format!("app/{app_id}/{grant_id}"))
						.unwrap_or_else(|| format!("app/{app_id}/*"));
					return Err(Error::GrantDenied {
						grant,
						command: command.to_string()
					});
				}
			}
		}

		if let Some(grant) = &required_grant {
			if !self.users.has_grant(grant) {
				return Err(Error::GrantDenied {
					grant: grant.clone(),
					command: command.to_string()
				});
			}
		}

		invoke(InvokeContext {
			caller,
			payload
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::{json, Value as JsonValue};

	use super::{CallerContext, CommandRegistration, CommandRouter};
	use crate::{
		error::Error,
		event::EventBus,
		scope::PermissionRegistry,
		store::{SeedConfig, Stores},
		user::UserManager
	};

	fn router_fixture() -> (Arc<PermissionRegistry>, Arc<UserManager>, CommandRouter) {
		let permissions = Arc::new(PermissionRegistry::new());
		let events = Arc::new(EventBus::new(permissions.clone()));
		let stores = Stores::in_memory();
		SeedConfig::parse(
			r#"{ "users": { "version": 1, "users": [
				{ "username": "alice", "displayName": "Alice", "grants": ["app/io.pyke.editor/fs-access", "users/manage"], "password": "pw" }
			], "defaultUser": "alice" } }"#
		)
		.unwrap()
		.apply(&stores);
		let users = Arc::new(UserManager::new(stores.users.clone(), events));
		users.establish_default();
		let router = CommandRouter::new(permissions.clone(), users.clone());
		(permissions, users, router)
	}

	fn echo_registration(command: &str) -> CommandRegistration {
		CommandRegistration::new(command, "echo", |context| async move { Ok(context.payload) })
	}

	#[tokio::test]
	async fn unknown_command() {
		let (_permissions, _users, router) = router_fixture();
		let error = router.execute("fs/read", json!({}), CallerContext::foundation()).await.unwrap_err();
		assert_eq!(error.to_string(), "Unknown command: fs/read");
	}

	#[tokio::test]
	async fn reregistration_replaces_handler() {
		let (_permissions, _users, router) = router_fixture();
		router.register(CommandRegistration::new("sys/ping", "ping_old", |_| async { Ok(json!("old")) }));
		router.register(CommandRegistration::new("sys/ping", "ping_new", |_| async { Ok(json!("new")) }));
		let result = router.execute("sys/ping", JsonValue::Null, CallerContext::foundation()).await.unwrap();
		assert_eq!(result, json!("new"));
	}

	#[tokio::test]
	async fn permission_gate() {
		let (permissions, _users, router) = router_fixture();
		router.register(echo_registration("fs/read").require_permission("fs/read"));
		permissions.register("A.one", vec!["fs/*".into()], Default::default());
		permissions.register("A.two", Vec::new(), Default::default());

		let allowed = router
			.execute("fs/read", json!({ "path": "/x" }), CallerContext::for_view("A.one", 1))
			.await
			.unwrap();
		assert_eq!(allowed, json!({ "path": "/x" }));

		let error = router.execute("fs/read", json!({}), CallerContext::for_view("A.two", 2)).await.unwrap_err();
		assert_eq!(error.to_string(), "Permission denied: fs/read required for fs/read");
	}

	#[tokio::test]
	async fn grant_unlocked_permission() {
		let (permissions, users, router) = router_fixture();
		router.register(echo_registration("fs/read").require_permission("fs/read"));
		permissions.register(
			"io.pyke.editor",
			vec!["view/manage".into()],
			std::collections::HashMap::from([("fs-access".to_string(), vec!["fs/*".to_string()])])
		);

		// alice holds app/io.pyke.editor/fs-access
		router.execute("fs/read", json!({}), CallerContext::for_view("io.pyke.editor", 1)).await.unwrap();

		users.logout();
		let error = router.execute("fs/read", json!({}), CallerContext::for_view("io.pyke.editor", 1)).await.unwrap_err();
		assert_eq!(error.to_string(), "Grant denied: app/io.pyke.editor/fs-access required for fs/read");
	}

	#[tokio::test]
	async fn foundation_skips_permissions_but_not_grants() {
		let (_permissions, users, router) = router_fixture();
		router.register(echo_registration("fs/read").require_permission("fs/read"));
		router.register(echo_registration("user/create").require_grant("users/manage"));

		router.execute("fs/read", json!({}), CallerContext::foundation()).await.unwrap();
		router.execute("user/create", json!({}), CallerContext::foundation()).await.unwrap();

		users.logout();
		let error = router.execute("user/create", json!({}), CallerContext::foundation()).await.unwrap_err();
		assert_eq!(error.to_string(), "Grant denied: users/manage required for user/create");
	}

	#[tokio::test]
	async fn handler_errors_cross_the_boundary_as_strings() {
		let (_permissions, _users, router) = router_fixture();
		router.register(CommandRegistration::new("view/focus", "focus", |_| async {
			Err(Error::ViewNotFound(42))
		}));
		let error = router.execute("view/focus", json!({}), CallerContext::foundation()).await.unwrap_err();
		assert_eq!(error.to_string(), "View 42 not found");
	}
}
