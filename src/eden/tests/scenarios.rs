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

//! End-to-end scenarios over the mock runtime.

use std::{
	path::PathBuf,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex
	},
	time::Duration
};

use eden::{
	appbus::AppBusEndpoint,
	event::subjects,
	package::InstallOptions,
	router::CallerContext,
	runtime::mock::MockRuntime,
	store::{SeedConfig, Stores},
	view::{TilingConfig, TilingMode, ViewMode},
	Error, Shell, ShellConfig
};
use eden_utils::{manifest::Manifest, Position, Rect};
use serde_json::json;

fn seed() -> SeedConfig {
	SeedConfig::parse(
		r#"{
			"users": {
				"version": 1,
				"users": [
					{ "username": "vendor", "displayName": "Vendor", "role": "vendor", "grants": ["*"], "password": "rootpw" },
					{ "username": "alice", "displayName": "Alice", "grants": ["apps/launch/*"], "password": "wonderland" }
				],
				"defaultUser": "alice"
			}
		}"#
	)
	.unwrap()
}

fn shell_with_tiling(tiling: TilingConfig) -> (Arc<MockRuntime>, Arc<Shell<MockRuntime>>) {
	let runtime = MockRuntime::new();
	runtime.set_workspace(Rect::new(0.0, 0.0, 1000.0, 600.0));
	let shell = Shell::new(runtime.clone(), Stores::in_memory(), ShellConfig {
		tiling,
		seed: Some(seed()),
		..Default::default()
	});
	(shell.runtime().clone(), shell)
}

fn shell() -> (Arc<MockRuntime>, Arc<Shell<MockRuntime>>) {
	shell_with_tiling(TilingConfig {
		mode: TilingMode::None,
		..Default::default()
	})
}

fn install_worker_app(shell: &Shell<MockRuntime>, app_id: &str) {
	let manifest = Manifest::parse(&format!(
		r#"{{
			"id": "{app_id}", "name": "Test", "version": "1.0.0",
			"worker": {{ "entry": "worker.js" }},
			"permissions": ["appbus/*", "process/list"]
		}}"#
	))
	.unwrap();
	shell.packages().install(manifest, PathBuf::from("/apps").join(app_id), InstallOptions::default()).unwrap();
}

fn install_view_app(shell: &Shell<MockRuntime>, app_id: &str, window: &str) {
	let manifest = Manifest::parse(&format!(
		r#"{{
			"id": "{app_id}", "name": "Test", "version": "1.0.0",
			"frontend": {{ "entry": "index.html" }},
			"permissions": ["view/manage"]{window}
		}}"#
	))
	.unwrap();
	shell.packages().install(manifest, PathBuf::from("/apps").join(app_id), InstallOptions::default()).unwrap();
}

async fn settle() {
	tokio::time::sleep(Duration::from_millis(25)).await;
}

// Scenario 1: an app with a matching base pattern passes the permission
// gate, an app with no capabilities is denied before the handler runs.
#[tokio::test]
async fn permission_gate() {
	let (_runtime, shell) = shell();
	shell.permissions().register("A.one", vec!["fs/*".into()], Default::default());

	use eden::router::CommandRegistration;
	let invocations = Arc::new(AtomicUsize::new(0));
	let counter = invocations.clone();
	shell.router().register(
		CommandRegistration::new("fs/read", "read", move |context| {
			let counter = counter.clone();
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok(context.payload)
			}
		})
		.require_permission("fs/read")
	);

	shell.execute("fs/read", json!({ "path": "/x" }), CallerContext::for_view("A.one", 1)).await.unwrap();
	assert_eq!(invocations.load(Ordering::SeqCst), 1);

	let error = shell.execute("fs/read", json!({}), CallerContext::for_view("A.two", 2)).await.unwrap_err();
	assert_eq!(error.to_string(), "Permission denied: fs/read required for fs/read");
	assert_eq!(invocations.load(Ordering::SeqCst), 1, "the handler body must not run");
}

// Scenario 2: service exposure, connect handshake, request/response,
// NoHandler, and close propagation when the service app stops.
#[tokio::test]
async fn appbus_request_response() {
	let (runtime, shell) = shell();
	install_worker_app(&shell, "app.s");
	install_worker_app(&shell, "app.c");
	shell.processes().launch("app.s", None, None).await.unwrap();
	shell.processes().launch("app.c", None, None).await.unwrap();

	// the service process installs its onConnect handler locally
	let worker_s = runtime.worker("app.s").unwrap();
	let endpoint_s = AppBusEndpoint::new(worker_s.mailbox(), worker_s.channel());
	endpoint_s.on_connect("chat-relay", |connection| {
		connection
			.handle("echo", |payload| async move { Ok(json!(payload.as_i64().unwrap_or(0) + 1)) })
			.unwrap();
	});
	shell
		.execute("appbus/expose", json!({ "name": "chat-relay" }), CallerContext::for_worker("app.s"))
		.await
		.unwrap();

	let worker_c = runtime.worker("app.c").unwrap();
	let endpoint_c = AppBusEndpoint::new(worker_c.mailbox(), worker_c.channel());
	let response = shell
		.execute("appbus/connect", json!({ "targetAppId": "app.s", "serviceName": "chat-relay" }), CallerContext::for_worker("app.c"))
		.await
		.unwrap();
	assert_eq!(response["success"], json!(true));
	let connection_id = response["connectionId"].as_str().unwrap();

	let connection = endpoint_c.wait_for_connection(connection_id, Duration::from_secs(1)).await.unwrap();
	assert_eq!(connection.request("echo", json!(41)).await.unwrap(), json!(42));

	let error = connection.request("missing", json!({})).await.unwrap_err();
	assert!(matches!(error, Error::Runtime(eden::runtime::Error::NoHandler(ref method)) if method == "missing"));

	let closes = Arc::new(AtomicUsize::new(0));
	let counter = closes.clone();
	connection.on_close(move || {
		counter.fetch_add(1, Ordering::SeqCst);
	});

	shell.processes().stop("app.s").await.unwrap();
	settle().await;
	assert_eq!(closes.load(Ordering::SeqCst), 1);
	assert!(!connection.is_connected());
	assert!(shell.appbus().list_services().is_empty());
}

// Scenario 3: a 2x2 grid evicts the least recently focused tile when a
// fifth app is shown, and a mode switch frees the slot for it again.
#[tokio::test]
async fn mode_switch_with_capacity() {
	let (_runtime, shell) = shell_with_tiling(TilingConfig {
		mode: TilingMode::Grid,
		gap: 0.0,
		padding: 0.0,
		columns: Some(2),
		rows: Some(2)
	});

	let apps = ["app.a", "app.b", "app.c", "app.d", "app.e"];
	for app_id in apps {
		install_view_app(&shell, app_id, "");
		shell.processes().launch(app_id, None, None).await.unwrap();
	}
	let views: Vec<_> = apps.iter().map(|app_id| shell.views().app_view(app_id).unwrap()).collect();
	for view_id in &views {
		shell.views().focus_view(*view_id).unwrap();
	}

	let record_a = shell.views().view_record(views[0]).unwrap();
	assert!(!record_a.visible, "the least recently focused tile is hidden");
	for view_id in &views[1..] {
		assert!(shell.views().view_record(*view_id).unwrap().visible);
	}

	shell.views().toggle_mode(views[1], Some(ViewMode::Floating)).unwrap();
	let record_a = shell.views().view_record(views[0]).unwrap();
	assert!(record_a.visible, "the evicted tile takes the vacated slot");
	assert_eq!(record_a.tile_index, Some(0));
	let record_b = shell.views().view_record(views[1]).unwrap();
	assert_eq!(record_b.mode, ViewMode::Floating);
	assert!(record_b.z_index.is_some() && record_b.tile_index.is_none());
}

// Scenario 4: bounds updates from a drag reach only the subscribed,
// dragged view, and stop arriving once the gesture ends.
#[tokio::test]
async fn subscription_targeting() {
	let (runtime, shell) = shell();
	install_view_app(&shell, "app.v", r#", "window": { "defaultSize": { "width": 400, "height": 300 } }"#);
	install_view_app(&shell, "app.w", "");
	shell.processes().launch("app.v", None, None).await.unwrap();
	shell.processes().launch("app.w", None, None).await.unwrap();
	let view_v = shell.views().app_view("app.v").unwrap();
	let view_w = shell.views().app_view("app.w").unwrap();

	shell
		.execute("event/subscribe", json!({ "subject": "view/bounds-updated" }), CallerContext::for_view("app.v", view_v))
		.await
		.unwrap();

	let v_updates = Arc::new(AtomicUsize::new(0));
	let counter = v_updates.clone();
	runtime.view(view_v).unwrap().channel().on(subjects::VIEW_BOUNDS_UPDATED, move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	let w_updates = Arc::new(AtomicUsize::new(0));
	let counter = w_updates.clone();
	runtime.view(view_w).unwrap().channel().on(subjects::VIEW_BOUNDS_UPDATED, move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});

	runtime.set_cursor(Position::new(500.0, 300.0));
	runtime.set_mouse_pressed(true);
	shell.views().begin_drag(view_v).unwrap();
	runtime.set_cursor(Position::new(540.0, 320.0));
	tokio::time::sleep(Duration::from_millis(80)).await;

	shell.views().end_gesture();
	settle().await;
	let after_end = v_updates.load(Ordering::SeqCst);
	assert!(after_end > 0, "drag ticks must produce targeted bounds updates");
	assert_eq!(w_updates.load(Ordering::SeqCst), 0, "no other view receives the payloads");

	runtime.set_cursor(Position::new(900.0, 500.0));
	tokio::time::sleep(Duration::from_millis(60)).await;
	assert_eq!(v_updates.load(Ordering::SeqCst), after_end, "no further payloads after end-drag");
}

// Scenario 5: a crashed worker's subscriptions, services, and peer
// connections are swept before the next emission.
#[tokio::test]
async fn crash_cleanup() {
	let (runtime, shell) = shell();
	install_worker_app(&shell, "app.w");
	install_worker_app(&shell, "app.p");
	shell.processes().launch("app.w", None, None).await.unwrap();
	shell.processes().launch("app.p", None, None).await.unwrap();

	// the worker wires itself up over its own parent channel
	let worker_w = runtime.worker("app.w").unwrap();
	let endpoint_w = AppBusEndpoint::new(worker_w.mailbox(), worker_w.channel());
	endpoint_w.on_connect("svc", |connection| {
		connection.handle("ping", |_| async { Ok(json!("pong")) }).unwrap();
	});
	worker_w
		.channel()
		.request("shell-command", json!({ "command": "appbus/expose", "payload": { "name": "svc" } }))
		.await
		.unwrap();
	worker_w
		.channel()
		.request("shell-command", json!({ "command": "event/subscribe", "payload": { "subject": "clock/tick" } }))
		.await
		.unwrap();

	let worker_p = runtime.worker("app.p").unwrap();
	let endpoint_p = AppBusEndpoint::new(worker_p.mailbox(), worker_p.channel());
	let response = shell
		.execute("appbus/connect", json!({ "targetAppId": "app.w", "serviceName": "svc" }), CallerContext::for_worker("app.p"))
		.await
		.unwrap();
	let connection = endpoint_p
		.wait_for_connection(response["connectionId"].as_str().unwrap(), Duration::from_secs(1))
		.await
		.unwrap();
	assert_eq!(connection.request("ping", json!({})).await.unwrap(), json!("pong"));

	let closes = Arc::new(AtomicUsize::new(0));
	let counter = closes.clone();
	connection.on_close(move || {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	let exits = Arc::new(Mutex::new(Vec::new()));
	let sink = exits.clone();
	shell.events().subscribe_internal(subjects::PROCESS_EXITED, move |payload| sink.lock().unwrap().push(payload.clone()));

	let subjects_before = shell.events().subject_count();
	worker_w.simulate_exit(137);
	settle().await;

	let exits = exits.lock().unwrap();
	assert_eq!(exits.len(), 1);
	assert_eq!(exits[0]["appId"], "app.w");
	assert_eq!(exits[0]["code"], 137);
	assert!(!shell.processes().is_running("app.w"));
	assert!(shell.appbus().list_services().is_empty());
	assert_eq!(closes.load(Ordering::SeqCst), 1);
	// the clock/tick subscription is gone; emitting reaches nobody
	assert!(shell.events().subject_count() < subjects_before);
	shell.events().emit("clock/tick", json!({ "seq": 1 }));
}

// Scenario 6: logout drains every running app before the next session may
// launch anything, and launching without a user is rejected.
#[tokio::test]
async fn session_change_drains_apps() {
	let (_runtime, shell) = shell();
	install_worker_app(&shell, "app.x");
	install_worker_app(&shell, "app.y");
	shell.processes().launch("app.x", None, None).await.unwrap();
	shell.processes().launch("app.y", None, None).await.unwrap();

	let stops = Arc::new(AtomicUsize::new(0));
	let counter = stops.clone();
	shell.events().subscribe_internal(subjects::PROCESS_STOPPED, move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	let changes = Arc::new(Mutex::new(Vec::new()));
	let sink = changes.clone();
	shell.events().subscribe_internal(subjects::USER_CHANGED, move |payload| sink.lock().unwrap().push(payload.clone()));

	shell.users().logout();

	// the drain runs asynchronously off the session-change signal
	let mut drained = false;
	for _ in 0..100 {
		if shell.processes().running_apps().is_empty() {
			drained = true;
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert!(drained, "running apps must drain after logout");
	assert_eq!(stops.load(Ordering::SeqCst), 2);
	assert_eq!(changes.lock().unwrap()[0]["reason"], "logout");

	let error = shell.processes().launch("app.x", None, None).await.unwrap_err();
	assert_eq!(error.to_string(), "Not authorized to launch app app.x");
	assert!(matches!(error, Error::NotAuthorized(_)));
}
