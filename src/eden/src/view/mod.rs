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

//! The view manager.
//!
//! A single host window contains a stack of child views. Tiled app views
//! sit at the bottom ordered by tile index, floating app views above them
//! by ascending z-index, and overlays on top in a reserved high band. On
//! every change the manager restacks all alive views in that order.

pub mod tiling;
pub mod tracker;

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, Weak}
};

use once_cell::sync::OnceCell;

use eden_runtime::{PendingView, Port, PortChannel, PortTransfer, Runtime, ViewHandle, ViewId};
use eden_utils::{
	manifest::{Manifest, ScalingMode, WindowConfig, WindowMode},
	Position, Rect
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
	error::{Error, Result},
	event::{subjects, EventBus}
};

pub use tiling::{TilingConfig, TilingMode};
pub use tracker::{MouseTracker, TrackerToken, TRACKER_INTERVAL};

/// The z band reserved for overlays, strictly above every floating app.
pub const OVERLAY_Z_BASE: u64 = 1 << 20;
/// Cascade offset applied per existing floating view at placement.
pub const FLOAT_CASCADE_OFFSET: f64 = 30.0;
/// How much of a floating view must stay horizontally inside the
/// workspace.
pub const MIN_VISIBLE_EDGE: f64 = 100.0;
/// Lower bound of the host-wide zoom factor.
pub const MIN_ZOOM: f64 = 0.5;
/// Upper bound of the host-wide zoom factor.
pub const MAX_ZOOM: f64 = 2.0;

/// A view's current layout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
	/// Managed by the tile layout.
	Tiled,
	/// Z-ordered and freely placed.
	Floating
}

/// Whether a view is a regular app view or an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
	/// A regular application view.
	App,
	/// Floats above every app view in the reserved band.
	Overlay
}

/// The manager's record of a live view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
	/// The view id.
	pub id: ViewId,
	/// The owning app.
	pub app_id: String,
	/// Current bounds in workspace coordinates.
	pub bounds: Rect,
	/// Whether the view is currently shown.
	pub visible: bool,
	/// Current layout mode.
	pub mode: ViewMode,
	/// App view or overlay.
	pub view_type: ViewType,
	/// Position in the tile layout; set exactly when tiled.
	pub tile_index: Option<usize>,
	/// Stack position; set exactly when floating.
	pub z_index: Option<u64>,
	/// Logical clock value of the last focus.
	pub last_focused_at: u64
}

struct ViewEntry<R: Runtime> {
	record: ViewRecord,
	handle: R::View,
	window: WindowConfig,
	channel: PortChannel,
	/// Hidden by capacity eviction rather than by the user; eligible for
	/// automatic re-show when a slot frees.
	evicted: bool
}

#[derive(Clone, Copy)]
enum GestureKind {
	Move,
	Resize
}

struct Gesture {
	view_id: ViewId,
	kind: GestureKind,
	start_cursor: Position,
	base_bounds: Rect,
	token: TrackerToken
}

struct ManagerState<R: Runtime> {
	views: HashMap<ViewId, ViewEntry<R>>,
	tile_order: Vec<ViewId>,
	next_view_id: ViewId,
	next_float_z: u64,
	next_overlay_z: u64,
	focus_clock: u64,
	zoom: f64,
	gesture: Option<Gesture>
}

/// Creates, tiles, stacks, resizes, focuses, and mode-switches views.
pub struct ViewManager<R: Runtime> {
	runtime: Arc<R>,
	events: Arc<EventBus>,
	tracker: MouseTracker<R>,
	tiling: Mutex<TilingConfig>,
	state: Mutex<ManagerState<R>>,
	weak: OnceCell<Weak<Self>>
}

impl<R: Runtime> ViewManager<R> {
	/// Creates a view manager over the given runtime.
	pub fn new(runtime: Arc<R>, events: Arc<EventBus>, tiling: TilingConfig) -> Arc<Self> {
		let manager = Arc::new(Self {
			tracker: MouseTracker::new(runtime.clone()),
			runtime,
			events,
			tiling: Mutex::new(tiling),
			state: Mutex::new(ManagerState {
				views: HashMap::new(),
				tile_order: Vec::new(),
				next_view_id: 1,
				next_float_z: 1,
				next_overlay_z: OVERLAY_Z_BASE + 1,
				focus_clock: 0,
				zoom: 1.0,
				gesture: None
			}),
			weak: OnceCell::new()
		});
		let _ = manager.weak.set(Arc::downgrade(&manager));
		manager
	}

	fn initial_mode(&self, manifest: &Manifest) -> ViewMode {
		if manifest.overlay {
			return ViewMode::Floating;
		}
		match manifest.window.mode {
			WindowMode::Tiled => ViewMode::Tiled,
			WindowMode::Floating => ViewMode::Floating,
			WindowMode::Both => {
				if self.tiling.lock().unwrap().mode == TilingMode::None {
					ViewMode::Floating
				} else {
					ViewMode::Tiled
				}
			}
		}
	}

	/// Creates a view for an app. The caller supplies both halves of the
	/// shell↔view channel: the already-pumped shell side (with its
	/// listeners installed, so no load signal can be lost) and the raw
	/// process end handed to the runtime.
	pub fn create_view(&self, manifest: &Manifest, channel: PortChannel, process_port: Port, requested_bounds: Option<Rect>) -> Result<ViewId> {
		let workspace = self.runtime.workspace();
		let tiling = *self.tiling.lock().unwrap();
		let mode = self.initial_mode(manifest);

		let (record, pending) = {
			let mut state = self.state.lock().unwrap();
			if state.views.values().any(|entry| entry.record.app_id == manifest.id) {
				return Err(Error::AlreadyRunning(manifest.id.clone()));
			}

			let id = state.next_view_id;
			state.next_view_id += 1;

			let view_type = if manifest.overlay { ViewType::Overlay } else { ViewType::App };
			let (z_index, bounds) = match (mode, view_type) {
				(ViewMode::Tiled, _) => (None, workspace),
				(ViewMode::Floating, ViewType::App) => {
					let z = state.next_float_z;
					state.next_float_z += 1;
					let bounds = requested_bounds.unwrap_or_else(|| float_placement(&state, &manifest.window, workspace));
					(Some(z), clamp_bounds(bounds, &manifest.window, workspace))
				}
				(ViewMode::Floating, ViewType::Overlay) => {
					let z = state.next_overlay_z;
					state.next_overlay_z += 1;
					(Some(z), requested_bounds.unwrap_or(workspace))
				}
			};

			state.focus_clock += 1;
			let record = ViewRecord {
				id,
				app_id: manifest.id.clone(),
				bounds,
				visible: true,
				mode,
				view_type,
				tile_index: None,
				z_index,
				last_focused_at: state.focus_clock
			};

			let zoom = if manifest.window.scaling == ScalingMode::Manual || manifest.overlay { 1.0 } else { state.zoom };
			let pending = PendingView {
				id,
				app_id: manifest.id.clone(),
				entry: manifest.frontend.clone(),
				bounds,
				visible: true,
				zoom,
				inject_api: manifest.window.inject_api,
				inject_theme: manifest.window.inject_theme,
				port: process_port
			};
			(record, pending)
		};
		let id = record.id;

		self.events.register_view_channel(id, &manifest.id, channel.clone());
		let handle = match self.runtime.create_view(pending) {
			Ok(handle) => handle,
			Err(error) => {
				self.events.unregister_view_channel(id);
				return Err(error.into());
			}
		};

		{
			let mut state = self.state.lock().unwrap();
			state.views.insert(id, ViewEntry {
				record,
				handle,
				window: manifest.window.clone(),
				channel,
				evicted: false
			});
			if mode == ViewMode::Tiled {
				state.tile_order.push(id);
				self.relayout_tiles(&mut state, &tiling, workspace, Some(id));
			}
			self.restack(&state);
		}
		Ok(id)
	}

	/// Removes a view, releasing its channel, subscriptions, and any
	/// active gesture in one sweep.
	pub fn remove_view(&self, view_id: ViewId) -> Result<()> {
		let workspace = self.runtime.workspace();
		let tiling = *self.tiling.lock().unwrap();
		let gesture_token = {
			let mut state = self.state.lock().unwrap();
			let entry = match state.views.remove(&view_id) {
				Some(entry) => entry,
				None => return Err(Error::ViewNotFound(view_id))
			};
			entry.channel.close();
			if let Err(error) = entry.handle.close() {
				tracing::warn!("failed to close view {view_id}: {error}");
			}
			state.tile_order.retain(|id| *id != view_id);
			let gesture_on_view = state.gesture.as_ref().map(|gesture| gesture.view_id == view_id).unwrap_or(false);
			let token = if gesture_on_view { state.gesture.take().map(|gesture| gesture.token) } else { None };
			self.relayout_tiles(&mut state, &tiling, workspace, None);
			self.restack(&state);
			token
		};
		self.events.unregister_view_channel(view_id);
		if let Some(token) = gesture_token {
			self.tracker.unsubscribe(token);
		}
		Ok(())
	}

	/// Shows a view, evicting a less recently focused tile if the layout
	/// is at capacity.
	pub fn show_view(&self, view_id: ViewId) -> Result<()> {
		let workspace = self.runtime.workspace();
		let tiling = *self.tiling.lock().unwrap();
		let mut state = self.state.lock().unwrap();
		let mode = {
			let entry = state.views.get_mut(&view_id).ok_or(Error::ViewNotFound(view_id))?;
			entry.evicted = false;
			entry.record.visible = true;
			entry.record.mode
		};
		if mode == ViewMode::Tiled {
			self.relayout_tiles(&mut state, &tiling, workspace, Some(view_id));
		} else if let Some(entry) = state.views.get(&view_id) {
			if let Err(error) = entry.handle.set_visible(true) {
				tracing::warn!("failed to show view {view_id}: {error}");
			}
		}
		self.restack(&state);
		Ok(())
	}

	/// Hides a view. A user-hidden tile does not rejoin the layout until
	/// shown again.
	pub fn hide_view(&self, view_id: ViewId) -> Result<()> {
		let workspace = self.runtime.workspace();
		let tiling = *self.tiling.lock().unwrap();
		let mut state = self.state.lock().unwrap();
		let mode = {
			let entry = state.views.get_mut(&view_id).ok_or(Error::ViewNotFound(view_id))?;
			entry.evicted = false;
			entry.record.visible = false;
			entry.record.tile_index = None;
			if let Err(error) = entry.handle.set_visible(false) {
				tracing::warn!("failed to hide view {view_id}: {error}");
			}
			entry.record.mode
		};
		if mode == ViewMode::Tiled {
			self.relayout_tiles(&mut state, &tiling, workspace, None);
		}
		self.restack(&state);
		Ok(())
	}

	/// Raises a view within its band and updates its focus time.
	pub fn focus_view(&self, view_id: ViewId) -> Result<()> {
		let workspace = self.runtime.workspace();
		let tiling = *self.tiling.lock().unwrap();
		let mut state = self.state.lock().unwrap();
		if !state.views.contains_key(&view_id) {
			return Err(Error::ViewNotFound(view_id));
		}
		state.focus_clock += 1;
		let clock = state.focus_clock;
		let (mode, view_type, evicted) = {
			let entry = state.views.get_mut(&view_id).expect("presence checked above");
			entry.record.last_focused_at = clock;
			(entry.record.mode, entry.record.view_type, entry.evicted)
		};
		match mode {
			ViewMode::Floating => {
				let z = match view_type {
					ViewType::App => {
						let z = state.next_float_z;
						state.next_float_z += 1;
						z
					}
					ViewType::Overlay => {
						let z = state.next_overlay_z;
						state.next_overlay_z += 1;
						z
					}
				};
				state.views.get_mut(&view_id).expect("presence checked above").record.z_index = Some(z);
			}
			ViewMode::Tiled if evicted => {
				self.relayout_tiles(&mut state, &tiling, workspace, Some(view_id));
			}
			ViewMode::Tiled => {}
		}
		self.restack(&state);
		Ok(())
	}

	/// Switches a view between tiled and floating, honoring the window
	/// mode its manifest allows.
	pub fn toggle_mode(&self, view_id: ViewId, target: Option<ViewMode>) -> Result<ViewMode> {
		let workspace = self.runtime.workspace();
		let tiling = *self.tiling.lock().unwrap();
		let mode = {
			let mut state = self.state.lock().unwrap();
			let entry = state.views.get(&view_id).ok_or(Error::ViewNotFound(view_id))?;
			let app_id = entry.record.app_id.clone();
			if entry.record.view_type == ViewType::Overlay {
				return Err(Error::UnsupportedMode {
					app_id,
					mode: WindowMode::Tiled
				});
			}
			let target = target.unwrap_or(match entry.record.mode {
				ViewMode::Tiled => ViewMode::Floating,
				ViewMode::Floating => ViewMode::Tiled
			});
			if target == entry.record.mode {
				return Ok(target);
			}
			let allowed = match (target, entry.window.mode) {
				(_, WindowMode::Both) => true,
				(ViewMode::Tiled, WindowMode::Tiled) => true,
				(ViewMode::Floating, WindowMode::Floating) => true,
				_ => false
			};
			if !allowed {
				return Err(Error::UnsupportedMode {
					app_id,
					mode: match target {
						ViewMode::Tiled => WindowMode::Tiled,
						ViewMode::Floating => WindowMode::Floating
					}
				});
			}

			match target {
				ViewMode::Floating => {
					state.tile_order.retain(|id| *id != view_id);
					let z = state.next_float_z;
					state.next_float_z += 1;
					let bounds = {
						let window = state.views.get(&view_id).expect("entry looked up above").window.clone();
						clamp_bounds(float_placement(&state, &window, workspace), &window, workspace)
					};
					let entry = state.views.get_mut(&view_id).expect("entry looked up above");
					entry.record.mode = ViewMode::Floating;
					entry.record.tile_index = None;
					entry.record.z_index = Some(z);
					entry.record.bounds = bounds;
					entry.record.visible = true;
					entry.evicted = false;
					if let Err(error) = entry.handle.set_bounds(bounds).and_then(|_| entry.handle.set_visible(true)) {
						tracing::warn!("failed to float view {view_id}: {error}");
					}
					// a tile slot was vacated; evicted neighbours may return
					self.relayout_tiles(&mut state, &tiling, workspace, None);
				}
				ViewMode::Tiled => {
					let entry = state.views.get_mut(&view_id).expect("entry looked up above");
					entry.record.mode = ViewMode::Tiled;
					entry.record.z_index = None;
					entry.evicted = false;
					state.tile_order.push(view_id);
					self.relayout_tiles(&mut state, &tiling, workspace, Some(view_id));
				}
			}
			self.restack(&state);
			target
		};

		self.events.notify_view(subjects::VIEW_MODE_CHANGED, view_id, json!({ "viewId": view_id, "mode": mode }));
		Ok(mode)
	}

	/// Moves or resizes a floating view, clamped to the workspace policy.
	/// Updates to tiled views are silently ignored.
	pub fn update_bounds(&self, view_id: ViewId, bounds: Rect) -> Result<()> {
		let workspace = self.runtime.workspace();
		let applied = {
			let mut state = self.state.lock().unwrap();
			let entry = state.views.get_mut(&view_id).ok_or(Error::ViewNotFound(view_id))?;
			if entry.record.mode == ViewMode::Tiled {
				return Ok(());
			}
			let clamped = clamp_bounds(bounds, &entry.window, workspace);
			entry.record.bounds = clamped;
			if let Err(error) = entry.handle.set_bounds(clamped) {
				tracing::warn!("failed to update bounds of view {view_id}: {error}");
			}
			clamped
		};
		self.events.notify_view(subjects::VIEW_BOUNDS_UPDATED, view_id, json!({ "viewId": view_id, "bounds": applied }));
		Ok(())
	}

	/// Starts a drag gesture on a floating, movable view. A no-op for
	/// tiled or immovable views.
	pub fn begin_drag(&self, view_id: ViewId) -> Result<()> {
		self.begin_gesture(view_id, GestureKind::Move)
	}

	/// Starts a resize gesture on a floating, resizable view. A no-op for
	/// tiled or fixed-size views.
	pub fn begin_resize(&self, view_id: ViewId) -> Result<()> {
		self.begin_gesture(view_id, GestureKind::Resize)
	}

	fn begin_gesture(&self, view_id: ViewId, kind: GestureKind) -> Result<()> {
		let previous = {
			let mut state = self.state.lock().unwrap();
			let entry = state.views.get(&view_id).ok_or(Error::ViewNotFound(view_id))?;
			if entry.record.mode == ViewMode::Tiled {
				return Ok(());
			}
			match kind {
				GestureKind::Move if !entry.window.movable => return Ok(()),
				GestureKind::Resize if !entry.window.resizable => return Ok(()),
				_ => {}
			}

			let base_bounds = entry.record.bounds;
			let start_cursor = self.runtime.cursor_position();
			let previous = state.gesture.take().map(|gesture| gesture.token);

			let weak = self.weak.get().cloned().unwrap_or_default();
			let token = self.tracker.subscribe(move |position, pressed| {
				if let Some(manager) = weak.upgrade() {
					manager.on_tracker_tick(position, pressed);
				}
			});
			state.gesture = Some(Gesture {
				view_id,
				kind,
				start_cursor,
				base_bounds,
				token
			});
			previous
		};
		if let Some(token) = previous {
			self.tracker.unsubscribe(token);
		}
		Ok(())
	}

	/// Ends any active drag or resize gesture.
	pub fn end_gesture(&self) {
		let token = self.state.lock().unwrap().gesture.take().map(|gesture| gesture.token);
		if let Some(token) = token {
			self.tracker.unsubscribe(token);
		}
	}

	fn on_tracker_tick(&self, position: Position, pressed: bool) {
		if !pressed {
			// global mouse-up clears any active gesture
			self.end_gesture();
			return;
		}
		let update = {
			let state = self.state.lock().unwrap();
			state.gesture.as_ref().map(|gesture| {
				let dx = position.x - gesture.start_cursor.x;
				let dy = position.y - gesture.start_cursor.y;
				let base = gesture.base_bounds;
				let bounds = match gesture.kind {
					GestureKind::Move => Rect::new(base.x + dx, base.y + dy, base.width, base.height),
					GestureKind::Resize => Rect::new(base.x, base.y, base.width + dx, base.height + dy)
				};
				(gesture.view_id, bounds)
			})
		};
		if let Some((view_id, bounds)) = update {
			let _ = self.update_bounds(view_id, bounds);
		}
	}

	/// Sets the host-wide zoom factor, clamped to [0.5, 2.0], and applies
	/// it to every live view that follows automatic scaling.
	pub fn set_zoom(&self, factor: f64) {
		let factor = factor.clamp(MIN_ZOOM, MAX_ZOOM);
		let state = &mut *self.state.lock().unwrap();
		state.zoom = factor;
		for entry in state.views.values() {
			if entry.window.scaling == ScalingMode::Manual || entry.record.view_type == ViewType::Overlay {
				continue;
			}
			if let Err(error) = entry.handle.set_zoom(factor) {
				tracing::warn!("failed to apply zoom to view {}: {error}", entry.record.id);
			}
		}
	}

	/// The current host-wide zoom factor.
	pub fn zoom(&self) -> f64 {
		self.state.lock().unwrap().zoom
	}

	/// Replaces the tiling configuration and relays out.
	pub fn set_tiling(&self, config: TilingConfig) {
		let workspace = self.runtime.workspace();
		*self.tiling.lock().unwrap() = config;
		let mut state = self.state.lock().unwrap();
		self.relayout_tiles(&mut state, &config, workspace, None);
		self.restack(&state);
	}

	/// Recomputes every view against the (possibly changed) workspace and
	/// announces the new workspace rectangle.
	pub fn workspace_changed(&self) {
		let workspace = self.runtime.workspace();
		let tiling = *self.tiling.lock().unwrap();
		{
			let mut state = self.state.lock().unwrap();
			self.relayout_tiles(&mut state, &tiling, workspace, None);
			let floats: Vec<ViewId> = state
				.views
				.values()
				.filter(|entry| entry.record.mode == ViewMode::Floating)
				.map(|entry| entry.record.id)
				.collect();
			for view_id in floats {
				let entry = state.views.get_mut(&view_id).expect("collected above");
				let clamped = clamp_bounds(entry.record.bounds, &entry.window, workspace);
				entry.record.bounds = clamped;
				if let Err(error) = entry.handle.set_bounds(clamped) {
					tracing::warn!("failed to re-clamp view {view_id}: {error}");
				}
			}
			self.restack(&state);
		}
		self.events.emit(subjects::VIEW_GLOBAL_BOUNDS_CHANGED, json!({ "workspace": workspace }));
	}

	/// The record of a view.
	pub fn view_record(&self, view_id: ViewId) -> Option<ViewRecord> {
		self.state.lock().unwrap().views.get(&view_id).map(|entry| entry.record.clone())
	}

	/// Every live view's record.
	pub fn list_views(&self) -> Vec<ViewRecord> {
		let mut records: Vec<ViewRecord> = self.state.lock().unwrap().views.values().map(|entry| entry.record.clone()).collect();
		records.sort_by_key(|record| record.id);
		records
	}

	/// The live view of an app, if any.
	pub fn app_view(&self, app_id: &str) -> Option<ViewId> {
		self.state
			.lock()
			.unwrap()
			.views
			.values()
			.find(|entry| entry.record.app_id == app_id)
			.map(|entry| entry.record.id)
	}

	/// The shell-side channel of a view.
	pub fn channel(&self, view_id: ViewId) -> Option<PortChannel> {
		self.state.lock().unwrap().views.get(&view_id).map(|entry| entry.channel.clone())
	}

	/// Hands a port to the view's process.
	pub fn transfer_to_view(&self, view_id: ViewId, transfer: PortTransfer) -> Result<()> {
		let handle = {
			let state = self.state.lock().unwrap();
			match state.views.get(&view_id) {
				Some(entry) => entry.handle.clone(),
				None => return Err(Error::ViewNotFound(view_id))
			}
		};
		handle.transfer_port(transfer).map_err(Into::into)
	}

	/// Re-applies the tile layout: picks the visible tile set (evicting
	/// the least recently focused beyond capacity, never the preferred
	/// view), reassigns contiguous tile indices in tile order, and pushes
	/// the computed bounds to the runtime.
	fn relayout_tiles(&self, state: &mut ManagerState<R>, tiling: &TilingConfig, workspace: Rect, preferred: Option<ViewId>) {
		let candidates: Vec<ViewId> = state
			.tile_order
			.iter()
			.copied()
			.filter(|id| {
				state
					.views
					.get(id)
					.map(|entry| entry.record.mode == ViewMode::Tiled && (entry.record.visible || entry.evicted))
					.unwrap_or(false)
			})
			.collect();

		let mut shown = candidates.clone();
		if let Some(capacity) = tiling.capacity() {
			while shown.len() > capacity {
				let victim = shown
					.iter()
					.copied()
					.filter(|id| Some(*id) != preferred)
					.min_by_key(|id| state.views.get(id).map(|entry| entry.record.last_focused_at).unwrap_or(0));
				match victim {
					Some(victim) => shown.retain(|id| *id != victim),
					None => break
				}
			}
		}

		let visible_count = shown.len();
		for id in candidates {
			let index = shown.iter().position(|shown_id| *shown_id == id);
			let entry = match state.views.get_mut(&id) {
				Some(entry) => entry,
				None => continue
			};
			match index {
				Some(index) => {
					entry.evicted = false;
					entry.record.visible = true;
					entry.record.tile_index = Some(index);
					entry.record.z_index = None;
					let bounds = tiling.tile_bounds(index, visible_count, workspace);
					entry.record.bounds = bounds;
					if let Err(error) = entry.handle.set_visible(true).and_then(|_| entry.handle.set_bounds(bounds)) {
						tracing::warn!("failed to lay out tile {id}: {error}");
					}
				}
				None => {
					entry.evicted = true;
					entry.record.visible = false;
					entry.record.tile_index = None;
					if let Err(error) = entry.handle.set_visible(false) {
						tracing::warn!("failed to evict tile {id}: {error}");
					}
				}
			}
		}
	}

	/// Rebuilds the host window stack: tiles by tile index, then floating
	/// apps by z, then overlays by z.
	fn restack(&self, state: &ManagerState<R>) {
		let mut tiled: Vec<(usize, ViewId)> = Vec::new();
		let mut floating: Vec<(u64, ViewId)> = Vec::new();
		let mut overlays: Vec<(u64, ViewId)> = Vec::new();
		for entry in state.views.values() {
			if !entry.record.visible {
				continue;
			}
			match (entry.record.mode, entry.record.view_type) {
				(ViewMode::Tiled, _) => {
					if let Some(index) = entry.record.tile_index {
						tiled.push((index, entry.record.id));
					}
				}
				(ViewMode::Floating, ViewType::App) => floating.push((entry.record.z_index.unwrap_or(0), entry.record.id)),
				(ViewMode::Floating, ViewType::Overlay) => overlays.push((entry.record.z_index.unwrap_or(OVERLAY_Z_BASE), entry.record.id))
			}
		}
		tiled.sort_by_key(|(index, _)| *index);
		floating.sort_by_key(|(z, _)| *z);
		overlays.sort_by_key(|(z, _)| *z);

		let order: Vec<ViewId> = tiled
			.into_iter()
			.map(|(_, id)| id)
			.chain(floating.into_iter().map(|(_, id)| id))
			.chain(overlays.into_iter().map(|(_, id)| id))
			.collect();
		if let Err(error) = self.runtime.restack(&order) {
			tracing::warn!("failed to restack views: {error}");
		}
	}
}

/// The default floating placement: manifest default size, centred, with a
/// 30 px cascade per existing floating view.
fn float_placement<R: Runtime>(state: &ManagerState<R>, window: &WindowConfig, workspace: Rect) -> Rect {
	let size = window.default_size;
	let existing_floats = state
		.views
		.values()
		.filter(|entry| entry.record.mode == ViewMode::Floating && entry.record.view_type == ViewType::App)
		.count();
	let cascade = FLOAT_CASCADE_OFFSET * existing_floats as f64;
	let origin = window.default_position.unwrap_or(Position::new(
		workspace.x + (workspace.width - size.width) / 2.0,
		workspace.y + (workspace.height - size.height) / 2.0
	));
	Rect::new(origin.x + cascade, origin.y + cascade, size.width, size.height)
}

/// Clamps floating bounds so at least 100 px stays horizontally inside the
/// workspace, the top stays below the workspace top, and the size honors
/// the manifest's min/max.
fn clamp_bounds(bounds: Rect, window: &WindowConfig, workspace: Rect) -> Rect {
	let mut width = bounds.width;
	let mut height = bounds.height;
	if let Some(min) = window.min_size {
		width = width.max(min.width);
		height = height.max(min.height);
	}
	if let Some(max) = window.max_size {
		width = width.min(max.width);
		height = height.min(max.height);
	}

	let min_x = workspace.x + MIN_VISIBLE_EDGE - width;
	let max_x = workspace.x + workspace.width - MIN_VISIBLE_EDGE;
	let x = bounds.x.clamp(min_x, max_x.max(min_x));
	let y = bounds.y.max(workspace.y);
	Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use eden_runtime::{mock::MockRuntime, Port, PortChannel, ViewId};
	use eden_utils::{manifest::Manifest, Position, Rect};

	use super::{TilingConfig, TilingMode, ViewManager, ViewMode, OVERLAY_Z_BASE};
	use crate::{error::Error, event::EventBus, scope::PermissionRegistry};

	fn manifest(id: &str, extra: &str) -> Manifest {
		Manifest::parse(&format!(
			r#"{{ "id": "{id}", "name": "Test", "version": "1.0.0", "frontend": {{ "entry": "index.html" }}{extra} }}"#
		))
		.unwrap()
	}

	fn fixture(tiling: TilingConfig) -> (Arc<MockRuntime>, Arc<EventBus>, Arc<ViewManager<MockRuntime>>) {
		let runtime = Arc::new(MockRuntime::new());
		runtime.set_workspace(Rect::new(0.0, 0.0, 1000.0, 600.0));
		let events = Arc::new(EventBus::new(Arc::new(PermissionRegistry::new())));
		let manager = ViewManager::new(runtime.clone(), events.clone(), tiling);
		(runtime, events, manager)
	}

	fn grid_2x2() -> TilingConfig {
		TilingConfig {
			mode: TilingMode::Grid,
			gap: 0.0,
			padding: 0.0,
			columns: Some(2),
			rows: Some(2)
		}
	}

	fn create(manager: &Arc<ViewManager<MockRuntime>>, manifest: &Manifest) -> ViewId {
		let (shell_port, process_port) = Port::pair();
		let channel = PortChannel::attach(shell_port);
		manager.create_view(manifest, channel, process_port, None).unwrap()
	}

	#[tokio::test]
	async fn one_view_per_app() {
		let (_runtime, _events, manager) = fixture(grid_2x2());
		let app = manifest("app.solo", "");
		create(&manager, &app);
		let (shell_port, process_port) = Port::pair();
		let error = manager.create_view(&app, PortChannel::attach(shell_port), process_port, None).unwrap_err();
		assert!(matches!(error, Error::AlreadyRunning(_)));
	}

	#[tokio::test]
	async fn tiled_views_hold_index_and_no_z() {
		let (_runtime, _events, manager) = fixture(grid_2x2());
		let a = create(&manager, &manifest("app.a", ""));
		let b = create(&manager, &manifest("app.b", ""));

		let record_a = manager.view_record(a).unwrap();
		let record_b = manager.view_record(b).unwrap();
		assert_eq!(record_a.mode, ViewMode::Tiled);
		assert_eq!(record_a.tile_index, Some(0));
		assert_eq!(record_a.z_index, None);
		assert_eq!(record_b.tile_index, Some(1));
		// two tiles split the workspace horizontally in a 2x2 grid
		assert_eq!(record_a.bounds, Rect::new(0.0, 0.0, 500.0, 600.0));
		assert_eq!(record_b.bounds, Rect::new(500.0, 0.0, 500.0, 600.0));
	}

	#[tokio::test]
	async fn capacity_evicts_least_recently_focused() {
		let (_runtime, _events, manager) = fixture(grid_2x2());
		let ids: Vec<ViewId> = ["app.a", "app.b", "app.c", "app.d", "app.e"]
			.iter()
			.map(|id| create(&manager, &manifest(id, "")))
			.collect();
		for id in &ids {
			manager.focus_view(*id).unwrap();
		}

		// app.a was focused least recently and is not the preferred target
		let record_a = manager.view_record(ids[0]).unwrap();
		assert!(!record_a.visible);
		assert_eq!(record_a.tile_index, None);
		for id in &ids[1..] {
			assert!(manager.view_record(*id).unwrap().visible);
		}

		// floating app.b vacates a slot; app.a takes its tile position
		manager.toggle_mode(ids[1], Some(ViewMode::Floating)).unwrap();
		let record_a = manager.view_record(ids[0]).unwrap();
		assert!(record_a.visible);
		assert_eq!(record_a.tile_index, Some(0));
		let record_b = manager.view_record(ids[1]).unwrap();
		assert_eq!(record_b.mode, ViewMode::Floating);
		assert!(record_b.z_index.is_some());
		assert_eq!(record_b.tile_index, None);
	}

	#[tokio::test]
	async fn focusing_an_evicted_tile_brings_it_back() {
		let (_runtime, _events, manager) = fixture(TilingConfig {
			mode: TilingMode::Horizontal,
			columns: Some(2),
			gap: 0.0,
			padding: 0.0,
			rows: None
		});
		let a = create(&manager, &manifest("app.a", ""));
		let b = create(&manager, &manifest("app.b", ""));
		let c = create(&manager, &manifest("app.c", ""));
		manager.focus_view(b).unwrap();
		manager.focus_view(c).unwrap();
		assert!(!manager.view_record(a).unwrap().visible);

		manager.focus_view(a).unwrap();
		assert!(manager.view_record(a).unwrap().visible);
		// now the least recently focused of the others is hidden
		assert!(!manager.view_record(b).unwrap().visible);
	}

	#[tokio::test]
	async fn stacking_order_tiles_floats_overlays() {
		let (runtime, _events, manager) = fixture(grid_2x2());
		let tile = create(&manager, &manifest("app.tile", ""));
		let float = create(&manager, &manifest("app.float", r#", "window": { "mode": "floating" }"#));
		let overlay = create(&manager, &manifest("app.dock", r#", "overlay": true"#));

		let overlay_record = manager.view_record(overlay).unwrap();
		assert!(overlay_record.z_index.unwrap() > OVERLAY_Z_BASE);
		let float_record = manager.view_record(float).unwrap();
		assert!(float_record.z_index.unwrap() < OVERLAY_Z_BASE);

		assert_eq!(runtime.stacking(), vec![tile, float, overlay]);

		// focusing the tile must not lift it above the float
		manager.focus_view(tile).unwrap();
		assert_eq!(runtime.stacking(), vec![tile, float, overlay]);
	}

	#[tokio::test]
	async fn float_placement_cascades_and_clamps() {
		let (_runtime, _events, manager) = fixture(TilingConfig {
			mode: TilingMode::None,
			..Default::default()
		});
		let first = create(&manager, &manifest("app.one", r#", "window": { "defaultSize": { "width": 400, "height": 300 } }"#));
		let second = create(&manager, &manifest("app.two", r#", "window": { "defaultSize": { "width": 400, "height": 300 } }"#));

		let bounds_first = manager.view_record(first).unwrap().bounds;
		let bounds_second = manager.view_record(second).unwrap().bounds;
		assert_eq!(bounds_first, Rect::new(300.0, 150.0, 400.0, 300.0));
		assert_eq!(bounds_second, Rect::new(330.0, 180.0, 400.0, 300.0));

		// drag far off-screen: at least 100px must remain inside
		manager.update_bounds(first, Rect::new(5000.0, -50.0, 400.0, 300.0)).unwrap();
		let clamped = manager.view_record(first).unwrap().bounds;
		assert_eq!(clamped.x, 900.0);
		assert_eq!(clamped.y, 0.0);
	}

	#[tokio::test]
	async fn tiled_bounds_updates_are_ignored() {
		let (_runtime, _events, manager) = fixture(grid_2x2());
		let tile = create(&manager, &manifest("app.tile", ""));
		let before = manager.view_record(tile).unwrap().bounds;
		manager.update_bounds(tile, Rect::new(1.0, 2.0, 3.0, 4.0)).unwrap();
		assert_eq!(manager.view_record(tile).unwrap().bounds, before);
	}

	#[tokio::test]
	async fn mode_gate_follows_manifest() {
		let (_runtime, _events, manager) = fixture(grid_2x2());
		let pinned = create(&manager, &manifest("app.pinned", r#", "window": { "mode": "tiled" }"#));
		assert!(matches!(
			manager.toggle_mode(pinned, Some(ViewMode::Floating)),
			Err(Error::UnsupportedMode { .. })
		));

		let overlay = create(&manager, &manifest("app.dock", r#", "overlay": true"#));
		assert!(matches!(manager.toggle_mode(overlay, None), Err(Error::UnsupportedMode { .. })));
	}

	#[tokio::test]
	async fn zoom_skips_manual_scaling_and_overlays() {
		let (runtime, _events, manager) = fixture(TilingConfig {
			mode: TilingMode::None,
			..Default::default()
		});
		let auto = create(&manager, &manifest("app.auto", ""));
		let manual = create(&manager, &manifest("app.manual", r#", "window": { "scaling": "manual" }"#));
		let overlay = create(&manager, &manifest("app.dock", r#", "overlay": true"#));

		manager.set_zoom(1.5);
		assert_eq!(runtime.view(auto).unwrap().zoom(), 1.5);
		assert_eq!(runtime.view(manual).unwrap().zoom(), 1.0);
		assert_eq!(runtime.view(overlay).unwrap().zoom(), 1.0);

		// out-of-range factors are clamped
		manager.set_zoom(5.0);
		assert_eq!(manager.zoom(), 2.0);
	}

	#[tokio::test]
	async fn drag_updates_only_while_pressed() {
		let (runtime, _events, manager) = fixture(TilingConfig {
			mode: TilingMode::None,
			..Default::default()
		});
		let float = create(&manager, &manifest("app.float", r#", "window": { "defaultSize": { "width": 400, "height": 300 } }"#));
		let start = manager.view_record(float).unwrap().bounds;

		runtime.set_cursor(Position::new(500.0, 300.0));
		runtime.set_mouse_pressed(true);
		manager.begin_drag(float).unwrap();

		runtime.set_cursor(Position::new(520.0, 310.0));
		tokio::time::sleep(std::time::Duration::from_millis(40)).await;
		let dragged = manager.view_record(float).unwrap().bounds;
		assert_eq!(dragged.x, start.x + 20.0);
		assert_eq!(dragged.y, start.y + 10.0);

		// global mouse-up ends the gesture and stops the tracker
		runtime.set_mouse_pressed(false);
		tokio::time::sleep(std::time::Duration::from_millis(40)).await;
		runtime.set_cursor(Position::new(900.0, 500.0));
		tokio::time::sleep(std::time::Duration::from_millis(40)).await;
		assert_eq!(manager.view_record(float).unwrap().bounds, dragged);
	}
}
