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

//! The event subjects emitted by the core.

/// An app finished launching.
pub const PROCESS_LAUNCHED: &str = "process/launched";
/// An app was stopped.
pub const PROCESS_STOPPED: &str = "process/stopped";
/// An app's worker exited unexpectedly.
pub const PROCESS_EXITED: &str = "process/exited";
/// A view finished loading its frontend.
pub const VIEW_LOADED: &str = "view/view-loaded";
/// A view failed to load its frontend.
pub const VIEW_LOAD_FAILED: &str = "view/view-load-failed";
/// A view switched between tiled and floating.
pub const VIEW_MODE_CHANGED: &str = "view/mode-changed";
/// A view's bounds changed.
pub const VIEW_BOUNDS_UPDATED: &str = "view/bounds-updated";
/// The workspace rectangle changed.
pub const VIEW_GLOBAL_BOUNDS_CHANGED: &str = "view/global-bounds-changed";
/// The current user changed.
pub const USER_CHANGED: &str = "user/changed";
/// A setting was written or deleted.
pub const SETTINGS_CHANGED: &str = "settings/changed";
/// A package was installed.
pub const PACKAGE_INSTALLED: &str = "package/installed";
/// A package was uninstalled.
pub const PACKAGE_UNINSTALLED: &str = "package/uninstalled";
/// A notification was posted.
pub const NOTIFICATION_ADDED: &str = "notification/added";
/// The shell locale changed.
pub const LOCALE_CHANGED: &str = "i18n/locale-changed";
/// The wallpaper changed.
pub const WALLPAPER_CHANGED: &str = "appearance/wallpaper-changed";
/// A context menu opened.
pub const CONTEXT_MENU_OPENED: &str = "context-menu/opened";
/// A context menu closed.
pub const CONTEXT_MENU_CLOSED: &str = "context-menu/closed";
