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

//! Workspace geometry primitives shared between the view manager and the
//! runtime layer.

use serde::{Deserialize, Serialize};

/// A position in workspace coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
	/// Horizontal offset from the workspace origin.
	pub x: f64,
	/// Vertical offset from the workspace origin.
	pub y: f64
}

impl Position {
	/// Creates a new position.
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// A two-dimensional size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
	/// Width in workspace units.
	pub width: f64,
	/// Height in workspace units.
	pub height: f64
}

impl Size {
	/// Creates a new size.
	pub const fn new(width: f64, height: f64) -> Self {
		Self { width, height }
	}
}

impl Default for Size {
	fn default() -> Self {
		Self { width: 800.0, height: 600.0 }
	}
}

/// An axis-aligned rectangle in workspace coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
	/// Horizontal offset of the top-left corner.
	pub x: f64,
	/// Vertical offset of the top-left corner.
	pub y: f64,
	/// Rectangle width.
	pub width: f64,
	/// Rectangle height.
	pub height: f64
}

impl Rect {
	/// Creates a new rectangle.
	pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
		Self { x, y, width, height }
	}

	/// The position of the top-left corner.
	pub const fn position(&self) -> Position {
		Position::new(self.x, self.y)
	}

	/// The size of the rectangle.
	pub const fn size(&self) -> Size {
		Size::new(self.width, self.height)
	}

	/// Whether the given position lies within the rectangle.
	pub fn contains(&self, position: Position) -> bool {
		position.x >= self.x && position.x < self.x + self.width && position.y >= self.y && position.y < self.y + self.height
	}
}

#[cfg(test)]
mod tests {
	use super::{Position, Rect};

	#[test]
	fn rect_contains_is_half_open() {
		let rect = Rect::new(10.0, 10.0, 100.0, 50.0);
		assert!(rect.contains(Position::new(10.0, 10.0)));
		assert!(rect.contains(Position::new(109.0, 59.0)));
		assert!(!rect.contains(Position::new(110.0, 10.0)));
		assert!(!rect.contains(Position::new(10.0, 60.0)));
	}
}
