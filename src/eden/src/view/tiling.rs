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

//! Tile layout math.

use eden_utils::Rect;
use serde::{Deserialize, Serialize};

/// How tiled views are arranged in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TilingMode {
	/// Every tiled view fills the workspace.
	None,
	/// A single row of columns.
	Horizontal,
	/// A single column of rows.
	Vertical,
	/// A fixed grid.
	Grid
}

impl Default for TilingMode {
	fn default() -> Self {
		Self::Horizontal
	}
}

/// The tile layout configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TilingConfig {
	/// The arrangement of tiles.
	pub mode: TilingMode,
	/// Space between adjacent tiles.
	pub gap: f64,
	/// Space between the workspace edge and the outermost tiles.
	pub padding: f64,
	/// Column count; bounds capacity for horizontal and grid layouts.
	pub columns: Option<usize>,
	/// Row count; bounds capacity for vertical and grid layouts.
	pub rows: Option<usize>
}

impl Default for TilingConfig {
	fn default() -> Self {
		Self {
			mode: TilingMode::default(),
			gap: 8.0,
			padding: 8.0,
			columns: None,
			rows: None
		}
	}
}

impl TilingConfig {
	/// The number of tiled views that can be visible at once; `None` is
	/// unbounded.
	pub fn capacity(&self) -> Option<usize> {
		match self.mode {
			TilingMode::None => None,
			TilingMode::Horizontal => self.columns,
			TilingMode::Vertical => self.rows,
			TilingMode::Grid => match (self.columns, self.rows) {
				(Some(columns), Some(rows)) => Some(columns * rows),
				_ => None
			}
		}
	}

	/// The bounds of the tile at `index` when `visible_count` tiles share
	/// the workspace.
	pub fn tile_bounds(&self, index: usize, visible_count: usize, workspace: Rect) -> Rect {
		let count = visible_count.max(1) as f64;
		let inner = Rect::new(
			workspace.x + self.padding,
			workspace.y + self.padding,
			(workspace.width - 2.0 * self.padding).max(0.0),
			(workspace.height - 2.0 * self.padding).max(0.0)
		);

		match self.mode {
			TilingMode::None => inner,
			TilingMode::Horizontal => {
				let width = (inner.width - self.gap * (count - 1.0)) / count;
				Rect::new(inner.x + index as f64 * (width + self.gap), inner.y, width.max(0.0), inner.height)
			}
			TilingMode::Vertical => {
				let height = (inner.height - self.gap * (count - 1.0)) / count;
				Rect::new(inner.x, inner.y + index as f64 * (height + self.gap), inner.width, height.max(0.0))
			}
			TilingMode::Grid => {
				let columns = match (self.columns, self.rows) {
					(Some(columns), _) => columns,
					(None, Some(rows)) => (visible_count.max(1) + rows - 1) / rows,
					(None, None) => (count.sqrt().ceil() as usize).max(1)
				}
				.max(1);
				let rows = (visible_count.max(1) + columns - 1) / columns;
				let width = (inner.width - self.gap * (columns as f64 - 1.0)) / columns as f64;
				let height = (inner.height - self.gap * (rows as f64 - 1.0)) / rows as f64;
				let column = index % columns;
				let row = index / columns;
				Rect::new(
					inner.x + column as f64 * (width + self.gap),
					inner.y + row as f64 * (height + self.gap),
					width.max(0.0),
					height.max(0.0)
				)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use eden_utils::Rect;

	use super::{TilingConfig, TilingMode};

	fn workspace() -> Rect {
		Rect::new(0.0, 0.0, 1000.0, 600.0)
	}

	#[test]
	fn capacity_rules() {
		let config = TilingConfig {
			mode: TilingMode::Grid,
			columns: Some(2),
			rows: Some(2),
			..Default::default()
		};
		assert_eq!(config.capacity(), Some(4));

		let config = TilingConfig {
			mode: TilingMode::Horizontal,
			columns: Some(3),
			..Default::default()
		};
		assert_eq!(config.capacity(), Some(3));

		let config = TilingConfig {
			mode: TilingMode::Vertical,
			rows: None,
			..Default::default()
		};
		assert_eq!(config.capacity(), None);

		assert_eq!(TilingConfig { mode: TilingMode::None, ..Default::default() }.capacity(), None);
	}

	#[test]
	fn horizontal_split() {
		let config = TilingConfig {
			mode: TilingMode::Horizontal,
			gap: 10.0,
			padding: 0.0,
			..Default::default()
		};
		let left = config.tile_bounds(0, 2, workspace());
		let right = config.tile_bounds(1, 2, workspace());
		assert_eq!(left, Rect::new(0.0, 0.0, 495.0, 600.0));
		assert_eq!(right, Rect::new(505.0, 0.0, 495.0, 600.0));
	}

	#[test]
	fn grid_cells_walk_left_to_right_top_to_bottom() {
		let config = TilingConfig {
			mode: TilingMode::Grid,
			gap: 0.0,
			padding: 0.0,
			columns: Some(2),
			rows: Some(2),
			..Default::default()
		};
		assert_eq!(config.tile_bounds(0, 4, workspace()), Rect::new(0.0, 0.0, 500.0, 300.0));
		assert_eq!(config.tile_bounds(1, 4, workspace()), Rect::new(500.0, 0.0, 500.0, 300.0));
		assert_eq!(config.tile_bounds(2, 4, workspace()), Rect::new(0.0, 300.0, 500.0, 300.0));
		assert_eq!(config.tile_bounds(3, 4, workspace()), Rect::new(500.0, 300.0, 500.0, 300.0));
	}

	#[test]
	fn padding_shrinks_the_inner_rect() {
		let config = TilingConfig {
			mode: TilingMode::None,
			padding: 20.0,
			..Default::default()
		};
		assert_eq!(config.tile_bounds(0, 1, workspace()), Rect::new(20.0, 20.0, 960.0, 560.0));
	}
}
