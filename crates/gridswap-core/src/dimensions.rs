//! World-space metadata for a grid: cell size and bounding box.
//!
//! Row 0 sits at the top of the bounding box (`y_max`), matching the usual
//! raster convention.

use serde::{Deserialize, Serialize};

/// Cell size and bounding box of a grid in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDimensions {
    /// Edge length of one square cell in world units.
    pub cell_size: f64,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl GridDimensions {
    pub fn new(cell_size: f64, x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            cell_size,
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Unit-cell dimensions anchored at the origin for a grid of the given size.
    pub fn unit(n_rows: u64, n_cols: u64) -> Self {
        Self {
            cell_size: 1.0,
            x_min: 0.0,
            y_min: 0.0,
            x_max: n_cols as f64,
            y_max: n_rows as f64,
        }
    }

    /// Width of the bounding box in world units.
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Height of the bounding box in world units.
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Dimensions of the rectangular sub-region starting at (start_row,
    /// start_col) and spanning n_rows x n_cols cells.
    pub fn sub_region(&self, start_row: u64, start_col: u64, n_rows: u64, n_cols: u64) -> Self {
        let x_min = self.x_min + start_col as f64 * self.cell_size;
        let y_max = self.y_max - start_row as f64 * self.cell_size;
        Self {
            cell_size: self.cell_size,
            x_min,
            y_min: y_max - n_rows as f64 * self.cell_size,
            x_max: x_min + n_cols as f64 * self.cell_size,
            y_max,
        }
    }
}
