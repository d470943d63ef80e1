//! # Map Messages
//!
//! The occupancy grid wire format published by the engine. Cell values follow the usual
//! occupancy grid convention: `0` is free, `100` is occupied, values in between are occupancy
//! probabilities in percent and `-1` is unknown.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Cell value for a free cell
pub const FREE: i8 = 0;

/// Cell value for an occupied cell
pub const OCCUPIED: i8 = 100;

/// Cell value for a cell with no information
pub const UNKNOWN: i8 = -1;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Geometry of a published grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMetaData {
    /// Edge length of each cell in meters per cell
    pub resolution_m: f64,

    /// Number of cells along the x axis
    pub width: u32,

    /// Number of cells along the y axis
    pub height: u32,

    /// Position of the lower corner of cell (0, 0) in the grid frame
    pub origin_m: Vector2<f64>,
}

/// An occupancy grid snapshot as sent to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGridMsg {
    /// Timestamp of the cycle which produced the snapshot
    pub timestamp: DateTime<Utc>,

    /// Name of the frame the grid is anchored in
    pub frame_id: String,

    pub info: MapMetaData,

    /// Row-major cell values, index `y * width + x`
    pub data: Vec<i8>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OccupancyGridMsg {
    /// Get the value of the cell at `(x, y)`, or `None` if outside the grid.
    pub fn cell(&self, x: u32, y: u32) -> Option<i8> {
        if x >= self.info.width || y >= self.info.height {
            return None;
        }

        self.data
            .get(y as usize * self.info.width as usize + x as usize)
            .copied()
    }
}
