//! Immutable copies of the grid produced at the end of each cycle.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An owned copy of the grid at the end of a cycle.
///
/// Snapshots share nothing with the engine's grid, so they can be handed to publishers and other
/// threads freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Timestamp of the cycle which produced the snapshot
    pub timestamp: DateTime<Utc>,

    /// Frame the grid is expressed in
    pub frame_id: String,

    /// The edge length of each cell in meters
    pub resolution_m: f64,

    /// Number of cells along X
    pub width: usize,

    /// Number of cells along Y
    pub height: usize,

    /// Position of the lower corner of cell (0, 0)
    pub origin_m: Vector2<f64>,

    /// Row-major log-odds, cell (x, y) is at `y * width + x`
    pub log_odds: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GridSnapshot {
    /// Log-odds of the cell at (x, y), or `None` if the cell is outside the snapshot.
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }

        self.log_odds.get(y * self.width + x).copied()
    }

    /// Number of cells the snapshot's dimensions describe.
    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    /// Whether the data length matches the dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.log_odds.len() == self.num_cells()
    }
}
