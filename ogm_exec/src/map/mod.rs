//! # Map
//!
//! This module implements the [`OccupancyGrid`], a rolling log-odds grid which follows the
//! vehicle, and [`GridSnapshot`], the immutable copy of it handed out at the end of each cycle.

// ------------------------------------------------------------------------------------------------
// MODS
// ------------------------------------------------------------------------------------------------

/// Implements the [`OccupancyGrid`] type
mod grid;

/// Implements the [`GridSnapshot`] type
mod snapshot;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use grid::{CellIdx, GridError, OccupancyGrid};
pub use snapshot::GridSnapshot;
