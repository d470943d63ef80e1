//! # Occupancy grid mapping library.
//!
//! Fuses raw and obstacle point clouds into a rolling, vehicle-centred probabilistic occupancy
//! grid. The executable and other crates in the workspace access the engine through this
//! library.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Engine parameters - grid geometry and the Bayesian updater sub-file
pub mod params;

/// Localisation interface - poses and the transform lookup used at the start of each cycle
pub mod loc;

/// Map module - the log-odds grid and its snapshots
pub mod map;

/// Ray projection - converts points into per-cell hit/miss evidence
pub mod ray;

/// Occlusion handling - cells hidden behind obstacles and joins between nearby obstacle points
pub mod occlusion;

/// Bayesian log-odds updater and cell classification
pub mod updater;

/// Fusion engine - the per-cycle state machine merging both clouds into the grid
pub mod fusion;

/// Publisher adapter - converts snapshots into the occupancy grid wire format
pub mod publisher;

/// Worker thread running one engine per grid
pub mod worker;

/// Recorded input data for offline replay
pub mod replay;
