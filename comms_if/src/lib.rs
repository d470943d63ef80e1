//! # Communications interface crate.
//!
//! Provides the interface types exchanged between the occupancy grid engine and its producers
//! and consumers.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Data produced by sensing equipment (point clouds)
pub mod eqpt;

/// Map messages published by the engine
pub mod map;
