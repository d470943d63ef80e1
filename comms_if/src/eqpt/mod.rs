//! # Equipment Interface
//!
//! This module defines the interface structures produced by sensing equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod lidar;
