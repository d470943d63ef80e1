//! # Fusion engine
//!
//! The engine owns the grid and folds one raw cloud and one obstacle cloud into it each cycle.
//! A cycle runs through the phases
//!
//! ```text
//! Idle -> Transforming -> Projecting -> Updating -> [Recentering] -> Snapshotting -> Idle
//! ```
//!
//! A failed pose lookup ends the cycle during `Transforming` without touching the grid. Once
//! `Updating` begins the cycle always runs through to `Snapshotting`.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod state;

pub use state::OgmEngine;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use comms_if::eqpt::lidar::PointCloud;
use serde::{Deserialize, Serialize};

use crate::{
    loc::LookupError,
    map::{GridError, GridSnapshot},
    params::ConfigError,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The clouds processed in one cycle.
#[derive(Debug, Clone)]
pub struct CycleInput {
    /// Unfiltered cloud, contributing free space and hits
    pub raw: PointCloud,

    /// Cloud containing only obstacle points, whose hits override raw misses
    pub obstacle: PointCloud,
}

/// Summary of a single cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    /// Index of the cycle since the engine was created
    pub cycle: u64,

    /// Last phase the cycle entered
    pub phase_reached: CyclePhase,

    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub cancelled: bool,

    /// Points received in each cloud
    pub num_raw_points: usize,
    pub num_obstacle_points: usize,

    /// Points excluded for being non-finite or outside the height limits
    pub num_filtered_points: usize,

    /// Points which were passed to the ray projector
    pub num_projected_points: usize,

    /// Evidence applied to the grid
    pub num_hits: usize,
    pub num_misses: usize,

    /// Raw misses discarded because an obstacle hit the same cell
    pub num_suppressed_misses: usize,

    /// Raw misses discarded because the cell is hidden behind an obstacle
    pub num_hidden_misses: usize,

    /// Cells hit to join obstacle points lying close together
    pub num_filled_cells: usize,

    /// Cells moved towards the prior by decay
    pub num_decayed_cells: usize,

    pub recentered: bool,

    /// Extremes of the grid's log-odds after the cycle
    pub min_log_odds: f64,
    pub max_log_odds: f64,
}

/// Shareable flag which abandons the engine's current or next cycle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of a single cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The grid was updated and a snapshot taken
    Published(GridSnapshot),

    /// A pose couldn't be found for one of the clouds, the grid is unchanged
    Skipped(LookupError),

    /// The cycle was cancelled before the grid was modified
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    Idle,
    Transforming,
    Projecting,
    Updating,
    Recentering,
    Snapshotting,
}

/// Which cloud a point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceSource {
    Raw,
    Obstacle,
}

#[derive(Debug, thiserror::Error)]
pub enum OgmError {
    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Grid error: {0}")]
    GridError(#[from] GridError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CyclePhase {
    fn default() -> Self {
        CyclePhase::Idle
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl CycleOutcome {
    /// The snapshot, if the cycle produced one.
    pub fn snapshot(&self) -> Option<&GridSnapshot> {
        match self {
            CycleOutcome::Published(s) => Some(s),
            _ => None,
        }
    }
}
