//! # Grid publisher adapter
//!
//! Converts [`GridSnapshot`]s into the [`OccupancyGridMsg`] wire format.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::convert::TryFrom;

use comms_if::map::{MapMetaData, OccupancyGridMsg, FREE, OCCUPIED, UNKNOWN};
use serde::{Deserialize, Serialize};
use util::maths::lin_map;

use crate::{
    map::GridSnapshot,
    params::UpdaterParams,
    updater::{BayesUpdater, CellState},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GridPublisher {
    mode: PublishMode,
    updater: BayesUpdater,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How cell log-odds are encoded in published grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishMode {
    /// Occupied cells are 100, free cells 0 and unknown cells -1
    TriState,

    /// Every cell is its occupancy probability in percent
    Probability,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishError {
    #[error("Snapshot has {found} cells but its dimensions describe {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("Snapshot dimensions {0}x{1} don't fit the message format")]
    TooLarge(usize, usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for PublishMode {
    fn default() -> Self {
        PublishMode::TriState
    }
}

impl GridPublisher {
    pub fn new(mode: PublishMode, params: &UpdaterParams) -> Self {
        Self {
            mode,
            updater: BayesUpdater::new(params.clone()),
        }
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Convert a snapshot into a message.
    ///
    /// # Panics
    /// In debug builds, if the snapshot's data doesn't match its dimensions. Release builds
    /// return [`PublishError::ShapeMismatch`] instead.
    pub fn to_msg(&self, snapshot: &GridSnapshot) -> Result<OccupancyGridMsg, PublishError> {
        debug_assert!(
            snapshot.is_well_formed(),
            "Malformed snapshot: {} cells for a {}x{} grid",
            snapshot.log_odds.len(),
            snapshot.width,
            snapshot.height
        );

        if !snapshot.is_well_formed() {
            return Err(PublishError::ShapeMismatch {
                expected: snapshot.num_cells(),
                found: snapshot.log_odds.len(),
            });
        }

        let too_large = || PublishError::TooLarge(snapshot.width, snapshot.height);
        let width = u32::try_from(snapshot.width).map_err(|_| too_large())?;
        let height = u32::try_from(snapshot.height).map_err(|_| too_large())?;

        let data = snapshot
            .log_odds
            .iter()
            .map(|&v| self.encode(v))
            .collect();

        Ok(OccupancyGridMsg {
            timestamp: snapshot.timestamp,
            frame_id: snapshot.frame_id.clone(),
            info: MapMetaData {
                resolution_m: snapshot.resolution_m,
                width,
                height,
                origin_m: snapshot.origin_m,
            },
            data,
        })
    }

    fn encode(&self, log_odds: f64) -> i8 {
        match self.mode {
            PublishMode::TriState => match self.updater.classify(log_odds) {
                CellState::Occupied => OCCUPIED,
                CellState::Free => FREE,
                CellState::Unknown => UNKNOWN,
            },
            PublishMode::Probability => {
                let p = BayesUpdater::probability(log_odds);
                lin_map((0.0, 1.0), (FREE as f64, OCCUPIED as f64), p).round() as i8
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
