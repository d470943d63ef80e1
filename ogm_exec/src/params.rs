//! # Engine parameters
//!
//! Parameters are split across two files, as the updater parameters are shared between engines
//! with different geometry. The geometry file names the updater file through
//! `updater_param_file`, which is resolved the same way as any other parameter file.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::params::{load as load_params, LoadError};

use crate::publisher::PublishMode;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Complete set of parameters for one engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OgmParams {
    pub grid: GridParams,
    pub updater: UpdaterParams,
}

/// Grid geometry and cycle parameters, loaded from the main parameter file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridParams {
    /// Edge length of a cell
    pub resolution_m: f64,

    /// Number of cells along the grid X axis
    pub width_cells: usize,

    /// Number of cells along the grid Y axis
    pub height_cells: usize,

    /// Planar distance the vehicle may travel from the last recentre point before the grid is
    /// recentred on it again
    pub recenter_margin_m: f64,

    /// Points further than this from the sensor are truncated to this range and contribute only
    /// free space
    pub max_range_m: f64,

    /// Centre of the grid before the first recentre
    #[serde(default = "default_centre")]
    pub initial_centre_m: Vector2<f64>,

    /// Points with a sensor-frame Z below this are discarded
    #[serde(default)]
    pub min_height_m: Option<f64>,

    /// Points with a sensor-frame Z above this are discarded
    #[serde(default)]
    pub max_height_m: Option<f64>,

    /// Frame the grid and its snapshots are expressed in
    #[serde(default = "default_grid_frame")]
    pub grid_frame_id: String,

    /// How snapshots are encoded for publishing
    #[serde(default)]
    pub publish_mode: PublishMode,

    /// Treat space behind obstacle points as unobserved, `None` disables it
    #[serde(default)]
    pub occlusion: Option<OcclusionParams>,

    /// Path to the updater parameter file
    pub updater_param_file: String,
}

/// Log-odds updater parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterParams {
    /// Increment applied on a hit
    pub l_occ: f64,

    /// Decrement applied on a miss
    pub l_free: f64,

    /// Lower clamp on a cell's log-odds
    pub l_min: f64,

    /// Upper clamp on a cell's log-odds
    pub l_max: f64,

    /// Cells at or below this are free
    pub t_free: f64,

    /// Cells at or above this are occupied
    pub t_occ: f64,

    /// Per-cycle step towards the unknown prior for cells with no evidence, `None` disables decay
    #[serde(default)]
    pub decay_rate: Option<f64>,
}

/// Occlusion handling parameters.
///
/// Points from both clouds are grouped into bearing bins around the raw sensor and ordered by
/// range within each bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcclusionParams {
    /// Obstacle points closer than this along one bearing are joined into a single obstacle, and
    /// raw returns closer than this behind an obstacle don't reveal the space behind it
    pub distance_margin_m: f64,

    /// Width of a bearing bin
    #[serde(default = "default_angle_increment")]
    pub angle_increment_rad: f64,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Couldn't load parameters: {0}")]
    LoadError(#[from] LoadError),

    #[error("Grid resolution must be positive, got {0}")]
    NonPositiveResolution(f64),

    #[error("Grid must have at least one cell along each axis, got {0}x{1}")]
    EmptyGrid(usize, usize),

    #[error("Maximum ray range must be positive, got {0}")]
    NonPositiveMaxRange(f64),

    #[error("Recentre margin must not be negative, got {0}")]
    NegativeRecenterMargin(f64),

    #[error("Minimum height ({0}) is above maximum height ({1})")]
    InvertedHeightLimits(f64, f64),

    #[error("Hit and miss increments must be positive, got l_occ = {0}, l_free = {1}")]
    NonPositiveIncrement(f64, f64),

    #[error("Log-odds clamp [{0}, {1}] must be non-empty and contain the unknown prior 0")]
    InvalidClamp(f64, f64),

    #[error(
        "Thresholds must satisfy l_min <= t_free < t_occ <= l_max, got t_free = {t_free}, \
        t_occ = {t_occ} with clamp [{l_min}, {l_max}]"
    )]
    InvalidThresholds {
        t_free: f64,
        t_occ: f64,
        l_min: f64,
        l_max: f64,
    },

    #[error("Decay rate must not be negative, got {0}")]
    NegativeDecayRate(f64),

    #[error("Updater parameter {0} must be finite, got {1}")]
    NonFiniteParam(&'static str, f64),

    #[error(
        "Occlusion distance margin must be finite and not negative, and the bearing bin width \
        positive, got margin = {0}, bin width = {1}"
    )]
    InvalidOcclusion(f64, f64),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl OgmParams {
    /// Load the engine parameters from the given file, followed by the updater file it names.
    ///
    /// The loaded parameters are validated before being returned.
    pub fn load(param_file: &str) -> Result<Self, ConfigError> {
        let grid: GridParams = load_params(param_file)?;
        let updater: UpdaterParams = load_params(&grid.updater_param_file)?;

        let params = Self { grid, updater };
        params.validate()?;

        Ok(params)
    }

    /// Check every parameter invariant, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.updater.validate()
    }
}

impl GridParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Written as negated comparisons so that NaN fails each check
        if !(self.resolution_m > 0.0) || !self.resolution_m.is_finite() {
            return Err(ConfigError::NonPositiveResolution(self.resolution_m));
        }

        if self.width_cells == 0 || self.height_cells == 0 {
            return Err(ConfigError::EmptyGrid(self.width_cells, self.height_cells));
        }

        if !(self.max_range_m > 0.0) {
            return Err(ConfigError::NonPositiveMaxRange(self.max_range_m));
        }

        if !(self.recenter_margin_m >= 0.0) {
            return Err(ConfigError::NegativeRecenterMargin(self.recenter_margin_m));
        }

        if let (Some(min), Some(max)) = (self.min_height_m, self.max_height_m) {
            if !(min <= max) {
                return Err(ConfigError::InvertedHeightLimits(min, max));
            }
        }

        if let Some(ref occ) = self.occlusion {
            let margin_ok = occ.distance_margin_m >= 0.0 && occ.distance_margin_m.is_finite();
            let bin_ok = occ.angle_increment_rad > 0.0 && occ.angle_increment_rad.is_finite();

            if !margin_ok || !bin_ok {
                return Err(ConfigError::InvalidOcclusion(
                    occ.distance_margin_m,
                    occ.angle_increment_rad,
                ));
            }
        }

        Ok(())
    }
}

impl UpdaterParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // An infinite increment or clamp would let `inf - inf` put NaN into a cell
        let values = [
            ("l_occ", self.l_occ),
            ("l_free", self.l_free),
            ("l_min", self.l_min),
            ("l_max", self.l_max),
            ("t_free", self.t_free),
            ("t_occ", self.t_occ),
            ("decay_rate", self.decay_rate.unwrap_or(0.0)),
        ];
        if let Some(&(name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::NonFiniteParam(name, value));
        }

        if !(self.l_occ > 0.0) || !(self.l_free > 0.0) {
            return Err(ConfigError::NonPositiveIncrement(self.l_occ, self.l_free));
        }

        if !(self.l_min < self.l_max) || !(self.l_min <= 0.0) || !(self.l_max >= 0.0) {
            return Err(ConfigError::InvalidClamp(self.l_min, self.l_max));
        }

        if !(self.l_min <= self.t_free && self.t_free < self.t_occ && self.t_occ <= self.l_max) {
            return Err(ConfigError::InvalidThresholds {
                t_free: self.t_free,
                t_occ: self.t_occ,
                l_min: self.l_min,
                l_max: self.l_max,
            });
        }

        if let Some(rate) = self.decay_rate {
            if !(rate >= 0.0) {
                return Err(ConfigError::NegativeDecayRate(rate));
            }
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn default_centre() -> Vector2<f64> {
    Vector2::zeros()
}

fn default_grid_frame() -> String {
    String::from("map")
}

/// 0.1 degrees
fn default_angle_increment() -> f64 {
    0.1f64.to_radians()
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
