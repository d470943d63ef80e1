//! Implementations for the OgmEngine state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use comms_if::eqpt::lidar::PointCloud;
use log::{debug, info, trace, warn};
use nalgebra::{Vector2, Vector3};

// Internal
use super::{
    CancelToken, CycleInput, CycleOutcome, CyclePhase, EvidenceSource, OgmError, StatusReport,
};
use crate::{
    loc::{LookupError, Pose, TransformSource},
    map::{CellIdx, GridError, GridSnapshot, OccupancyGrid},
    occlusion::Occlusion,
    params::OgmParams,
    ray::{Evidence, RayProjector, RayStep},
    updater::BayesUpdater,
};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    convert::Convert,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Occupancy grid mapping engine, the single owner and writer of one grid.
pub struct OgmEngine {
    params: OgmParams,

    grid: OccupancyGrid,
    projector: RayProjector,
    updater: BayesUpdater,

    transforms: Box<dyn TransformSource + Send>,

    phase: CyclePhase,
    cancel: CancelToken,

    /// Vehicle position when the grid was last recentred
    last_recenter_m: Vector2<f64>,

    num_cycles: u64,

    report: StatusReport,
    arch_report: Archiver,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OgmEngine {
    /// Create a new engine, refusing invalid parameters.
    pub fn new(
        params: OgmParams,
        transforms: Box<dyn TransformSource + Send>,
    ) -> Result<Self, OgmError> {
        params.validate()?;

        let grid = OccupancyGrid::from_params(&params.grid)?;

        info!(
            "OGM engine initialised: {}x{} cells at {} m, centred on ({:.2}, {:.2}) in \"{}\"",
            grid.width(),
            grid.height(),
            grid.resolution(),
            params.grid.initial_centre_m.x,
            params.grid.initial_centre_m.y,
            params.grid.grid_frame_id
        );

        Ok(Self {
            projector: RayProjector::new(params.grid.max_range_m),
            updater: BayesUpdater::new(params.updater.clone()),
            last_recenter_m: params.grid.initial_centre_m,
            grid,
            params,
            transforms,
            phase: CyclePhase::Idle,
            cancel: CancelToken::new(),
            num_cycles: 0,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        })
    }

    /// Use the given token for cancellation rather than the engine's own, for example to cancel
    /// several engines at once.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Start archiving status reports into the session.
    pub fn init_archive(&mut self, session: &Session) -> Result<(), ArchiveError> {
        self.arch_report = Archiver::from_path(session, "ogm/status_report.csv")?;
        Ok(())
    }

    pub fn params(&self) -> &OgmParams {
        &self.params
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn num_cycles(&self) -> u64 {
        self.num_cycles
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Copy of the grid as it currently stands.
    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> GridSnapshot {
        self.grid.snapshot(timestamp, &self.params.grid.grid_frame_id)
    }

    /// Run one full cycle over the given clouds.
    ///
    /// Skipped and cancelled cycles are not errors, they are reported through the returned
    /// [`CycleOutcome`].
    pub fn proc(&mut self, input: &CycleInput) -> Result<(CycleOutcome, StatusReport), OgmError> {
        // Clear the status report
        self.report = StatusReport {
            cycle: self.num_cycles,
            num_raw_points: input.raw.len(),
            num_obstacle_points: input.obstacle.len(),
            ..Default::default()
        };
        self.num_cycles += 1;

        let outcome = self.run_cycle(input);
        self.phase = CyclePhase::Idle;

        if self.arch_report.is_initialised() {
            if let Err(e) = self.write() {
                warn!("Could not archive OGM status report: {}", e);
            }
        }

        Ok((outcome?, self.report.clone()))
    }

    fn run_cycle(&mut self, input: &CycleInput) -> Result<CycleOutcome, OgmError> {
        if self.check_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        self.enter(CyclePhase::Transforming);

        let (raw_pose, obstacle_pose) = match self.lookup_poses(input) {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping OGM cycle {}: {}", self.report.cycle, e);
                self.report.skipped = true;
                self.report.skip_reason = Some(e.to_string());
                return Ok(CycleOutcome::Skipped(e));
            }
        };

        if self.check_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        self.enter(CyclePhase::Projecting);

        let mut raw_points_m = Vec::new();
        let mut obstacle_points_m = Vec::new();

        let raw_steps =
            self.project_cloud(EvidenceSource::Raw, &input.raw, &raw_pose, &mut raw_points_m);
        let obstacle_steps = self.project_cloud(
            EvidenceSource::Obstacle,
            &input.obstacle,
            &obstacle_pose,
            &mut obstacle_points_m,
        );

        let occlusion = match self.params.grid.occlusion {
            Some(ref occ_params) => Occlusion::analyse(
                occ_params,
                &self.grid,
                &raw_pose.position_xy(),
                &raw_points_m,
                &obstacle_points_m,
            ),
            None => Occlusion::default(),
        };

        if self.check_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        // No cancellation checks from here on, the cycle must reach a snapshot once the grid is
        // modified.
        self.enter(CyclePhase::Updating);
        self.merge_evidence(&raw_steps, &obstacle_steps, &occlusion)?;

        let vehicle_m = raw_pose.position_xy();
        if (vehicle_m - self.last_recenter_m).norm() > self.params.grid.recenter_margin_m {
            self.enter(CyclePhase::Recentering);

            let shift = self.grid.recenter_on(&vehicle_m);
            self.last_recenter_m = vehicle_m;
            self.report.recentered = true;

            trace!(
                "Recentred on vehicle at ({:.2}, {:.2}), shifted ({}, {}) cells",
                vehicle_m.x,
                vehicle_m.y,
                shift.x,
                shift.y
            );
        }

        self.enter(CyclePhase::Snapshotting);

        let stamp = input.raw.timestamp.max(input.obstacle.timestamp);
        let snapshot = self.snapshot(stamp);

        let (min, max) = self.grid.min_max()?;
        self.report.min_log_odds = min;
        self.report.max_log_odds = max;

        debug!(
            "OGM cycle {}: {} hits, {} misses, {} raw misses suppressed, {} points filtered",
            self.report.cycle,
            self.report.num_hits,
            self.report.num_misses,
            self.report.num_suppressed_misses,
            self.report.num_filtered_points
        );

        Ok(CycleOutcome::Published(snapshot))
    }

    fn enter(&mut self, phase: CyclePhase) {
        self.phase = phase;
        self.report.phase_reached = phase;
    }

    /// Consume a pending cancellation request.
    fn check_cancelled(&mut self) -> bool {
        if !self.cancel.take() {
            return false;
        }

        info!("OGM cycle {} cancelled", self.report.cycle);
        self.report.cancelled = true;
        true
    }

    fn lookup_poses(&self, input: &CycleInput) -> Result<(Pose, Pose), LookupError> {
        let raw = self
            .transforms
            .lookup(&input.raw.frame_id, &input.raw.timestamp)?;
        let obstacle = self
            .transforms
            .lookup(&input.obstacle.frame_id, &input.obstacle.timestamp)?;

        Ok((raw, obstacle))
    }

    /// Filter, transform and project every point in the cloud.
    ///
    /// The grid-frame position of every projected point is appended to `points_m`.
    fn project_cloud(
        &mut self,
        source: EvidenceSource,
        cloud: &PointCloud,
        pose: &Pose,
        points_m: &mut Vec<Vector2<f64>>,
    ) -> Vec<RayStep> {
        let origin_m = pose.position_xy();
        let mut steps = Vec::with_capacity(cloud.len() * 4);
        let mut num_filtered = 0;
        let mut num_projected = 0;

        for point in cloud.points.iter() {
            let point_m: Vector3<f64> = point.convert();

            if !point_m.iter().all(|v| v.is_finite()) || !self.within_height(point_m.z) {
                num_filtered += 1;
                continue;
            }

            let grid_point_m: Vector2<f64> = pose.transform_point(&point_m).convert();
            self.projector
                .project_into(&self.grid, &origin_m, &grid_point_m, &mut steps);
            points_m.push(grid_point_m);
            num_projected += 1;
        }

        trace!(
            "{:?} cloud: {} points projected into {} steps, {} filtered",
            source,
            num_projected,
            steps.len(),
            num_filtered
        );

        self.report.num_filtered_points += num_filtered;
        self.report.num_projected_points += num_projected;

        steps
    }

    fn within_height(&self, z_m: f64) -> bool {
        let above_min = self.params.grid.min_height_m.map_or(true, |min| z_m >= min);
        let below_max = self.params.grid.max_height_m.map_or(true, |max| z_m <= max);

        above_min && below_max
    }

    /// Fold both evidence sets into the grid.
    ///
    /// Raw misses on cells hit by an obstacle this cycle, or hidden behind one, are dropped.
    /// Everything else is applied raw first then obstacle. Untouched cells are then decayed.
    ///
    /// Every step is checked against the grid before any is applied, so an error leaves the grid
    /// as it was.
    fn merge_evidence(
        &mut self,
        raw: &[RayStep],
        obstacle: &[RayStep],
        occlusion: &Occlusion,
    ) -> Result<(), GridError> {
        if let Some(step) = raw
            .iter()
            .chain(obstacle)
            .chain(occlusion.fill.iter())
            .find(|s| !self.grid.cell_in_map(&s.cell))
        {
            return Err(GridError::OutsideMap(step.cell));
        }

        let mut obstacle_hits: HashSet<CellIdx> = obstacle
            .iter()
            .filter(|s| s.evidence == Evidence::Hit)
            .map(|s| s.cell)
            .collect();

        // Joining hits only where no obstacle point landed itself
        let fill: Vec<RayStep> = occlusion
            .fill
            .iter()
            .filter(|s| !obstacle_hits.contains(&s.cell))
            .copied()
            .collect();
        obstacle_hits.extend(fill.iter().map(|s| s.cell));

        let mut touched: HashSet<CellIdx> =
            HashSet::with_capacity(raw.len() + obstacle.len() + fill.len());

        for step in raw {
            if step.evidence == Evidence::Miss {
                if obstacle_hits.contains(&step.cell) {
                    self.report.num_suppressed_misses += 1;
                    continue;
                }
                if occlusion.hidden.contains(&step.cell) {
                    self.report.num_hidden_misses += 1;
                    continue;
                }
            }

            self.apply(step)?;
            touched.insert(step.cell);
        }

        for step in obstacle.iter().chain(fill.iter()) {
            self.apply(step)?;
            touched.insert(step.cell);
        }

        self.report.num_filled_cells = fill.len();

        if self.updater.decays() {
            let updater = &self.updater;
            let mut num_decayed = 0;

            for (cell, value) in self.grid.cells_mut() {
                if !touched.contains(&cell) && updater.decay(value) {
                    num_decayed += 1;
                }
            }

            self.report.num_decayed_cells = num_decayed;
        }

        Ok(())
    }

    fn apply(&mut self, step: &RayStep) -> Result<(), GridError> {
        let value = self.grid.get_mut(&step.cell)?;
        self.updater.apply(value, step.evidence);

        match step.evidence {
            Evidence::Hit => self.report.num_hits += 1,
            Evidence::Miss => self.report.num_misses += 1,
        }

        Ok(())
    }
}

impl Archived for OgmEngine {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(&self.report)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
