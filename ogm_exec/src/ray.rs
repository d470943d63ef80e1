//! # Ray projection
//!
//! Converts a point observed from a sensor into evidence for each cell of the grid between the
//! sensor and the point. Cells the ray passes through are evidence of free space, the cell
//! containing the point is evidence of an obstacle.
//!
//! Traversal follows Amanatides & Woo, "A Fast Voxel Traversal Algorithm for Ray Tracing", but
//! takes exactly one axis step per cell so that the visited cells form a 4-connected path.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;

use log::trace;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::map::{CellIdx, OccupancyGrid};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single piece of evidence about one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RayStep {
    pub cell: CellIdx,
    pub evidence: Evidence,
}

/// Projects points into per-cell evidence.
#[derive(Debug, Clone)]
pub struct RayProjector {
    max_range_m: f64,
}

/// Iterator over the cells crossed by a segment, excluding the start cell.
///
/// Positions are given in cell units, see [`OccupancyGrid::continuous_cell`].
#[derive(Debug, Clone)]
pub struct GridRay {
    current: CellIdx,
    target: CellIdx,

    /// Direction of travel along each axis, -1, 0 or 1
    step: (isize, isize),

    /// Ray parameter at which the next boundary on each axis is crossed
    t_max: Vector2<f64>,

    /// Change in ray parameter between boundaries on each axis
    t_delta: Vector2<f64>,

    remaining: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Evidence {
    /// The point was observed in this cell
    Hit,

    /// The ray passed through this cell
    Miss,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RayProjector {
    pub fn new(max_range_m: f64) -> Self {
        Self { max_range_m }
    }

    /// Project a single point, see [`RayProjector::project_into`].
    pub fn project(
        &self,
        grid: &OccupancyGrid,
        origin_m: &Vector2<f64>,
        point_m: &Vector2<f64>,
    ) -> Vec<RayStep> {
        let mut steps = Vec::new();
        self.project_into(grid, origin_m, point_m, &mut steps);
        steps
    }

    /// Append the evidence for the ray from `origin_m` to `point_m` onto `steps`, ordered from
    /// the sensor outwards.
    ///
    /// Both positions are in the grid frame. Points beyond the maximum range are truncated to it
    /// and give no hit. Rays whose last cell lies outside the grid give no evidence at all.
    ///
    /// Returns the number of steps appended.
    pub fn project_into(
        &self,
        grid: &OccupancyGrid,
        origin_m: &Vector2<f64>,
        point_m: &Vector2<f64>,
        steps: &mut Vec<RayStep>,
    ) -> usize {
        let ray_m = point_m - origin_m;
        let range_m = ray_m.norm();

        if range_m == 0.0 {
            return 0;
        }

        let (end_m, is_hit) = match range_m > self.max_range_m {
            true => (origin_m + ray_m * (self.max_range_m / range_m), false),
            false => (*point_m, true),
        };

        let terminal = grid.position_to_cell_unbounded(&end_m);
        if !grid.cell_in_map(&terminal) {
            trace!("Dropping ray ending in {}, outside the grid", terminal);
            return 0;
        }

        let start_len = steps.len();

        let ray = GridRay::new(&grid.continuous_cell(origin_m), &grid.continuous_cell(&end_m));

        steps.extend(
            ray.filter(|c| grid.cell_in_map(c))
                .map(|cell| RayStep {
                    cell,
                    evidence: match is_hit && cell == terminal {
                        true => Evidence::Hit,
                        false => Evidence::Miss,
                    },
                }),
        );

        steps.len() - start_len
    }
}

impl GridRay {
    pub fn new(start: &Vector2<f64>, end: &Vector2<f64>) -> Self {
        let current = CellIdx::new(start.x.floor() as isize, start.y.floor() as isize);
        let target = CellIdx::new(end.x.floor() as isize, end.y.floor() as isize);
        let dir = end - start;

        let (step_x, t_max_x, t_delta_x) = axis_setup(start.x, dir.x, current.x, target.x);
        let (step_y, t_max_y, t_delta_y) = axis_setup(start.y, dir.y, current.y, target.y);

        Self {
            current,
            target,
            step: (step_x, step_y),
            t_max: Vector2::new(t_max_x, t_max_y),
            t_delta: Vector2::new(t_delta_x, t_delta_y),
            remaining: ((target.x - current.x).abs() + (target.y - current.y).abs()) as usize,
        }
    }
}

impl Iterator for GridRay {
    type Item = CellIdx;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // Once an axis reaches the target cell only the other may move. Corners step X first.
        let step_x = self.current.x != self.target.x
            && (self.current.y == self.target.y || self.t_max.x <= self.t_max.y);

        if step_x {
            self.current.x += self.step.0;
            self.t_max.x += self.t_delta.x;
        } else {
            self.current.y += self.step.1;
            self.t_max.y += self.t_delta.y;
        }

        self.remaining -= 1;

        Some(self.current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for GridRay {}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Step direction, first boundary crossing and crossing interval for one axis.
fn axis_setup(start: f64, dir: f64, cell: isize, target: isize) -> (isize, f64, f64) {
    match target.cmp(&cell) {
        Ordering::Greater => (1, (cell as f64 + 1.0 - start) / dir, 1.0 / dir),
        Ordering::Less => (-1, (start - cell as f64) / -dir, 1.0 / -dir),
        Ordering::Equal => (0, f64::INFINITY, f64::INFINITY),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn test_grid() -> OccupancyGrid {
        OccupancyGrid::new(1.0, Vector2::new(10, 10), Vector2::new(5.0, 5.0)).unwrap()
    }

    fn cells(steps: &[RayStep]) -> Vec<(isize, isize)> {
        steps.iter().map(|s| (s.cell.x, s.cell.y)).collect()
    }

    #[test]
    fn test_axis_aligned() {
        let grid = test_grid();
        let proj = RayProjector::new(50.0);

        let steps = proj.project(&grid, &Vector2::new(0.5, 0.5), &Vector2::new(4.5, 0.5));

        assert_eq!(cells(&steps), vec![(1, 0), (2, 0), (3, 0), (4, 0)]);
        assert!(steps[..3].iter().all(|s| s.evidence == Evidence::Miss));
        assert_eq!(steps[3].evidence, Evidence::Hit);

        let steps = proj.project(&grid, &Vector2::new(8.5, 8.5), &Vector2::new(8.5, 6.5));
        assert_eq!(cells(&steps), vec![(8, 7), (8, 6)]);
    }

    #[test]
    fn test_diagonal_steps_x_first() {
        let grid = test_grid();
        let proj = RayProjector::new(50.0);

        let steps = proj.project(&grid, &Vector2::new(0.5, 0.5), &Vector2::new(2.5, 2.5));

        assert_eq!(cells(&steps), vec![(1, 0), (1, 1), (2, 1), (2, 2)]);
        assert_eq!(
            steps.iter().filter(|s| s.evidence == Evidence::Hit).count(),
            1
        );
    }

    #[test]
    fn test_shallow_ray() {
        let grid = test_grid();
        let proj = RayProjector::new(50.0);

        let steps = proj.project(&grid, &Vector2::new(0.5, 0.2), &Vector2::new(6.5, 1.4));

        assert_eq!(
            cells(&steps),
            vec![(1, 0), (2, 0), (3, 0), (4, 0), (4, 1), (5, 1), (6, 1)]
        );
    }

    #[test]
    fn test_same_cell_is_empty() {
        let grid = test_grid();
        let proj = RayProjector::new(50.0);

        assert!(proj
            .project(&grid, &Vector2::new(0.5, 0.5), &Vector2::new(0.5, 0.5))
            .is_empty());
        assert!(proj
            .project(&grid, &Vector2::new(0.5, 0.5), &Vector2::new(0.9, 0.1))
            .is_empty());
    }

    #[test]
    fn test_beyond_max_range_has_no_hit() {
        let grid = test_grid();
        let proj = RayProjector::new(3.0);

        let steps = proj.project(&grid, &Vector2::new(0.5, 0.5), &Vector2::new(8.5, 0.5));

        assert_eq!(cells(&steps), vec![(1, 0), (2, 0), (3, 0)]);
        assert!(steps.iter().all(|s| s.evidence == Evidence::Miss));
    }

    #[test]
    fn test_outside_grid_dropped() {
        let grid = test_grid();
        let proj = RayProjector::new(50.0);

        assert!(proj
            .project(&grid, &Vector2::new(0.5, 0.5), &Vector2::new(12.5, 0.5))
            .is_empty());
        assert!(proj
            .project(&grid, &Vector2::new(0.5, 0.5), &Vector2::new(-3.0, 0.5))
            .is_empty());
    }

    #[test]
    fn test_origin_outside_grid() {
        let grid = test_grid();
        let proj = RayProjector::new(50.0);

        let steps = proj.project(&grid, &Vector2::new(-2.5, 0.5), &Vector2::new(1.5, 0.5));

        assert_eq!(cells(&steps), vec![(0, 0), (1, 0)]);
        assert_eq!(steps[1].evidence, Evidence::Hit);
    }

    proptest! {
        #[test]
        fn ray_is_connected_and_monotonic(
            ax in 0.0f64..20.0, ay in 0.0f64..20.0,
            bx in 0.0f64..20.0, by in 0.0f64..20.0,
        ) {
            let a = Vector2::new(ax, ay);
            let b = Vector2::new(bx, by);
            let start = CellIdx::new(ax.floor() as isize, ay.floor() as isize);
            let end = CellIdx::new(bx.floor() as isize, by.floor() as isize);

            let ray: Vec<CellIdx> = GridRay::new(&a, &b).collect();

            let manhattan = (end.x - start.x).abs() + (end.y - start.y).abs();
            prop_assert_eq!(ray.len() as isize, manhattan);

            if let Some(last) = ray.last() {
                prop_assert_eq!(*last, end);
            }
            prop_assert!(!ray.contains(&start));

            let sx = (end.x - start.x).signum();
            let sy = (end.y - start.y).signum();
            let mut prev = start;
            for cell in ray.iter() {
                let dx = cell.x - prev.x;
                let dy = cell.y - prev.y;

                // Exactly one axis moves by one cell, always towards the end
                prop_assert!((dx == sx && dx != 0 && dy == 0) || (dy == sy && dy != 0 && dx == 0));
                prev = *cell;
            }
        }

        #[test]
        fn ray_has_at_most_one_hit(
            px in -5.0f64..15.0, py in -5.0f64..15.0,
            max_range in 0.5f64..20.0,
        ) {
            let grid = test_grid();
            let proj = RayProjector::new(max_range);
            let origin = Vector2::new(5.2, 4.7);

            let steps = proj.project(&grid, &origin, &Vector2::new(px, py));

            let hits: Vec<&RayStep> = steps.iter().filter(|s| s.evidence == Evidence::Hit).collect();
            prop_assert!(hits.len() <= 1);
            if let Some(hit) = hits.first() {
                prop_assert_eq!(hit.cell, steps[steps.len() - 1].cell);
            }
            prop_assert!(steps.iter().all(|s| grid.cell_in_map(&s.cell)));
        }
    }
}
