//! # Occlusion
//!
//! Raw returns which pass close behind an obstacle don't show that the space behind the obstacle
//! is free, the obstacle hides it. Obstacle points a short distance apart along one bearing are
//! usually the same object seen at two ranges, and the cells between them are occupied too.
//!
//! Points from both clouds are binned by bearing around the raw sensor and sorted by range in
//! each bin. Walking the obstacle points of a bin outwards:
//!
//! - if the next obstacle point is within the distance margin, the cells between the two are
//!   joined as hits,
//! - otherwise the cells from the obstacle to whichever is nearer of the next obstacle point and
//!   the first raw return beyond the margin are hidden, and raw misses on them are dropped.
//!
//! Obstacle points beyond the furthest raw return of their bin, or in a bin with no raw return,
//! take no part.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{cmp::Ordering, collections::HashSet, f64::consts::PI};

use nalgebra::Vector2;

use crate::{
    map::{CellIdx, OccupancyGrid},
    params::OcclusionParams,
    ray::{Evidence, GridRay, RayStep},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cells hidden by, or joining, the obstacles seen in one cycle.
#[derive(Debug, Clone, Default)]
pub struct Occlusion {
    /// Cells behind an obstacle, raw misses on these carry no information
    pub hidden: HashSet<CellIdx>,

    /// Hit evidence joining nearby obstacle points, at most one per cell
    pub fill: Vec<RayStep>,
}

#[derive(Debug, Clone, Copy)]
struct BinnedPoint {
    range_m: f64,
    position_m: Vector2<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Occlusion {
    /// Analyse the grid-frame raw and obstacle points seen from the raw sensor at `origin_m`.
    pub fn analyse(
        params: &OcclusionParams,
        grid: &OccupancyGrid,
        origin_m: &Vector2<f64>,
        raw_m: &[Vector2<f64>],
        obstacle_m: &[Vector2<f64>],
    ) -> Self {
        let num_bins = (2.0 * PI / params.angle_increment_rad).ceil() as usize + 1;
        let margin_m = params.distance_margin_m;

        let raw_bins = bin_points(params, origin_m, raw_m, num_bins);
        let mut obstacle_bins = bin_points(params, origin_m, obstacle_m, num_bins);

        let mut occlusion = Self::default();
        let mut filled = HashSet::new();

        for (raw, obstacles) in raw_bins.iter().zip(obstacle_bins.iter_mut()) {
            let furthest_m = match raw.last() {
                Some(p) => p.range_m,
                None => continue,
            };
            obstacles.retain(|o| o.range_m <= furthest_m);

            let mut next_raw = 0;

            for (i, obstacle) in obstacles.iter().enumerate() {
                // First raw return far enough behind the obstacle to see past it
                while next_raw < raw.len() && raw[next_raw].range_m < obstacle.range_m + margin_m {
                    next_raw += 1;
                }

                let hidden_to = match (obstacles.get(i + 1), raw.get(next_raw)) {
                    (Some(next), _) if next.range_m - obstacle.range_m <= margin_m => {
                        for cell in cells_between(grid, obstacle, next) {
                            if filled.insert(cell) {
                                occlusion.fill.push(RayStep {
                                    cell,
                                    evidence: Evidence::Hit,
                                });
                            }
                        }
                        continue;
                    }
                    (None, None) => continue,
                    (None, Some(seen)) => seen,
                    (Some(next), None) => next,
                    (Some(next), Some(seen)) => match seen.range_m < next.range_m {
                        true => seen,
                        false => next,
                    },
                };

                occlusion
                    .hidden
                    .extend(cells_between(grid, obstacle, hidden_to));
            }
        }

        occlusion
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Group points into bearing bins around `origin_m`, each sorted by range.
fn bin_points(
    params: &OcclusionParams,
    origin_m: &Vector2<f64>,
    points_m: &[Vector2<f64>],
    num_bins: usize,
) -> Vec<Vec<BinnedPoint>> {
    let mut bins = vec![Vec::new(); num_bins];

    for position_m in points_m {
        let rel_m = position_m - origin_m;
        let range_m = rel_m.norm();

        if range_m == 0.0 {
            continue;
        }

        let bearing = rel_m.y.atan2(rel_m.x);
        let bin = (((bearing + PI) / params.angle_increment_rad) as usize).min(num_bins - 1);

        bins[bin].push(BinnedPoint {
            range_m,
            position_m: *position_m,
        });
    }

    for bin in bins.iter_mut() {
        bin.sort_by(|a, b| a.range_m.partial_cmp(&b.range_m).unwrap_or(Ordering::Equal));
    }

    bins
}

/// In-map cells crossed between two points, excluding the cells containing either end.
fn cells_between(grid: &OccupancyGrid, from: &BinnedPoint, to: &BinnedPoint) -> Vec<CellIdx> {
    let ray = GridRay::new(
        &grid.continuous_cell(&from.position_m),
        &grid.continuous_cell(&to.position_m),
    );
    let len = ray.len();

    ray.take(len.saturating_sub(1))
        .filter(|c| grid.cell_in_map(c))
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_grid() -> OccupancyGrid {
        OccupancyGrid::new(1.0, Vector2::new(10, 10), Vector2::new(5.0, 5.0)).unwrap()
    }

    fn params(distance_margin_m: f64) -> OcclusionParams {
        OcclusionParams {
            distance_margin_m,
            angle_increment_rad: 0.1f64.to_radians(),
        }
    }

    fn along_x(xs: &[f64]) -> Vec<Vector2<f64>> {
        xs.iter().map(|&x| Vector2::new(x, 0.5)).collect()
    }

    fn xs(cells: &HashSet<CellIdx>) -> Vec<isize> {
        let mut v: Vec<isize> = cells.iter().map(|c| c.x).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_hidden_up_to_raw_return() {
        let grid = test_grid();
        let occ = Occlusion::analyse(
            &params(1.0),
            &grid,
            &Vector2::new(0.5, 0.5),
            &along_x(&[8.5]),
            &along_x(&[3.5]),
        );

        assert_eq!(xs(&occ.hidden), vec![4, 5, 6, 7]);
        assert!(occ.fill.is_empty());
    }

    #[test]
    fn test_raw_return_within_margin_reveals_nothing() {
        let grid = test_grid();

        // The only raw return is inside the margin behind the obstacle
        let occ = Occlusion::analyse(
            &params(2.0),
            &grid,
            &Vector2::new(0.5, 0.5),
            &along_x(&[4.5]),
            &along_x(&[3.5]),
        );

        assert!(occ.hidden.is_empty());
        assert!(occ.fill.is_empty());
    }

    #[test]
    fn test_hidden_up_to_next_obstacle() {
        let grid = test_grid();
        let occ = Occlusion::analyse(
            &params(1.0),
            &grid,
            &Vector2::new(0.5, 0.5),
            &along_x(&[9.5]),
            &along_x(&[2.5, 6.5]),
        );

        // Behind the first obstacle up to the second, then behind the second up to the return
        assert_eq!(xs(&occ.hidden), vec![3, 4, 5, 7, 8]);
    }

    #[test]
    fn test_nearby_obstacles_joined() {
        let grid = test_grid();
        let occ = Occlusion::analyse(
            &params(3.0),
            &grid,
            &Vector2::new(0.5, 0.5),
            &along_x(&[8.5]),
            &along_x(&[3.5, 6.0]),
        );

        let filled: HashSet<CellIdx> = occ.fill.iter().map(|s| s.cell).collect();
        assert_eq!(xs(&filled), vec![4, 5]);
        assert!(occ.fill.iter().all(|s| s.evidence == Evidence::Hit));
        assert!(occ.hidden.is_empty());
    }

    #[test]
    fn test_obstacle_beyond_raw_ignored() {
        let grid = test_grid();

        // Different bearings, and an obstacle further than any raw return on its own bearing
        let occ = Occlusion::analyse(
            &params(1.0),
            &grid,
            &Vector2::new(0.5, 0.5),
            &[Vector2::new(4.5, 0.5), Vector2::new(0.5, 8.5)],
            &[Vector2::new(8.5, 0.5), Vector2::new(8.5, 8.5)],
        );

        assert!(occ.hidden.is_empty());
        assert!(occ.fill.is_empty());
    }
}
