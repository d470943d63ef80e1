//! # Occupancy Grid
//!
//! A fixed size grid of log-odds values anchored at a moving origin. Cells are indexed from the
//! lower corner of the grid, with `x` along the grid frame X axis and `y` along the Y axis. The
//! backing array is stored row-major, i.e. indexed `[[y, x]]`.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use std::fmt;

use chrono::{DateTime, Utc};
use log::trace;
use nalgebra::Vector2;
use ndarray::{s, Array2, ArrayView2};
use ndarray_stats::{errors::MinMaxError, QuantileExt};
use serde::{Deserialize, Serialize};

use crate::params::GridParams;

use super::GridSnapshot;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Index of a cell in the grid.
///
/// Signed so that cells outside the grid, such as the far end of a ray, can still be named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIdx {
    pub x: isize,
    pub y: isize,
}

/// The rolling log-odds occupancy grid.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    /// The edge length of each cell in meters
    resolution_m: f64,

    /// The number of cells in each axis of the map
    num_cells: Vector2<usize>,

    /// Position of the lower corner of cell (0, 0)
    origin_m: Vector2<f64>,

    /// Log-odds of each cell, dimension order y cell, x cell
    data: Array2<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Requested cell {0} is outside the map bounds")]
    OutsideMap(CellIdx),

    #[error("Invalid grid geometry: {1}x{2} cells of size {0} m")]
    InvalidGeometry(f64, usize, usize),

    #[error("Couldn't calculate min/max of grid: {0}")]
    MinMaxError(MinMaxError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CellIdx {
    pub fn new(x: isize, y: isize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl OccupancyGrid {
    /// Create a new grid of unknown cells centred on the given position.
    pub fn new(
        resolution_m: f64,
        num_cells: Vector2<usize>,
        centre_m: Vector2<f64>,
    ) -> Result<Self, GridError> {
        if !(resolution_m > 0.0) || num_cells.x == 0 || num_cells.y == 0 {
            return Err(GridError::InvalidGeometry(
                resolution_m,
                num_cells.x,
                num_cells.y,
            ));
        }

        let extent_m = num_cells.map(|n| n as f64) * resolution_m;

        Ok(Self {
            resolution_m,
            num_cells,
            origin_m: centre_m - extent_m / 2.0,
            data: Array2::zeros((num_cells.y, num_cells.x)),
        })
    }

    /// Create the grid described by the given parameters, centred on `initial_centre_m`.
    pub fn from_params(params: &GridParams) -> Result<Self, GridError> {
        Self::new(
            params.resolution_m,
            Vector2::new(params.width_cells, params.height_cells),
            params.initial_centre_m,
        )
    }

    pub fn resolution(&self) -> f64 {
        self.resolution_m
    }

    pub fn num_cells(&self) -> Vector2<usize> {
        self.num_cells
    }

    pub fn width(&self) -> usize {
        self.num_cells.x
    }

    pub fn height(&self) -> usize {
        self.num_cells.y
    }

    pub fn origin(&self) -> Vector2<f64> {
        self.origin_m
    }

    /// Length of each axis of the map in meters
    pub fn extent(&self) -> Vector2<f64> {
        self.num_cells.map(|n| n as f64) * self.resolution_m
    }

    pub fn centre_position(&self) -> Vector2<f64> {
        self.origin_m + self.extent() / 2.0
    }

    /// Position in units of cells relative to the grid origin.
    ///
    /// The integer part of each component is the cell index.
    pub fn continuous_cell(&self, position_m: &Vector2<f64>) -> Vector2<f64> {
        (position_m - self.origin_m) / self.resolution_m
    }

    /// Cell containing the given position, which may lie outside the map.
    pub fn position_to_cell_unbounded(&self, position_m: &Vector2<f64>) -> CellIdx {
        let c = self.continuous_cell(position_m);
        CellIdx::new(c.x.floor() as isize, c.y.floor() as isize)
    }

    /// Cell containing the given position, or `None` if it is outside the map.
    pub fn position_to_cell(&self, position_m: &Vector2<f64>) -> Option<CellIdx> {
        let cell = self.position_to_cell_unbounded(position_m);

        match self.cell_in_map(&cell) {
            true => Some(cell),
            false => None,
        }
    }

    pub fn cell_in_map(&self, cell: &CellIdx) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && (cell.x as usize) < self.num_cells.x
            && (cell.y as usize) < self.num_cells.y
    }

    /// Position of the centre of the given cell.
    pub fn cell_centre(&self, cell: &CellIdx) -> Result<Vector2<f64>, GridError> {
        self.index(cell)?;

        Ok(self.origin_m
            + Vector2::new(cell.x as f64 + 0.5, cell.y as f64 + 0.5) * self.resolution_m)
    }

    pub fn get(&self, cell: &CellIdx) -> Result<f64, GridError> {
        Ok(self.data[self.index(cell)?])
    }

    pub fn get_mut(&mut self, cell: &CellIdx) -> Result<&mut f64, GridError> {
        let idx = self.index(cell)?;
        Ok(&mut self.data[idx])
    }

    /// Iterate mutably over every cell along with its index.
    pub fn cells_mut(&mut self) -> impl Iterator<Item = (CellIdx, &mut f64)> + '_ {
        self.data
            .indexed_iter_mut()
            .map(|((y, x), v)| (CellIdx::new(x as isize, y as isize), v))
    }

    /// View of the raw log-odds data, indexed `[[y, x]]`.
    pub fn view(&self) -> ArrayView2<f64> {
        self.data.view()
    }

    /// Minimum and maximum log-odds in the grid.
    pub fn min_max(&self) -> Result<(f64, f64), GridError> {
        let min = *self.data.min().map_err(GridError::MinMaxError)?;
        let max = *self.data.max().map_err(GridError::MinMaxError)?;

        Ok((min, max))
    }

    /// Move the grid so that its centre is as close as possible to `centre_m` while keeping the
    /// origin on the existing cell lattice.
    ///
    /// Returns the shift applied in cells.
    pub fn recenter_on(&mut self, centre_m: &Vector2<f64>) -> Vector2<isize> {
        let new_origin_m = centre_m - self.extent() / 2.0;
        self.update_origin(&new_origin_m)
    }

    /// Shift the origin towards `new_origin_m` by a whole number of cells.
    ///
    /// Cells which remain inside the footprint keep their values, cells which leave it are
    /// discarded and newly exposed cells are set to the unknown prior. Returns the shift applied in
    /// cells.
    pub fn update_origin(&mut self, new_origin_m: &Vector2<f64>) -> Vector2<isize> {
        let shift = ((new_origin_m - self.origin_m) / self.resolution_m).map(|v| v.floor() as isize);

        if shift == Vector2::zeros() {
            return shift;
        }

        self.origin_m += shift.map(|v| v as f64) * self.resolution_m;

        let mut shifted: Array2<f64> = Array2::zeros(self.data.raw_dim());

        // Old cell (x, y) becomes new cell (x - shift.x, y - shift.y)
        if let (Some((src_x, dst_x, len_x)), Some((src_y, dst_y, len_y))) = (
            overlap(shift.x, self.num_cells.x),
            overlap(shift.y, self.num_cells.y),
        ) {
            shifted
                .slice_mut(s![dst_y..dst_y + len_y, dst_x..dst_x + len_x])
                .assign(&self.data.slice(s![src_y..src_y + len_y, src_x..src_x + len_x]));
        }

        self.data = shifted;

        trace!(
            "Grid shifted by ({}, {}) cells, origin now ({:.3}, {:.3})",
            shift.x,
            shift.y,
            self.origin_m.x,
            self.origin_m.y
        );

        shift
    }

    /// Take an owned copy of the grid.
    pub fn snapshot(&self, timestamp: DateTime<Utc>, frame_id: &str) -> GridSnapshot {
        GridSnapshot {
            timestamp,
            frame_id: frame_id.to_string(),
            resolution_m: self.resolution_m,
            width: self.num_cells.x,
            height: self.num_cells.y,
            origin_m: self.origin_m,
            log_odds: self.data.iter().copied().collect(),
        }
    }

    fn index(&self, cell: &CellIdx) -> Result<[usize; 2], GridError> {
        match self.cell_in_map(cell) {
            true => Ok([cell.y as usize, cell.x as usize]),
            false => Err(GridError::OutsideMap(*cell)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Overlap between an axis of `len` cells and the same axis shifted by `shift` cells.
///
/// Returns the source start, destination start and length of the overlap, or `None` if the
/// shifted axis no longer overlaps at all.
fn overlap(shift: isize, len: usize) -> Option<(usize, usize, usize)> {
    let len = len as isize;
    let src_start = shift.max(0);
    let src_end = (len + shift).min(len);

    if src_end <= src_start {
        return None;
    }

    Some((
        src_start as usize,
        (src_start - shift) as usize,
        (src_end - src_start) as usize,
    ))
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

    #[test]
    fn test_geometry() {
        let grid = OccupancyGrid::new(0.5, Vector2::new(4, 6), Vector2::new(1.0, 1.0)).unwrap();

        assert_eq!(grid.origin(), Vector2::new(0.0, -0.5));
        assert_eq!(grid.extent(), Vector2::new(2.0, 3.0));
        assert_eq!(grid.centre_position(), Vector2::new(1.0, 1.0));
        assert_eq!(grid.view().dim(), (6, 4));

        assert!(OccupancyGrid::new(0.0, Vector2::new(4, 6), Vector2::zeros()).is_err());
        assert!(OccupancyGrid::new(1.0, Vector2::new(0, 6), Vector2::zeros()).is_err());
    }

    #[test]
    fn test_position_to_cell() {
        let grid = test_grid();

        assert_eq!(
            grid.position_to_cell(&Vector2::new(0.5, 0.5)),
            Some(CellIdx::new(0, 0))
        );
        assert_eq!(
            grid.position_to_cell(&Vector2::new(5.5, 2.0)),
            Some(CellIdx::new(5, 2))
        );
        assert_eq!(grid.position_to_cell(&Vector2::new(-0.1, 2.0)), None);
        assert_eq!(grid.position_to_cell(&Vector2::new(2.0, 10.0)), None);
        assert_eq!(
            grid.position_to_cell_unbounded(&Vector2::new(-0.1, 12.0)),
            CellIdx::new(-1, 12)
        );

        assert_eq!(
            grid.cell_centre(&CellIdx::new(3, 4)).unwrap(),
            Vector2::new(3.5, 4.5)
        );
        assert!(grid.cell_centre(&CellIdx::new(10, 4)).is_err());
    }

    #[test]
    fn test_access() {
        let mut grid = test_grid();

        *grid.get_mut(&CellIdx::new(2, 7)).unwrap() = 1.25;

        assert_eq!(grid.get(&CellIdx::new(2, 7)).unwrap(), 1.25);
        assert_eq!(grid.view()[[7, 2]], 1.25);
        assert!(matches!(
            grid.get(&CellIdx::new(-1, 0)),
            Err(GridError::OutsideMap(_))
        ));

        assert_eq!(grid.min_max().unwrap(), (0.0, 1.25));

        for (cell, v) in grid.cells_mut() {
            if cell.x == 0 {
                *v = -1.0;
            }
        }
        assert_eq!(grid.get(&CellIdx::new(0, 9)).unwrap(), -1.0);
        assert_eq!(grid.min_max().unwrap(), (-1.0, 1.25));
    }

    #[test]
    fn test_recenter_preserves_overlap() {
        let mut grid = test_grid();
        *grid.get_mut(&CellIdx::new(3, 4)).unwrap() = 1.5;
        *grid.get_mut(&CellIdx::new(0, 0)).unwrap() = -1.0;

        let shift = grid.recenter_on(&Vector2::new(7.3, 5.0));

        assert_eq!(shift, Vector2::new(2, 0));
        assert_eq!(grid.origin(), Vector2::new(2.0, 0.0));

        // The cell keeps its world footprint
        let cell = grid.position_to_cell(&Vector2::new(3.5, 4.5)).unwrap();
        assert_eq!(cell, CellIdx::new(1, 4));
        assert_eq!(grid.get(&cell).unwrap(), 1.5);

        // Everything else, including the exposed columns, is unknown
        let nonzero = grid.view().iter().filter(|v| **v != 0.0).count();
        assert_eq!(nonzero, 1);
    }

    #[test]
    fn test_recenter_negative_shift() {
        let mut grid = test_grid();
        *grid.get_mut(&CellIdx::new(0, 0)).unwrap() = -1.0;
        *grid.get_mut(&CellIdx::new(9, 9)).unwrap() = 2.0;

        let shift = grid.update_origin(&Vector2::new(-3.0, -1.0));

        assert_eq!(shift, Vector2::new(-3, -1));
        assert_eq!(grid.get(&CellIdx::new(3, 1)).unwrap(), -1.0);
        assert_eq!(grid.position_to_cell(&Vector2::new(9.5, 9.5)), None);
        assert_eq!(grid.view().iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_recenter_beyond_footprint() {
        let mut grid = test_grid();
        for (_, v) in grid.cells_mut() {
            *v = 1.0;
        }

        grid.recenter_on(&Vector2::new(100.0, 5.0));

        assert!(grid.view().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_snapshot_row_major() {
        let mut grid = OccupancyGrid::new(1.0, Vector2::new(3, 2), Vector2::zeros()).unwrap();
        *grid.get_mut(&CellIdx::new(2, 1)).unwrap() = 0.5;

        let snap = grid.snapshot(Utc::now(), "map");

        assert_eq!(snap.log_odds.len(), 6);
        assert_eq!(snap.log_odds[5], 0.5);
        assert_eq!(snap.get(2, 1), Some(0.5));

        // Mutating the grid doesn't affect the snapshot
        *grid.get_mut(&CellIdx::new(2, 1)).unwrap() = -0.5;
        assert_eq!(snap.get(2, 1), Some(0.5));
    }
}
