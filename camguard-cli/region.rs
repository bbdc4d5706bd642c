//! Region and angle consistency of matched point pairs.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SLOPE_TOLERANCE;
use crate::error::{GuardError, GuardResult};

const SLOPE_EPS: f64 = 1e-5;

/// Number of grid rows and columns an image is split into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSplit {
    pub rows: usize,
    pub cols: usize,
}

impl GridSplit {
    pub fn new(rows: usize, cols: usize) -> GuardResult<Self> {
        let split = Self { rows, cols };
        split.validate()?;
        Ok(split)
    }

    pub fn validate(&self) -> GuardResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(GuardError::InvalidConfig(format!(
                "grid split {}x{} must be non-zero",
                self.rows, self.cols
            )));
        }
        Ok(())
    }
}

/// Grid laid over a `width` x `height` image with integer cell sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionGrid {
    cell_w: usize,
    cell_h: usize,
    split: GridSplit,
}

impl RegionGrid {
    pub fn new(width: usize, height: usize, split: GridSplit) -> GuardResult<Self> {
        split.validate()?;
        let cell_w = width / split.cols;
        let cell_h = height / split.rows;
        if cell_w == 0 || cell_h == 0 {
            return Err(GuardError::InvalidConfig(format!(
                "{}x{} image cannot be split into {}x{} cells",
                width, height, split.rows, split.cols
            )));
        }
        Ok(Self { cell_w, cell_h, split })
    }

    /// `(column, row)` of the cell holding `(x, y)`.
    ///
    /// Points past the last full cell (the remainder of the integer
    /// division) belong to the last row or column.
    ///
    /// Cell edges sit on multiples of the integer cell size, not of the
    /// real-valued `width / cols`. For 640 px in 3 columns the first edge is
    /// at 213, so `x` in `[213, 213.33)` is column 1 here, where
    /// `floor(x / (640.0 / 3.0))` would give column 0.
    pub fn cell_of(&self, x: f32, y: f32) -> (usize, usize) {
        let index = |v: f32, size: usize, count: usize| {
            let i = (v.max(0.0) / size as f32).floor() as usize;
            i.min(count - 1)
        };
        (
            index(x, self.cell_w, self.split.cols),
            index(y, self.cell_h, self.split.rows),
        )
    }

    pub fn cell_size(&self) -> (usize, usize) {
        (self.cell_w, self.cell_h)
    }
}

/// `dy / (dx + 1e-5)` rounded to seven decimals
pub fn displacement_slope(p1: (f32, f32), p2: (f32, f32)) -> f64 {
    let dx = p2.0 as f64 - p1.0 as f64;
    let dy = p2.1 as f64 - p1.1 as f64;
    let slope = dy / (dx + SLOPE_EPS);
    (slope * 1e7).round() / 1e7
}

/// Keeps matches that stay in one grid cell and move near-horizontally.
#[derive(Debug, Clone, Copy)]
pub struct RegionAngleFilter {
    grid: RegionGrid,
    tolerance: f64,
}

impl RegionAngleFilter {
    pub fn new(grid: RegionGrid) -> Self {
        Self {
            grid,
            tolerance: DEFAULT_SLOPE_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn accepts_slope(&self, slope: f64) -> bool {
        -self.tolerance <= slope && slope <= self.tolerance
    }

    pub fn accepts(&self, p1: (f32, f32), p2: (f32, f32)) -> bool {
        self.accepts_slope(displacement_slope(p1, p2))
            && self.grid.cell_of(p1.0, p1.1) == self.grid.cell_of(p2.0, p2.1)
    }

    pub fn grid(&self) -> &RegionGrid {
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid_640x480() -> RegionGrid {
        RegionGrid::new(640, 480, GridSplit::new(3, 3).unwrap()).unwrap()
    }

    #[test]
    fn zero_split_is_rejected() {
        assert!(GridSplit::new(0, 3).is_err());
        assert!(GridSplit::new(3, 0).is_err());
        assert!(RegionGrid::new(2, 100, GridSplit { rows: 3, cols: 3 }).is_err());
    }

    #[test]
    fn cells_use_floor_division() {
        let grid = grid_640x480();
        assert_eq!(grid.cell_size(), (213, 160));
        assert_eq!(grid.cell_of(0.0, 0.0), (0, 0));
        assert_eq!(grid.cell_of(212.9, 159.9), (0, 0));
        // Boundary belongs to the next cell
        assert_eq!(grid.cell_of(213.0, 160.0), (1, 1));
        assert_eq!(grid.cell_of(426.0, 320.0), (2, 2));
        // Remainder column 639 folds into the last cell
        assert_eq!(grid.cell_of(639.0, 479.0), (2, 2));
    }

    #[test]
    fn cell_edges_follow_the_integer_cell_size() {
        let grid = grid_640x480();
        // Past 213 but below 640 / 3
        assert_eq!(grid.cell_of(213.2, 0.0), (1, 0));
        assert_eq!(grid.cell_of(0.0, 160.0), (0, 1));
        assert_eq!(grid.cell_of(426.5, 0.0), (2, 0));
    }

    #[test]
    fn slope_is_rounded() {
        assert_eq!(displacement_slope((0.0, 0.0), (10.0, 0.0)), 0.0);
        assert_eq!(displacement_slope((5.0, 5.0), (105.0, 13.74758)), 0.0874757);
        // Pure vertical motion explodes
        assert!(displacement_slope((3.0, 3.0), (3.0, 4.0)) > 1e4);
    }

    #[test]
    fn angle_boundary() {
        let filter = RegionAngleFilter::new(grid_640x480());
        assert!(filter.accepts_slope(0.0874758));
        assert!(filter.accepts_slope(0.0874759));
        assert!(filter.accepts_slope(-0.0874759));
        assert!(!filter.accepts_slope(0.0874760));
        assert!(!filter.accepts_slope(-0.0874760));
    }

    #[test]
    fn accepts_needs_same_cell_and_flat_motion() {
        let filter = RegionAngleFilter::new(grid_640x480());
        assert!(filter.accepts((100.0, 100.0), (110.0, 100.0)));
        assert!(filter.accepts((100.0, 100.0), (100.0, 100.0)));
        // Crosses into the next column
        assert!(!filter.accepts((205.0, 100.0), (215.0, 100.0)));
        // Too steep
        assert!(!filter.accepts((100.0, 100.0), (110.0, 102.0)));
        // Leftward motion is fine too
        assert!(filter.accepts((150.0, 50.0), (140.0, 50.5)));
    }

    proptest! {
        #[test]
        fn every_point_has_one_cell(
            w in 3usize..2000, h in 3usize..2000,
            rows in 1usize..8, cols in 1usize..8,
            fx in 0.0f32..1.0, fy in 0.0f32..1.0,
        ) {
            prop_assume!(w >= cols && h >= rows);
            let grid = RegionGrid::new(w, h, GridSplit { rows, cols }).unwrap();
            let (x, y) = (fx * (w - 1) as f32, fy * (h - 1) as f32);
            let (cx, cy) = grid.cell_of(x, y);
            prop_assert!(cx < cols && cy < rows);
            let (cw, ch) = grid.cell_size();
            if cx + 1 < cols {
                prop_assert_eq!(cx, (x / cw as f32).floor() as usize);
            }
            if cy + 1 < rows {
                prop_assert_eq!(cy, (y / ch as f32).floor() as usize);
            }
        }
    }
}
