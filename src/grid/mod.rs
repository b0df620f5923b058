//! Tile grid layouts.
//!
//! A [`GridPlan`] turns a [`GridSpec`] and the field-of-view size into an
//! ordered, restartable [`TileSequence`] of `(row, col, x, y)` tiles.
//!
//! # Layout rules
//!
//! - The step between adjacent tiles is `fov · (1 − overlap)` per axis.
//! - NUMBER mode uses the requested rows/columns; AREA mode derives them from
//!   `⌈height / step_h1⌉` and `⌈width / step_h0⌉`; BOUNDS mode derives them
//!   from the edge spans. Fractional counts round up and a degenerate span
//!   still yields one tile.
//! - Row 0 is the top row: `y` decreases as the row index grows.
//! - NUMBER and AREA grids are placed relative to the grid offset and extend
//!   in the polarity direction of each axis. BOUNDS grids are absolute.
//! - BOUNDS edges are instrument coordinates; the planner names them after the
//!   logical corner labels of its coordinate plane when reporting errors.
//! - A layout never holds more than [`MAX_TILES`] tiles.
//!
//! # Example
//!
//! ```
//! use voxel_planner::grid::{FovDimensions, GridPlan, GridSpec};
//!
//! let spec = GridSpec { rows: 2, columns: 1, ..GridSpec::default() };
//! let plan = GridPlan::new(&spec, FovDimensions::new(1.0, 1.0)).unwrap();
//! let ys: Vec<f64> = plan.sequence().iter().map(|t| t.y).collect();
//! assert_eq!(ys, vec![0.5, -0.5]);
//! ```

mod traversal;

pub use traversal::TileOrder;

use crate::error::{PlannerError, PlannerResult};
use crate::validation::{
    require_finite, require_non_negative, require_open_interval, require_positive_count,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tolerance applied before rounding tile counts up.
const COUNT_EPSILON: f64 = 1e-9;

/// Largest number of tiles a single layout may hold.
pub const MAX_TILES: usize = 100_000;

/// How the grid extent is specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridMode {
    /// Explicit rows and columns.
    #[default]
    Number,
    /// Width and height to cover.
    Area,
    /// Absolute edges to cover.
    Bounds,
}

/// Where a NUMBER/AREA grid is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelativeTo {
    /// Grid centred on the offset.
    #[default]
    Center,
    /// First tile on the offset.
    OriginCorner,
}

/// User description of the tile grid.
///
/// All fields are retained across mode switches; only the ones relevant to
/// `mode` participate in the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// Extent mode.
    pub mode: GridMode,
    /// Rows (NUMBER).
    pub rows: usize,
    /// Columns (NUMBER).
    pub columns: usize,
    /// Width along h0 (AREA).
    pub width: f64,
    /// Height along h1 (AREA).
    pub height: f64,
    /// Low h0 edge (BOUNDS).
    pub left: f64,
    /// High h0 edge (BOUNDS).
    pub right: f64,
    /// High h1 edge (BOUNDS).
    pub top: f64,
    /// Low h1 edge (BOUNDS).
    pub bottom: f64,
    /// Fractional overlap between neighbours, in (−1, 1). Negative leaves a gap.
    pub overlap: f64,
    /// Traversal order.
    pub order: TileOrder,
    /// Emit the traversal backwards.
    pub reverse: bool,
    /// Anchoring of NUMBER/AREA grids.
    pub relative_to: RelativeTo,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            mode: GridMode::Number,
            rows: 1,
            columns: 1,
            width: 0.0,
            height: 0.0,
            left: 0.0,
            right: 0.0,
            top: 0.0,
            bottom: 0.0,
            overlap: 0.0,
            order: TileOrder::RowWise,
            reverse: false,
            relative_to: RelativeTo::Center,
        }
    }
}

impl GridSpec {
    /// Check every field against its declared domain.
    pub fn validate(&self) -> PlannerResult<()> {
        require_open_interval("overlap", self.overlap, -1.0, 1.0)?;
        require_positive_count("rows", self.rows)?;
        require_positive_count("columns", self.columns)?;
        require_non_negative("area_width", self.width)?;
        require_non_negative("area_height", self.height)?;
        require_finite("bounds_left", self.left)?;
        require_finite("bounds_right", self.right)?;
        require_finite("bounds_top", self.top)?;
        require_finite("bounds_bottom", self.bottom)?;
        if self.left > self.right {
            return Err(PlannerError::invalid(
                "bounds_left",
                format!("left {} exceeds right {}", self.left, self.right),
            ));
        }
        if self.bottom > self.top {
            return Err(PlannerError::invalid(
                "bounds_bottom",
                format!("bottom {} exceeds top {}", self.bottom, self.top),
            ));
        }
        Ok(())
    }
}

/// Field-of-view size per planner axis.
///
/// The scanning dimension is conventionally zero; tile thickness comes from
/// the per-tile scan range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FovDimensions {
    /// Extent along h0.
    pub h0: f64,
    /// Extent along h1.
    pub h1: f64,
    /// Extent along the scanning axis.
    #[serde(default)]
    pub s: f64,
}

impl FovDimensions {
    /// Horizontal field of view with zero scan thickness.
    pub fn new(h0: f64, h1: f64) -> Self {
        Self { h0, h1, s: 0.0 }
    }

    /// Reject negative or non-finite extents.
    pub fn validate(&self) -> PlannerResult<()> {
        require_non_negative("fov_dimensions", self.h0)?;
        require_non_negative("fov_dimensions", self.h1)?;
        require_non_negative("fov_dimensions", self.s)?;
        Ok(())
    }
}

/// One acquisition position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Matrix row.
    pub row: usize,
    /// Matrix column.
    pub col: usize,
    /// Position along h0.
    pub x: f64,
    /// Position along h1.
    pub y: f64,
}

/// Matrix shape of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    /// Row count.
    pub rows: usize,
    /// Column count.
    pub columns: usize,
}

impl GridShape {
    /// Create a shape.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns }
    }

    /// Number of cells, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.rows.saturating_mul(self.columns)
    }

    /// True when the shape holds no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Translation and per-axis direction applied to NUMBER/AREA layouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Grid offset along (h0, h1).
    pub origin: [f64; 2],
    /// Polarity sign along (h0, h1).
    pub signs: [f64; 2],
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0],
            signs: [1.0, 1.0],
        }
    }
}

/// Computed layout for one [`GridSpec`].
#[derive(Debug, Clone)]
pub struct GridPlan {
    mode: GridMode,
    order: TileOrder,
    reverse: bool,
    shape: GridShape,
    step: [f64; 2],
    start: [f64; 2],
    placement: Placement,
}

impl GridPlan {
    /// Compute the layout of `spec` for a field of view `fov`.
    pub fn new(spec: &GridSpec, fov: FovDimensions) -> PlannerResult<Self> {
        spec.validate()?;
        fov.validate()?;

        let dx = fov.h0 * (1.0 - spec.overlap);
        let dy = fov.h1 * (1.0 - spec.overlap);

        let shape = match spec.mode {
            GridMode::Number => {
                require_tile_total(GridShape::new(spec.rows, spec.columns), ("rows", "columns"))?
            }
            GridMode::Area => {
                require_positive_step(dx, dy)?;
                let shape = GridShape::new(
                    tile_count("area_height", spec.height, dy)?,
                    tile_count("area_width", spec.width, dx)?,
                );
                require_tile_total(shape, ("area_height", "area_width"))?
            }
            GridMode::Bounds => {
                require_positive_step(dx, dy)?;
                let shape = GridShape::new(
                    tile_count("bounds_top", spec.top - spec.bottom, dy)?,
                    tile_count("bounds_right", spec.right - spec.left, dx)?,
                );
                require_tile_total(shape, ("bounds_top", "bounds_right"))?
            }
        };

        let start = match (spec.mode, spec.relative_to) {
            (GridMode::Bounds, _) => [spec.left, spec.top],
            (_, RelativeTo::Center) => [
                -((shape.columns - 1) as f64 * dx) / 2.0,
                ((shape.rows - 1) as f64 * dy) / 2.0,
            ],
            (_, RelativeTo::OriginCorner) => [0.0, 0.0],
        };

        Ok(Self {
            mode: spec.mode,
            order: spec.order,
            reverse: spec.reverse,
            shape,
            step: [dx, dy],
            start,
            placement: Placement::default(),
        })
    }

    /// Position NUMBER/AREA layouts; BOUNDS layouts stay absolute.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        if self.mode != GridMode::Bounds {
            self.placement = placement;
        }
        self
    }

    /// Matrix shape.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Distance between neighbouring tile centres along (h0, h1).
    pub fn step(&self) -> [f64; 2] {
        self.step
    }

    /// Restartable sequence of tiles in traversal order.
    pub fn sequence(&self) -> TileSequence {
        let spiral = match self.order {
            TileOrder::Spiral => Some(Arc::from(traversal::spiral_cells(
                self.shape.rows,
                self.shape.columns,
            ))),
            _ => None,
        };
        TileSequence {
            order: self.order,
            reverse: self.reverse,
            shape: self.shape,
            step: self.step,
            start: self.start,
            placement: self.placement,
            spiral,
        }
    }
}

fn require_positive_step(dx: f64, dy: f64) -> PlannerResult<()> {
    if dx > 0.0 && dy > 0.0 && dx.is_finite() && dy.is_finite() {
        Ok(())
    } else {
        Err(PlannerError::invalid(
            "overlap",
            format!("tile step ({dx}, {dy}) must be positive; check overlap and field of view"),
        ))
    }
}

/// Tiles needed to cover `span` at `step`; at least one.
fn tile_count(field: &'static str, span: f64, step: f64) -> PlannerResult<usize> {
    let raw = (span / step - COUNT_EPSILON).ceil();
    if !raw.is_finite() || raw > MAX_TILES as f64 {
        return Err(PlannerError::invalid(
            field,
            format!("span {span} at step {step} needs more than {MAX_TILES} tiles"),
        ));
    }
    Ok(if raw >= 1.0 { raw as usize } else { 1 })
}

fn require_tile_total(
    shape: GridShape,
    (rows_field, columns_field): (&'static str, &'static str),
) -> PlannerResult<GridShape> {
    if shape.rows > MAX_TILES {
        return Err(PlannerError::invalid(
            rows_field,
            format!("{} rows exceed the {MAX_TILES} tile limit", shape.rows),
        ));
    }
    match shape.rows.checked_mul(shape.columns) {
        Some(total) if total <= MAX_TILES => Ok(shape),
        _ => Err(PlannerError::invalid(
            columns_field,
            format!(
                "{} x {} tiles exceed the {MAX_TILES} tile limit",
                shape.rows, shape.columns
            ),
        )),
    }
}

/// Ordered, finite, restartable sequence of tiles.
///
/// Cloning is cheap; iterating twice yields the same tiles.
#[derive(Debug, Clone)]
pub struct TileSequence {
    order: TileOrder,
    reverse: bool,
    shape: GridShape,
    step: [f64; 2],
    start: [f64; 2],
    placement: Placement,
    spiral: Option<Arc<[(usize, usize)]>>,
}

impl TileSequence {
    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.shape.len()
    }

    /// True when the sequence holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matrix shape of the underlying layout.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Tile at traversal position `k`.
    pub fn get(&self, k: usize) -> Option<Tile> {
        let n = self.len();
        if k >= n {
            return None;
        }
        let k = if self.reverse { n - 1 - k } else { k };
        let (row, col) = match &self.spiral {
            Some(cells) => *cells.get(k)?,
            None => traversal::rect_cell(self.order, self.shape.rows, self.shape.columns, k)?,
        };
        let lx = self.start[0] + col as f64 * self.step[0];
        let ly = self.start[1] - row as f64 * self.step[1];
        Some(Tile {
            row,
            col,
            x: self.placement.origin[0] + self.placement.signs[0] * lx,
            y: self.placement.origin[1] + self.placement.signs[1] * ly,
        })
    }

    /// Iterate tiles in traversal order.
    pub fn iter(&self) -> TileIter<'_> {
        TileIter {
            sequence: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Collect every tile.
    pub fn to_vec(&self) -> Vec<Tile> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a TileSequence {
    type Item = Tile;
    type IntoIter = TileIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`TileSequence`].
#[derive(Debug, Clone)]
pub struct TileIter<'a> {
    sequence: &'a TileSequence,
    front: usize,
    back: usize,
}

impl Iterator for TileIter<'_> {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.front >= self.back {
            return None;
        }
        let tile = self.sequence.get(self.front);
        self.front += 1;
        tile
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for TileIter<'_> {
    fn next_back(&mut self) -> Option<Tile> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.sequence.get(self.back)
    }
}

impl ExactSizeIterator for TileIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn fov1() -> FovDimensions {
        FovDimensions::new(1.0, 1.0)
    }

    #[test]
    fn centered_number_grid() {
        let spec = GridSpec {
            rows: 2,
            columns: 1,
            ..GridSpec::default()
        };
        let tiles = GridPlan::new(&spec, fov1()).unwrap().sequence().to_vec();
        assert_eq!(
            tiles,
            vec![
                Tile {
                    row: 0,
                    col: 0,
                    x: 0.0,
                    y: 0.5,
                },
                Tile {
                    row: 1,
                    col: 0,
                    x: 0.0,
                    y: -0.5,
                },
            ]
        );
    }

    #[test]
    fn origin_corner_extends_in_polarity_direction() {
        let spec = GridSpec {
            rows: 2,
            columns: 2,
            relative_to: RelativeTo::OriginCorner,
            ..GridSpec::default()
        };
        let plan = GridPlan::new(&spec, fov1()).unwrap().with_placement(Placement {
            origin: [10.0, 5.0],
            signs: [-1.0, 1.0],
        });
        let tiles = plan.sequence().to_vec();
        assert_eq!(
            tiles[0],
            Tile {
                row: 0,
                col: 0,
                x: 10.0,
                y: 5.0,
            }
        );
        assert_eq!(
            tiles[1],
            Tile {
                row: 0,
                col: 1,
                x: 9.0,
                y: 5.0,
            }
        );
        assert_eq!(
            tiles[2],
            Tile {
                row: 1,
                col: 0,
                x: 10.0,
                y: 4.0,
            }
        );
    }

    #[test]
    fn overlap_shrinks_step() {
        let spec = GridSpec {
            rows: 1,
            columns: 3,
            overlap: 0.25,
            ..GridSpec::default()
        };
        let plan = GridPlan::new(&spec, FovDimensions::new(2.0, 2.0)).unwrap();
        assert_eq!(plan.step(), [1.5, 1.5]);
        let xs: Vec<f64> = plan.sequence().iter().map(|t| t.x).collect();
        assert_eq!(xs, vec![-1.5, 0.0, 1.5]);
    }

    #[test]
    fn area_mode_rounds_up() {
        let spec = GridSpec {
            mode: GridMode::Area,
            width: 2.5,
            height: 3.0,
            ..GridSpec::default()
        };
        let plan = GridPlan::new(&spec, fov1()).unwrap();
        assert_eq!(plan.shape(), GridShape::new(3, 3));
    }

    #[test]
    fn zero_area_emits_single_tile() {
        let spec = GridSpec {
            mode: GridMode::Area,
            ..GridSpec::default()
        };
        let plan = GridPlan::new(&spec, fov1()).unwrap();
        assert_eq!(plan.sequence().len(), 1);
    }

    #[test]
    fn bounds_mode_is_absolute() {
        let spec = GridSpec {
            mode: GridMode::Bounds,
            left: 0.0,
            right: 2.0,
            bottom: 0.0,
            top: 3.0,
            ..GridSpec::default()
        };
        let plan = GridPlan::new(&spec, fov1()).unwrap().with_placement(Placement {
            origin: [100.0, 100.0],
            signs: [-1.0, -1.0],
        });
        assert_eq!(plan.shape(), GridShape::new(3, 2));
        for tile in plan.sequence().iter() {
            assert!((0.0..=2.0).contains(&tile.x));
            assert!((0.0..=3.0).contains(&tile.y));
        }
    }

    #[test]
    fn reverse_flips_traversal() {
        let spec = GridSpec {
            rows: 2,
            columns: 2,
            order: TileOrder::RowWiseSnake,
            ..GridSpec::default()
        };
        let forward = GridPlan::new(&spec, fov1()).unwrap().sequence().to_vec();
        let reversed_spec = GridSpec {
            reverse: true,
            ..spec
        };
        let mut backward = GridPlan::new(&reversed_spec, fov1())
            .unwrap()
            .sequence()
            .to_vec();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn sequence_is_restartable_and_double_ended() {
        let spec = GridSpec {
            rows: 3,
            columns: 2,
            order: TileOrder::Spiral,
            ..GridSpec::default()
        };
        let seq = GridPlan::new(&spec, fov1()).unwrap().sequence();
        let first: Vec<Tile> = seq.iter().collect();
        let second: Vec<Tile> = seq.iter().collect();
        assert_eq!(first, second);
        let mut rev: Vec<Tile> = seq.iter().rev().collect();
        rev.reverse();
        assert_eq!(first, rev);
        assert_eq!(seq.iter().len(), 6);
    }

    #[test]
    fn rejects_invalid_specs() {
        let bad_overlap = GridSpec {
            overlap: 1.0,
            ..GridSpec::default()
        };
        assert!(GridPlan::new(&bad_overlap, fov1()).is_err());

        let bad_rows = GridSpec {
            rows: 0,
            ..GridSpec::default()
        };
        assert!(GridPlan::new(&bad_rows, fov1()).is_err());

        let inverted = GridSpec {
            mode: GridMode::Bounds,
            left: 3.0,
            right: 1.0,
            ..GridSpec::default()
        };
        assert!(GridPlan::new(&inverted, fov1()).is_err());

        let no_fov = GridSpec {
            mode: GridMode::Area,
            width: 1.0,
            ..GridSpec::default()
        };
        assert!(GridPlan::new(&no_fov, FovDimensions::new(0.0, 0.0)).is_err());
    }

    fn rejected_field(spec: &GridSpec) -> String {
        match GridPlan::new(spec, fov1()) {
            Err(PlannerError::InvalidInput { field, .. }) => field,
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn oversized_layouts_are_rejected() {
        let huge_area = GridSpec {
            mode: GridMode::Area,
            width: 1e10,
            height: 1e10,
            ..GridSpec::default()
        };
        assert_eq!(rejected_field(&huge_area), "area_height");

        let huge_bounds = GridSpec {
            mode: GridMode::Bounds,
            left: -1e300,
            right: 1e300,
            bottom: 0.0,
            top: 1e300,
            ..GridSpec::default()
        };
        assert_eq!(rejected_field(&huge_bounds), "bounds_top");

        let max_rows = GridSpec {
            rows: usize::MAX,
            ..GridSpec::default()
        };
        assert_eq!(rejected_field(&max_rows), "rows");

        let overflowing = GridSpec {
            rows: MAX_TILES,
            columns: usize::MAX,
            ..GridSpec::default()
        };
        assert_eq!(rejected_field(&overflowing), "columns");

        let too_many = GridSpec {
            rows: 1_000,
            columns: 1_000,
            ..GridSpec::default()
        };
        assert_eq!(rejected_field(&too_many), "columns");
    }

    #[test]
    fn layout_at_tile_limit_is_accepted() {
        let spec = GridSpec {
            rows: 100,
            columns: MAX_TILES / 100,
            ..GridSpec::default()
        };
        let plan = GridPlan::new(&spec, fov1()).unwrap();
        assert_eq!(plan.sequence().len(), MAX_TILES);
    }
}
