//! Scan-axis model.
//!
//! Each tile carries a `(scan_start, scan_end)` range along the scanning axis,
//! in the planner's declared unit. Channels discretise that volume into
//! `steps` slices of `step_size` µm; one of the two is edited by the user and
//! the other is derived.
//!
//! Step arithmetic always converts the volume to microns through
//! [`Quantity::to_microns`]. Degenerate inputs (zero volume, zero step,
//! non-finite ratios) collapse both values to zero instead of failing.

use crate::error::{PlannerError, PlannerResult};
use crate::grid::GridShape;
use crate::tile_matrix::{Seeding, TileArray, TileStore};
use crate::units::{LengthUnit, Quantity};
use crate::validation::require_finite;
use serde::{Deserialize, Serialize};

/// Decimal places kept on derived step sizes.
pub const STEP_SIZE_DECIMALS: i32 = 4;

/// One channel's discretisation of a tile volume.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Discretization {
    /// Distance between slices in µm.
    pub step_size_um: f64,
    /// Number of slices.
    pub steps: i64,
}

impl Discretization {
    /// Both values zero.
    pub const ZERO: Discretization = Discretization {
        step_size_um: 0.0,
        steps: 0,
    };

    /// Derive `steps` from a requested step size, then renormalise the step size.
    pub fn from_step_size(volume_um: f64, step_size_um: f64) -> Self {
        if !usable(volume_um) || !usable(step_size_um) {
            return Self::ZERO;
        }
        let steps = (volume_um / step_size_um).round();
        Self::from_step_count(volume_um, steps)
    }

    /// Derive the step size from a requested number of steps.
    pub fn from_steps(volume_um: f64, steps: i64) -> Self {
        if !usable(volume_um) || steps <= 0 {
            return Self::ZERO;
        }
        Self::from_step_count(volume_um, steps as f64)
    }

    fn from_step_count(volume_um: f64, steps: f64) -> Self {
        if !steps.is_finite() || steps < 1.0 || steps > i64::MAX as f64 {
            return Self::ZERO;
        }
        let step_size = round_decimals(volume_um / steps, STEP_SIZE_DECIMALS);
        if !usable(step_size) {
            return Self::ZERO;
        }
        Self {
            step_size_um: step_size,
            steps: steps as i64,
        }
    }
}

fn usable(value: f64) -> bool {
    value.is_finite() && value != 0.0
}

/// Round `value` to `decimals` decimal places.
pub fn round_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Per-tile scan ranges.
#[derive(Debug, Clone)]
pub struct ScanAxisPlan {
    unit: LengthUnit,
    starts: TileArray<f64>,
    ends: TileArray<f64>,
    default_start: f64,
    apply_all: bool,
}

impl ScanAxisPlan {
    /// Zero-volume ranges at `default_start` for every tile of `shape`.
    pub fn new(unit: LengthUnit, shape: GridShape, default_start: f64, apply_all: bool) -> Self {
        Self {
            unit,
            starts: TileArray::filled(shape, default_start),
            ends: TileArray::filled(shape, default_start),
            default_start,
            apply_all,
        }
    }

    /// Declared unit of the scan positions.
    pub fn unit(&self) -> LengthUnit {
        self.unit
    }

    /// Scan start of tile `(row, col)`.
    pub fn start(&self, row: usize, col: usize) -> PlannerResult<f64> {
        self.starts.at("scan_starts", row, col).copied()
    }

    /// Scan end of tile `(row, col)`.
    pub fn end(&self, row: usize, col: usize) -> PlannerResult<f64> {
        self.ends.at("scan_ends", row, col).copied()
    }

    /// All scan starts.
    pub fn starts(&self) -> &TileArray<f64> {
        &self.starts
    }

    /// All scan ends.
    pub fn ends(&self) -> &TileArray<f64> {
        &self.ends
    }

    /// Scanned extent of tile `(row, col)` in the declared unit.
    pub fn volume(&self, row: usize, col: usize) -> PlannerResult<Quantity> {
        let start = Quantity::new(self.start(row, col)?, self.unit);
        let end = Quantity::new(self.end(row, col)?, self.unit);
        end.checked_sub(start)
    }

    /// Scanned extent of tile `(row, col)` in µm.
    pub fn volume_um(&self, row: usize, col: usize) -> PlannerResult<f64> {
        Ok(self.volume(row, col)?.to_microns())
    }

    /// Whether writes broadcast to every tile.
    pub fn apply_all(&self) -> bool {
        self.apply_all
    }

    /// Switch apply-all.
    ///
    /// Does not broadcast; the planner broadcasts every store together
    /// through [`TileMatrix::broadcast_from_origin`].
    ///
    /// [`TileMatrix::broadcast_from_origin`]: crate::tile_matrix::TileMatrix::broadcast_from_origin
    pub fn set_apply_all(&mut self, apply_all: bool) {
        self.apply_all = apply_all;
    }

    /// Start used for tiles created while apply-all is off.
    pub fn default_start(&self) -> f64 {
        self.default_start
    }

    /// Move the default start (driven by the scanning-axis grid offset).
    ///
    /// While apply-all is on every tile adopts the new start; ends that would
    /// fall below it are raised to keep `start <= end`. Returns `(starts_changed,
    /// ends_changed)`.
    pub fn set_default_start(&mut self, start: f64) -> PlannerResult<(bool, bool)> {
        let start = require_finite("grid_offset_2", start)?;
        self.default_start = start;
        if !self.apply_all {
            return Ok((false, false));
        }
        let starts_changed = self.starts.iter().any(|(_, v)| *v != start);
        let ends_changed = self.ends.iter().any(|(_, v)| *v < start);
        self.starts.fill(start);
        for end in self.ends.cells_mut() {
            if *end < start {
                *end = start;
            }
        }
        Ok((starts_changed, ends_changed))
    }

    /// Write the scan start of tile `(row, col)` (every tile under apply-all).
    ///
    /// Rejects starts beyond the tile's end. Returns whether anything changed.
    pub fn set_start(&mut self, row: usize, col: usize, start: f64) -> PlannerResult<bool> {
        let start = require_finite("scan_starts", start)?;
        let end = self.end(row, col)?;
        if start > end {
            return Err(PlannerError::invalid(
                "scan_starts",
                format!("start {start} exceeds end {end} at tile ({row}, {col})"),
            ));
        }
        Ok(write(&mut self.starts, self.apply_all, row, col, start))
    }

    /// Write the scan end of tile `(row, col)` (every tile under apply-all).
    ///
    /// Rejects ends before the tile's start. Returns whether anything changed.
    pub fn set_end(&mut self, row: usize, col: usize, end: f64) -> PlannerResult<bool> {
        let end = require_finite("scan_ends", end)?;
        let start = self.start(row, col)?;
        if end < start {
            return Err(PlannerError::invalid(
                "scan_ends",
                format!("end {end} precedes start {start} at tile ({row}, {col})"),
            ));
        }
        Ok(write(&mut self.ends, self.apply_all, row, col, end))
    }
}

fn write(array: &mut TileArray<f64>, apply_all: bool, row: usize, col: usize, value: f64) -> bool {
    if apply_all {
        let changed = array.iter().any(|(_, v)| *v != value);
        array.fill(value);
        changed
    } else {
        let changed = array.get(row, col) != Some(&value);
        // coordinates were validated by the caller's start/end lookup
        let _ = array.set(row, col, value);
        changed
    }
}

impl TileStore for ScanAxisPlan {
    fn reshape(&mut self, shape: GridShape, seeding: Seeding) {
        let default = self.default_start;
        self.starts.reshape_seeded(shape, seeding, &default);
        self.ends.reshape_seeded(shape, seeding, &default);
    }

    fn broadcast_from_origin(&mut self) {
        self.starts.broadcast_from_origin();
        self.ends.broadcast_from_origin();
    }
}
