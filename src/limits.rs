//! Per-axis travel limits.
//!
//! Limits come from the instrument configuration and are keyed by instrument
//! axis name. The planner clamps bounds and grid offsets into them.

use crate::error::{PlannerError, PlannerResult};
use crate::plane::CoordinatePlane;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed interval `[lo, hi]` in the declared unit. Infinite bounds are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct Limits {
    lo: f64,
    hi: f64,
}

impl Limits {
    /// Create limits, rejecting `lo > hi` and NaN.
    pub fn new(lo: f64, hi: f64) -> PlannerResult<Self> {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(PlannerError::invalid(
                "axis_limits",
                format!("[{lo}, {hi}] is not an ordered interval"),
            ));
        }
        Ok(Self { lo, hi })
    }

    /// Limits that never clamp.
    pub fn unbounded() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
        }
    }

    /// Lower bound.
    pub fn lo(&self) -> f64 {
        self.lo
    }

    /// Upper bound.
    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// True when `value` lies inside the interval.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }

    /// Clamp `value` into the interval.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl TryFrom<[f64; 2]> for Limits {
    type Error = PlannerError;

    fn try_from(value: [f64; 2]) -> Result<Self, Self::Error> {
        Limits::new(value[0], value[1])
    }
}

impl From<Limits> for [f64; 2] {
    fn from(value: Limits) -> Self {
        [value.lo, value.hi]
    }
}

/// Limits resolved to planner axis order (h0, h1, s).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaneLimits {
    axes: [Limits; 3],
}

impl PlaneLimits {
    /// Resolve named limits against a plane.
    ///
    /// Axes without an entry are unbounded. Entries naming an axis the plane
    /// does not carry are rejected.
    pub fn resolve(
        plane: &CoordinatePlane,
        limits: &BTreeMap<String, Limits>,
    ) -> PlannerResult<Self> {
        let mut axes = [Limits::unbounded(); 3];
        for (name, lim) in limits {
            let index = plane.index_of(name)?;
            axes[index] = *lim;
        }
        Ok(Self { axes })
    }

    /// Limits of planner axis `index`.
    pub fn axis(&self, index: usize) -> Limits {
        self.axes.get(index).copied().unwrap_or_default()
    }
}
