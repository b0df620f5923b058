//! Field-of-view tracking.
//!
//! The device layer pushes the current stage position in planner axis order
//! `(h0, h1, s)`. Axes whose anchor is off mirror that position into the
//! grid offset; anchored axes keep the user's offset.

use crate::error::PlannerResult;
use crate::validation::{require_axis_index, require_finite};

/// Anchor flags and the last reported position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FovTracker {
    anchors: [bool; 3],
    position: [f64; 3],
}

impl FovTracker {
    /// Tracker with every axis following the FOV at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reported position.
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    /// Anchor flags.
    pub fn anchors(&self) -> [bool; 3] {
        self.anchors
    }

    /// Whether axis `index` is anchored.
    pub fn is_anchored(&self, index: usize) -> bool {
        self.anchors.get(index).copied().unwrap_or(false)
    }

    /// Set the anchor of axis `index`; returns whether it changed.
    ///
    /// Releasing an anchor snaps that axis's offset back to the FOV position.
    pub fn set_anchor(
        &mut self,
        index: usize,
        anchored: bool,
        offsets: &mut [f64; 3],
    ) -> PlannerResult<bool> {
        let index = require_axis_index(&format!("anchor_{index}"), index)?;
        if self.anchors[index] == anchored {
            return Ok(false);
        }
        self.anchors[index] = anchored;
        if !anchored {
            offsets[index] = self.position[index];
        }
        Ok(true)
    }

    /// Record a new FOV position and mirror it into non-anchored offsets.
    ///
    /// Returns the axes whose offset changed, in index order.
    pub fn apply(
        &mut self,
        position: [f64; 3],
        offsets: &mut [f64; 3],
    ) -> PlannerResult<Vec<usize>> {
        for value in position {
            require_finite("fov_position", value)?;
        }
        self.position = position;
        let mut changed = Vec::new();
        for axis in 0..3 {
            if !self.anchors[axis] && offsets[axis] != position[axis] {
                offsets[axis] = position[axis];
                changed.push(axis);
            }
        }
        Ok(changed)
    }
}
