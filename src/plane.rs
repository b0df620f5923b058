//! Coordinate plane: maps planner axes onto instrument axes.
//!
//! The planner reasons about three abstract axes, two horizontal (`h0`, `h1`)
//! and the scanning axis (`s`). A [`CoordinatePlane`] binds each of them to a
//! named instrument axis with a polarity, written in configuration as
//! `["-x", "y", "z"]` where a leading `-` marks an inverted axis.

use crate::error::{PlannerError, PlannerResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking an axis with inverted polarity.
pub const NEGATION_MARKER: char = '-';

/// Index of the first horizontal planner axis.
pub const H0: usize = 0;
/// Index of the second horizontal planner axis.
pub const H1: usize = 1;
/// Index of the scanning axis.
pub const SCAN: usize = 2;

/// Direction of an instrument axis relative to the planner axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// Instrument axis grows with the planner axis.
    Positive,
    /// Instrument axis shrinks as the planner axis grows.
    Negative,
}

impl Polarity {
    /// Sign as a multiplier.
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Positive => 1.0,
            Polarity::Negative => -1.0,
        }
    }
}

/// One instrument axis bound to a planner index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisBinding {
    /// Bare instrument axis name (negation marker stripped).
    pub name: String,
    /// Polarity of the instrument axis.
    pub polarity: Polarity,
}

impl AxisBinding {
    /// Parse `"x"` or `"-x"`.
    pub fn parse(raw: &str) -> PlannerResult<Self> {
        let raw = raw.trim();
        let (name, polarity) = match raw.strip_prefix(NEGATION_MARKER) {
            Some(rest) => (rest.trim(), Polarity::Negative),
            None => (raw, Polarity::Positive),
        };
        if name.is_empty() {
            return Err(PlannerError::invalid(
                "coordinate_plane",
                format!("axis '{raw}' has no name"),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            polarity,
        })
    }
}

impl fmt::Display for AxisBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.polarity {
            Polarity::Positive => write!(f, "{}", self.name),
            Polarity::Negative => write!(f, "{}{}", NEGATION_MARKER, self.name),
        }
    }
}

/// Labels for the edges of the planning volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CornerLabel {
    /// Low edge of `h0` under positive polarity.
    Left,
    /// High edge of `h0` under positive polarity.
    Right,
    /// High edge of `h1` under positive polarity.
    Top,
    /// Low edge of `h1` under positive polarity.
    Bottom,
    /// Low edge of the scanning axis under positive polarity.
    Near,
    /// High edge of the scanning axis under positive polarity.
    Far,
}

impl CornerLabel {
    /// Lower-case name, as used in the `bounds_*` change attributes.
    pub fn as_str(self) -> &'static str {
        match self {
            CornerLabel::Left => "left",
            CornerLabel::Right => "right",
            CornerLabel::Top => "top",
            CornerLabel::Bottom => "bottom",
            CornerLabel::Near => "near",
            CornerLabel::Far => "far",
        }
    }
}

impl fmt::Display for CornerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered triple of instrument axes; the third is the scanning axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CoordinatePlane {
    axes: [AxisBinding; 3],
}

impl CoordinatePlane {
    /// Build a plane from three axis strings.
    pub fn new<S: AsRef<str>>(axes: [S; 3]) -> PlannerResult<Self> {
        let parsed = [
            AxisBinding::parse(axes[0].as_ref())?,
            AxisBinding::parse(axes[1].as_ref())?,
            AxisBinding::parse(axes[2].as_ref())?,
        ];
        for i in 0..3 {
            for j in (i + 1)..3 {
                if parsed[i].name == parsed[j].name {
                    return Err(PlannerError::invalid(
                        "coordinate_plane",
                        format!("axis '{}' appears more than once", parsed[i].name),
                    ));
                }
            }
        }
        Ok(Self { axes: parsed })
    }

    /// Binding for planner index `i` (0 = h0, 1 = h1, 2 = scanning).
    pub fn axis(&self, i: usize) -> PlannerResult<&AxisBinding> {
        self.axes
            .get(i)
            .ok_or_else(|| PlannerError::invalid("axis_index", format!("{i} is not in 0..3")))
    }

    /// All three bindings in planner order.
    pub fn axes(&self) -> &[AxisBinding; 3] {
        &self.axes
    }

    /// Name of the scanning axis.
    pub fn scan_axis(&self) -> &AxisBinding {
        &self.axes[SCAN]
    }

    /// Planner index for a bare or signed instrument axis name.
    pub fn index_of(&self, name: &str) -> PlannerResult<usize> {
        let bare = name.trim().trim_start_matches(NEGATION_MARKER);
        self.axes
            .iter()
            .position(|a| a.name == bare)
            .ok_or_else(|| PlannerError::AxisUnknown(name.to_string()))
    }

    /// Per-axis polarity signs.
    pub fn signs(&self) -> [f64; 3] {
        [
            self.axes[0].polarity.sign(),
            self.axes[1].polarity.sign(),
            self.axes[2].polarity.sign(),
        ]
    }

    /// Apply per-component polarity to a planner vector.
    pub fn orient(&self, v: [f64; 3]) -> [f64; 3] {
        let s = self.signs();
        [v[0] * s[0], v[1] * s[1], v[2] * s[2]]
    }

    /// Labels of the (low, high) edges of planner axis `i` in logical orientation.
    ///
    /// An inverted axis swaps its labels, so the input labelled `LEFT` always
    /// refers to the visually-left edge.
    pub fn logical_corner_label(&self, i: usize) -> PlannerResult<(CornerLabel, CornerLabel)> {
        let (low, high) = match i {
            H0 => (CornerLabel::Left, CornerLabel::Right),
            H1 => (CornerLabel::Bottom, CornerLabel::Top),
            SCAN => (CornerLabel::Near, CornerLabel::Far),
            _ => {
                return Err(PlannerError::invalid(
                    "axis_index",
                    format!("{i} is not in 0..3"),
                ))
            }
        };
        Ok(match self.axes[i].polarity {
            Polarity::Positive => (low, high),
            Polarity::Negative => (high, low),
        })
    }
}

impl Default for CoordinatePlane {
    fn default() -> Self {
        Self {
            axes: [
                AxisBinding {
                    name: "x".into(),
                    polarity: Polarity::Positive,
                },
                AxisBinding {
                    name: "y".into(),
                    polarity: Polarity::Positive,
                },
                AxisBinding {
                    name: "z".into(),
                    polarity: Polarity::Positive,
                },
            ],
        }
    }
}

impl TryFrom<Vec<String>> for CoordinatePlane {
    type Error = PlannerError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        match <[String; 3]>::try_from(value) {
            Ok(axes) => CoordinatePlane::new(axes),
            Err(v) => Err(PlannerError::invalid(
                "coordinate_plane",
                format!("expected 3 axes, got {}", v.len()),
            )),
        }
    }
}

impl From<CoordinatePlane> for Vec<String> {
    fn from(value: CoordinatePlane) -> Self {
        value.axes.iter().map(ToString::to_string).collect()
    }
}
