//! Dimensioned length quantities.
//!
//! Configuration limits are typically declared in millimetres while step sizes
//! are always reasoned about in microns. Every conversion between the two goes
//! through [`Quantity::to`], never through ad-hoc scale factors.

use crate::error::{PlannerError, PlannerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};
use std::str::FromStr;

/// Length units understood by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthUnit {
    /// Millimetre.
    #[serde(rename = "mm")]
    Millimeter,
    /// Micrometre.
    #[serde(rename = "um", alias = "µm")]
    Micrometer,
    /// Nanometre.
    #[serde(rename = "nm")]
    Nanometer,
}

impl LengthUnit {
    /// Size of one unit expressed in nanometres.
    fn nanometers(self) -> f64 {
        match self {
            LengthUnit::Millimeter => 1.0e6,
            LengthUnit::Micrometer => 1.0e3,
            LengthUnit::Nanometer => 1.0,
        }
    }

    /// Short symbol used in labels and error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnit::Millimeter => "mm",
            LengthUnit::Micrometer => "µm",
            LengthUnit::Nanometer => "nm",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for LengthUnit {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mm" | "millimeter" | "millimeters" => Ok(LengthUnit::Millimeter),
            "um" | "µm" | "micron" | "microns" | "micrometer" | "micrometers" => {
                Ok(LengthUnit::Micrometer)
            }
            "nm" | "nanometer" | "nanometers" => Ok(LengthUnit::Nanometer),
            other => Err(PlannerError::invalid(
                "unit",
                format!("unsupported length unit '{other}'"),
            )),
        }
    }
}

/// A scalar tagged with its length unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// Magnitude in `unit`.
    pub value: f64,
    /// Unit of `value`.
    pub unit: LengthUnit,
}

impl Quantity {
    /// Create a new quantity.
    pub fn new(value: f64, unit: LengthUnit) -> Self {
        Self { value, unit }
    }

    /// Shorthand for a micrometre quantity.
    pub fn microns(value: f64) -> Self {
        Self::new(value, LengthUnit::Micrometer)
    }

    /// Convert into `target`.
    pub fn to(self, target: LengthUnit) -> Quantity {
        if self.unit == target {
            return self;
        }
        Quantity {
            value: self.value * self.unit.nanometers() / target.nanometers(),
            unit: target,
        }
    }

    /// Magnitude in micrometres.
    pub fn to_microns(self) -> f64 {
        self.to(LengthUnit::Micrometer).value
    }

    /// Add two quantities of the same unit.
    pub fn checked_add(self, other: Quantity) -> PlannerResult<Quantity> {
        self.require_same_unit(other)?;
        Ok(Quantity::new(self.value + other.value, self.unit))
    }

    /// Subtract two quantities of the same unit.
    pub fn checked_sub(self, other: Quantity) -> PlannerResult<Quantity> {
        self.require_same_unit(other)?;
        Ok(Quantity::new(self.value - other.value, self.unit))
    }

    /// Ratio of two quantities of the same unit (dimensionless).
    pub fn ratio(self, other: Quantity) -> PlannerResult<f64> {
        self.require_same_unit(other)?;
        Ok(self.value / other.value)
    }

    fn require_same_unit(self, other: Quantity) -> PlannerResult<()> {
        if self.unit == other.unit {
            Ok(())
        } else {
            Err(PlannerError::UnitMismatch {
                left: self.unit.to_string(),
                right: other.unit.to_string(),
            })
        }
    }
}

impl Mul<f64> for Quantity {
    type Output = Quantity;

    fn mul(self, rhs: f64) -> Quantity {
        Quantity::new(self.value * rhs, self.unit)
    }
}

impl Div<f64> for Quantity {
    type Output = Quantity;

    fn div(self, rhs: f64) -> Quantity {
        Quantity::new(self.value / rhs, self.unit)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
