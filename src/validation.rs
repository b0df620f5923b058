//! Input validation helpers shared by the planner setters.
//!
//! Every helper names the rejected field so the resulting
//! [`PlannerError::InvalidInput`] can be traced back to the setter vocabulary.

use crate::error::{PlannerError, PlannerResult};

/// Validates that a value is a finite number.
pub fn require_finite(field: &str, value: f64) -> PlannerResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PlannerError::invalid(field, format!("{value} is not finite")))
    }
}

/// Validates that a value is finite and not negative.
pub fn require_non_negative(field: &str, value: f64) -> PlannerResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(PlannerError::invalid(
            field,
            format!("{value} must be a non-negative number"),
        ))
    }
}

/// Validates that a value lies strictly inside `(lo, hi)`.
pub fn require_open_interval(field: &str, value: f64, lo: f64, hi: f64) -> PlannerResult<f64> {
    if value.is_finite() && value > lo && value < hi {
        Ok(value)
    } else {
        Err(PlannerError::invalid(
            field,
            format!("{value} is outside ({lo}, {hi})"),
        ))
    }
}

/// Validates that an integer count is at least one.
pub fn require_positive_count(field: &str, value: usize) -> PlannerResult<usize> {
    if value >= 1 {
        Ok(value)
    } else {
        Err(PlannerError::invalid(field, "must be at least 1"))
    }
}

/// Validates a planner axis index (0 = h0, 1 = h1, 2 = scanning).
pub fn require_axis_index(field: &str, index: usize) -> PlannerResult<usize> {
    if index < 3 {
        Ok(index)
    } else {
        Err(PlannerError::invalid(field, format!("axis index {index} is not in 0..3")))
    }
}

/// Validates that a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}
