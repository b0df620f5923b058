//! Custom error types for the planner.
//!
//! This module defines the primary error type, `PlannerError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to report
//! everything a planner mutation can reject, from malformed setter input to channel
//! bookkeeping problems.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidInput`**: a setter received a value outside its declared domain
//!   (overlap ≥ 1, rows < 1, negative area, zero step). State is left untouched.
//! - **`AxisUnknown`**: a coordinate-plane lookup named an axis the plane does not carry.
//! - **`UnitMismatch`**: two quantities with different units were combined.
//! - **`ChannelUnknown` / `ChannelDuplicate`**: channel plan bookkeeping failures.
//! - **`PropertyUnknown` / `PropertyNotSettable`**: a cell address names a column that
//!   does not exist, or a read-only (opaque) column.
//! - **`TypeMismatch`**: a cell value failed its column's type, enum or range check.
//! - **`InternalReentrancy`**: a change subscriber re-published the attribute it was
//!   being notified about. This is a programming error on the subscriber side.
//! - **`Config`** / **`Io`** / **`Serialization`**: configuration loading and tile-list output.
//!
//! Numeric degeneracies in step arithmetic are not errors; they collapse to zero.

use thiserror::Error;

/// Convenience alias for results using the planner error type.
pub type PlannerResult<T> = std::result::Result<T, PlannerError>;

/// Primary error type for the planner.
#[derive(Error, Debug)]
pub enum PlannerError {
    /// A setter received a value outside its declared domain.
    ///
    /// **Recovery Strategy**: Report to the user; the previous value stays in effect.
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput {
        /// Name of the rejected field (uses the change vocabulary where one exists).
        field: String,
        /// Human-readable description of the violated constraint.
        reason: String,
    },

    /// A coordinate-plane consumer asked for an axis the plane does not define.
    #[error("Unknown axis '{0}'")]
    AxisUnknown(String),

    /// Two quantities with different units were combined.
    #[error("Unit mismatch: cannot combine {left} with {right}")]
    UnitMismatch {
        /// Unit of the left-hand operand.
        left: String,
        /// Unit of the right-hand operand.
        right: String,
    },

    /// A channel plan mutation referenced a channel outside the catalog or not active.
    #[error("Unknown channel '{0}'")]
    ChannelUnknown(String),

    /// A channel was added twice.
    #[error("Channel '{0}' is already active")]
    ChannelDuplicate(String),

    /// A cell address named a column the channel does not carry.
    #[error("Unknown property '{0}'")]
    PropertyUnknown(String),

    /// A cell address named an opaque (read-only) column.
    #[error("Property '{0}' is read-only")]
    PropertyNotSettable(String),

    /// A cell value failed its column's validator.
    #[error("Type mismatch for '{column}': {reason}")]
    TypeMismatch {
        /// Column key the value was written to.
        column: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A change subscriber synchronously re-published the attribute it was handling.
    ///
    /// **Error Type**: Programming error. The subscriber must route cascaded updates
    /// through a different attribute.
    #[error("Reentrant publish of '{0}' while it is being delivered")]
    InternalReentrancy(String),

    /// Configuration file parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tile list or snapshot could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlannerError {
    /// Shorthand for [`PlannerError::InvalidInput`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlannerError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`PlannerError::TypeMismatch`].
    pub fn type_mismatch(column: impl Into<String>, reason: impl Into<String>) -> Self {
        PlannerError::TypeMismatch {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for PlannerError {
    fn from(value: figment::Error) -> Self {
        PlannerError::Config(Box::new(value))
    }
}
