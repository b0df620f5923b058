//! Instrument configuration using Figment.
//!
//! Everything the planner needs from the surrounding instrument is loaded
//! from one TOML file, then overridden by environment variables:
//! 1. the TOML file (base configuration)
//! 2. environment variables prefixed with `VOXEL_PLANNER_`, nested keys
//!    separated by `__` (e.g. `VOXEL_PLANNER_APPLICATION__LOG_LEVEL=debug`)
//!
//! # Example
//! ```no_run
//! use voxel_planner::config::InstrumentConfig;
//!
//! let config = InstrumentConfig::load_from("config/instrument.toml")?;
//! config.validate()?;
//! println!("Instrument: {}", config.application.name);
//! # Ok::<(), voxel_planner::error::PlannerError>(())
//! ```

use crate::channel::{ChannelCatalog, PropertyDescriptor};
use crate::error::{PlannerError, PlannerResult};
use crate::grid::{FovDimensions, GridSpec};
use crate::limits::Limits;
use crate::plane::CoordinatePlane;
use crate::serializer::ChannelOrder;
use crate::units::LengthUnit;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VOXEL_PLANNER_";

/// Accepted log levels.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Declared length unit (mm, um, nm)
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Instrument axes as (h0, h1, scan); a leading `-` inverts polarity
    #[serde(default = "default_plane")]
    pub coordinate_plane: Vec<String>,
    /// Travel limits per instrument axis, `[lo, hi]`
    #[serde(default)]
    pub axis_limits: BTreeMap<String, [f64; 2]>,
    /// Field of view along (h0, h1)
    pub fov_dimensions: [f64; 2],
    /// Channel catalog
    #[serde(default)]
    pub channels: ChannelCatalog,
    /// Device property descriptors
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
    /// Initial plan settings
    #[serde(default)]
    pub plan: PlanDefaults,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Instrument name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Initial planner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefaults {
    /// Grid description
    #[serde(default)]
    pub grid: GridSpec,
    /// Channel nesting of the tile list
    #[serde(default)]
    pub channel_order: ChannelOrder,
    /// Broadcast edits to every tile
    #[serde(default = "default_apply_all")]
    pub apply_all: bool,
    /// Channels activated at start-up; every catalog channel when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_channels: Option<Vec<String>>,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            channel_order: ChannelOrder::default(),
            apply_all: default_apply_all(),
            active_channels: None,
        }
    }
}

// Default value functions
fn default_unit() -> String {
    "um".to_string()
}

fn default_plane() -> Vec<String> {
    vec!["x".to_string(), "y".to_string(), "z".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_apply_all() -> bool {
    true
}

impl InstrumentConfig {
    /// Load configuration from a TOML file and environment variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> PlannerResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Layered provider: TOML file, then `VOXEL_PLANNER_` environment variables
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Parse configuration from a TOML string (no environment layer)
    pub fn from_toml_str(toml: &str) -> PlannerResult<Self> {
        Ok(Figment::from(Toml::string(toml)).extract()?)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> PlannerResult<String> {
        toml::to_string_pretty(self).map_err(|e| PlannerError::Configuration(e.to_string()))
    }

    /// Declared length unit
    pub fn unit(&self) -> PlannerResult<LengthUnit> {
        self.unit.parse()
    }

    /// Coordinate plane
    pub fn plane(&self) -> PlannerResult<CoordinatePlane> {
        CoordinatePlane::try_from(self.coordinate_plane.clone())
    }

    /// Field-of-view dimensions
    pub fn fov(&self) -> PlannerResult<FovDimensions> {
        let fov = FovDimensions::new(self.fov_dimensions[0], self.fov_dimensions[1]);
        fov.validate()?;
        Ok(fov)
    }

    /// Axis limits as checked intervals
    pub fn axis_limits(&self) -> PlannerResult<BTreeMap<String, Limits>> {
        self.axis_limits
            .iter()
            .map(|(axis, [lo, hi])| Ok((axis.clone(), Limits::new(*lo, *hi)?)))
            .collect()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> PlannerResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(PlannerError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        self.unit().map_err(invalid)?;
        let plane = self.plane().map_err(invalid)?;
        self.fov().map_err(invalid)?;

        for (axis, limits) in self.axis_limits().map_err(invalid)? {
            plane.index_of(&axis).map_err(invalid)?;
            if limits.lo() > limits.hi() {
                return Err(PlannerError::Configuration(format!(
                    "axis '{axis}' has inverted limits"
                )));
            }
        }

        for channel in self.channels.channel_names() {
            let kinds = self.channels.device_kinds(channel)?;
            if kinds.is_empty() || kinds.values().any(Vec::is_empty) {
                return Err(PlannerError::Configuration(format!(
                    "channel '{channel}' lists no devices for one of its kinds"
                )));
            }
        }

        for descriptor in &self.properties {
            descriptor.validate()?;
        }

        self.plan.grid.validate().map_err(invalid)?;
        if let Some(active) = &self.plan.active_channels {
            for channel in active {
                if !self.channels.contains(channel) {
                    return Err(PlannerError::Configuration(format!(
                        "active channel '{channel}' is not in the catalog"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(err: PlannerError) -> PlannerError {
    PlannerError::Configuration(err.to_string())
}
