//! # Voxel Planner
//!
//! Acquisition volume planning for light-sheet microscopes. A sample larger than one
//! field of view is covered by a grid of overlapping tiles; each tile gets its own
//! scan range along the third axis and its own per-channel device settings. The
//! planner keeps all of that consistent while the operator edits it, and renders the
//! result as an ordered tile list for the acquisition engine.
//!
//! ## Crate Structure
//!
//! - **`units`**: `LengthUnit` and `Quantity`, lengths tagged with mm/µm/nm.
//! - **`plane`**: `CoordinatePlane`, the mapping from the logical (h0, h1, scan) frame
//!   onto signed instrument axes.
//! - **`limits`**: travel limits per axis, used to clamp bounds and offsets.
//! - **`grid`**: `GridSpec` and `GridPlan`, tile placement and traversal order.
//! - **`tile_matrix`**: `TileArray` and `TileMatrix`, per-tile arrays that follow the
//!   grid shape.
//! - **`scan`**: `ScanAxisPlan`, per-tile scan start/end and step arithmetic.
//! - **`channel`**: the channel catalog, property descriptors and `ChannelPlan`.
//! - **`change_bus`**: `ChangeBus`, synchronous change notification.
//! - **`fov`**: `FovTracker`, anchoring grid offsets to the stage position.
//! - **`planner`**: `VolumePlanner`, the facade that owns and coordinates the rest.
//! - **`serializer`**: `TileListSerializer`, the acquisition tile list.
//! - **`config`**: `InstrumentConfig`, loaded through Figment.
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: `PlannerError` and the `PlannerResult` alias.
//! - **`validation`**: small numeric guards shared by the setters.

pub mod change_bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod fov;
pub mod grid;
pub mod limits;
pub mod logging;
pub mod plane;
pub mod planner;
pub mod scan;
pub mod serializer;
pub mod tile_matrix;
pub mod units;
pub mod validation;

pub use change_bus::{Attribute, ChangeBus, ChangeEvent, ChangeSet, SubscriptionId};
pub use channel::{CellAddress, CellValue, ChannelCatalog, ChannelPlan, ColumnKey};
pub use config::InstrumentConfig;
pub use error::{PlannerError, PlannerResult};
pub use grid::{FovDimensions, GridMode, GridPlan, GridSpec, RelativeTo, Tile, TileOrder};
pub use plane::CoordinatePlane;
pub use planner::{PlanSnapshot, VolumePlanner, VolumePlannerBuilder};
pub use serializer::{AcquisitionTile, ChannelOrder, TileListSerializer, TileNumbering};
pub use units::{LengthUnit, Quantity};
