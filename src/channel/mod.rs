//! Channel plan.
//!
//! A channel is a named group of devices that are active together. For
//! every active channel the plan holds one table per tile: the scan-axis
//! discretisation (`step_size`, `steps`), a file `prefix`, and one typed
//! column per configured device property.
//!
//! - [`ChannelCatalog`] and [`PropertyRegistry`] describe what exists.
//! - [`ColumnType`] and [`CellValue`] type the cells.
//! - [`ChannelPlan`] owns the tables and enforces the apply-all discipline.

mod catalog;
mod plan;
mod value;

pub use catalog::{
    ChannelCatalog, NoSetpoints, PropertyDescriptor, PropertyKind, PropertyRegistry,
    SetpointSource,
};
pub use plan::{CellAddress, ChannelPlan, ChannelTable, ColumnKey, PropertyColumn};
pub use value::{CellValue, ColumnType};
