//! Per-channel, per-tile tables of device settings.

use super::catalog::{ChannelCatalog, NoSetpoints, PropertyRegistry, SetpointSource};
use super::value::{CellValue, ColumnType};
use crate::error::{PlannerError, PlannerResult};
use crate::grid::GridShape;
use crate::scan::{Discretization, ScanAxisPlan};
use crate::tile_matrix::{Seeding, TileArray, TileStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Column of a channel table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnKey {
    /// Distance between slices in µm.
    StepSize,
    /// Number of slices.
    Steps,
    /// File-name prefix.
    Prefix,
    /// A device property column.
    Device {
        /// Device name.
        device: String,
        /// Property name.
        property: String,
    },
}

impl ColumnKey {
    /// Key of `device.property`.
    pub fn device(device: &str, property: &str) -> Self {
        ColumnKey::Device {
            device: device.to_string(),
            property: property.to_string(),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::StepSize => f.write_str("step_size"),
            ColumnKey::Steps => f.write_str("steps"),
            ColumnKey::Prefix => f.write_str("prefix"),
            ColumnKey::Device { device, property } => write!(f, "{device}.{property}"),
        }
    }
}

impl FromStr for ColumnKey {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "step_size" => Ok(ColumnKey::StepSize),
            "steps" => Ok(ColumnKey::Steps),
            "prefix" => Ok(ColumnKey::Prefix),
            other => match other.split_once('.') {
                Some((device, property)) if !device.is_empty() && !property.is_empty() => {
                    Ok(ColumnKey::device(device, property))
                }
                _ => Err(PlannerError::PropertyUnknown(other.to_string())),
            },
        }
    }
}

impl TryFrom<String> for ColumnKey {
    type Error = PlannerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnKey> for String {
    fn from(value: ColumnKey) -> Self {
        value.to_string()
    }
}

/// Address of one channel table cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAddress {
    /// Active channel.
    pub channel: String,
    /// Column within the channel table.
    pub column: ColumnKey,
    /// Tile row.
    pub row: usize,
    /// Tile column.
    pub col: usize,
}

impl CellAddress {
    /// Address `column` of `channel` at tile `(row, col)`.
    pub fn new(channel: &str, column: ColumnKey, row: usize, col: usize) -> Self {
        Self {
            channel: channel.to_string(),
            column,
            row,
            col,
        }
    }
}

/// One device property column of a channel table.
#[derive(Debug, Clone)]
pub struct PropertyColumn {
    ty: ColumnType,
    cells: TileArray<CellValue>,
}

impl PropertyColumn {
    /// Declared type.
    pub fn column_type(&self) -> &ColumnType {
        &self.ty
    }

    /// Cells of the column.
    pub fn cells(&self) -> &TileArray<CellValue> {
        &self.cells
    }
}

/// Table of one active channel.
#[derive(Debug, Clone)]
pub struct ChannelTable {
    step_size: TileArray<f64>,
    steps: TileArray<i64>,
    prefix: TileArray<String>,
    devices: Vec<String>,
    columns: BTreeMap<String, BTreeMap<String, PropertyColumn>>,
}

impl ChannelTable {
    /// Step size in µm at tile `(row, col)`.
    pub fn step_size(&self, row: usize, col: usize) -> PlannerResult<f64> {
        self.step_size.at("step_size", row, col).copied()
    }

    /// Step count at tile `(row, col)`.
    pub fn steps(&self, row: usize, col: usize) -> PlannerResult<i64> {
        self.steps.at("steps", row, col).copied()
    }

    /// Prefix at tile `(row, col)`.
    pub fn prefix(&self, row: usize, col: usize) -> PlannerResult<&str> {
        self.prefix.at("prefix", row, col).map(String::as_str)
    }

    /// Devices of the channel in catalog order.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Property columns of `device`, in property-name order.
    pub fn properties(&self, device: &str) -> impl Iterator<Item = (&str, &PropertyColumn)> {
        self.columns
            .get(device)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Property column `device.property`.
    pub fn column(&self, device: &str, property: &str) -> PlannerResult<&PropertyColumn> {
        self.columns
            .get(device)
            .and_then(|m| m.get(property))
            .ok_or_else(|| PlannerError::PropertyUnknown(format!("{device}.{property}")))
    }

    /// Value of any column at tile `(row, col)`.
    pub fn cell(&self, key: &ColumnKey, row: usize, col: usize) -> PlannerResult<CellValue> {
        match key {
            ColumnKey::StepSize => self.step_size(row, col).map(CellValue::Float),
            ColumnKey::Steps => self.steps(row, col).map(CellValue::Int),
            ColumnKey::Prefix => self.prefix(row, col).map(CellValue::from),
            ColumnKey::Device { device, property } => self
                .column(device, property)?
                .cells
                .at(&key.to_string(), row, col)
                .cloned(),
        }
    }

    /// True when every array of the table is uniform.
    pub fn is_uniform(&self) -> bool {
        self.step_size.is_uniform()
            && self.steps.is_uniform()
            && self.prefix.is_uniform()
            && self
                .columns
                .values()
                .flat_map(|m| m.values())
                .all(|c| c.cells.is_uniform())
    }

    fn set_discretization(&mut self, targets: Targets, d: Discretization) -> bool {
        let a = write(&mut self.step_size, targets, d.step_size_um);
        let b = write(&mut self.steps, targets, d.steps);
        a || b
    }

    /// Resize every array; property columns take their seed from `seed`.
    fn reshape<F>(&mut self, shape: GridShape, seeding: Seeding, seed: F)
    where
        F: Fn(&str, &str, &ColumnType) -> CellValue,
    {
        self.step_size.reshape_seeded(shape, seeding, &0.0);
        self.steps.reshape_seeded(shape, seeding, &0);
        self.prefix.reshape_seeded(shape, seeding, &String::new());
        for (device, by_property) in self.columns.iter_mut() {
            for (property, column) in by_property.iter_mut() {
                let default = seed(device.as_str(), property.as_str(), &column.ty);
                column.cells.reshape_seeded(shape, seeding, &default);
            }
        }
    }

    fn broadcast_from_origin(&mut self) {
        self.step_size.broadcast_from_origin();
        self.steps.broadcast_from_origin();
        self.prefix.broadcast_from_origin();
        for column in self.columns.values_mut().flat_map(|m| m.values_mut()) {
            column.cells.broadcast_from_origin();
        }
    }
}

/// Which cells a write touches.
#[derive(Debug, Clone, Copy)]
enum Targets {
    All,
    One(usize, usize),
}

fn write<T: Clone + PartialEq>(array: &mut TileArray<T>, targets: Targets, value: T) -> bool {
    match targets {
        Targets::All => {
            let changed = array.iter().any(|(_, v)| *v != value);
            array.fill(value);
            changed
        }
        Targets::One(row, col) => {
            if array.get(row, col) == Some(&value) {
                return false;
            }
            array.set(row, col, value).is_ok()
        }
    }
}

/// Value for a new cell of `device.property`.
///
/// The descriptor's initial value wins, then the device's current set-point,
/// then the zero value of `ty`. A seed that does not fit a settable column
/// falls back to the zero value.
fn seed_cell(
    registry: &PropertyRegistry,
    setpoints: &dyn SetpointSource,
    device: &str,
    property: &str,
    ty: &ColumnType,
) -> CellValue {
    let seed = registry
        .get(device, property)
        .and_then(|d| d.initial.clone())
        .or_else(|| setpoints.setpoint(device, property))
        .unwrap_or_else(|| ty.default_value());
    if ty.is_settable() {
        ty.coerce(&format!("{device}.{property}"), seed)
            .unwrap_or_else(|_| ty.default_value())
    } else {
        seed
    }
}

/// Per-channel per-tile matrices of device settings.
#[derive(Clone)]
pub struct ChannelPlan {
    catalog: ChannelCatalog,
    registry: PropertyRegistry,
    setpoints: Arc<dyn SetpointSource>,
    shape: GridShape,
    apply_all: bool,
    active: Vec<String>,
    tables: BTreeMap<String, ChannelTable>,
}

impl fmt::Debug for ChannelPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPlan")
            .field("shape", &self.shape)
            .field("apply_all", &self.apply_all)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl ChannelPlan {
    /// Empty plan over `catalog` for a grid of `shape`.
    pub fn new(
        catalog: ChannelCatalog,
        registry: PropertyRegistry,
        shape: GridShape,
        apply_all: bool,
    ) -> Self {
        Self {
            catalog,
            registry,
            setpoints: Arc::new(NoSetpoints),
            shape,
            apply_all,
            active: Vec::new(),
            tables: BTreeMap::new(),
        }
    }

    /// Use `setpoints` to seed columns whose descriptor has no initial value.
    pub fn with_setpoints(mut self, setpoints: Arc<dyn SetpointSource>) -> Self {
        self.setpoints = setpoints;
        self
    }

    /// Channel catalog.
    pub fn catalog(&self) -> &ChannelCatalog {
        &self.catalog
    }

    /// Active channels in traversal order.
    pub fn active_channels(&self) -> &[String] {
        &self.active
    }

    /// Whether `channel` is active.
    pub fn is_active(&self, channel: &str) -> bool {
        self.tables.contains_key(channel)
    }

    /// Table of an active channel.
    pub fn table(&self, channel: &str) -> PlannerResult<&ChannelTable> {
        self.tables
            .get(channel)
            .ok_or_else(|| PlannerError::ChannelUnknown(channel.to_string()))
    }

    /// Whether writes broadcast to every tile.
    pub fn apply_all(&self) -> bool {
        self.apply_all
    }

    /// Activate `channel`, allocating its table at the current shape.
    ///
    /// Step size, steps and prefix start at zero / empty. Property columns
    /// start at the descriptor's initial value, else the device set-point,
    /// else the type's zero value.
    pub fn add_channel(&mut self, channel: &str) -> PlannerResult<()> {
        if !self.catalog.contains(channel) {
            return Err(PlannerError::ChannelUnknown(channel.to_string()));
        }
        if self.is_active(channel) {
            return Err(PlannerError::ChannelDuplicate(channel.to_string()));
        }

        let devices: Vec<String> = self
            .catalog
            .devices(channel)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut columns = BTreeMap::new();
        for device in &devices {
            let mut by_property = BTreeMap::new();
            for descriptor in self.registry.for_device(device) {
                let ty = descriptor.column_type();
                let seed = seed_cell(
                    &self.registry,
                    self.setpoints.as_ref(),
                    device,
                    &descriptor.property,
                    &ty,
                );
                by_property.insert(
                    descriptor.property.clone(),
                    PropertyColumn {
                        cells: TileArray::filled(self.shape, seed),
                        ty,
                    },
                );
            }
            columns.insert(device.clone(), by_property);
        }

        let table = ChannelTable {
            step_size: TileArray::filled(self.shape, 0.0),
            steps: TileArray::filled(self.shape, 0),
            prefix: TileArray::filled(self.shape, String::new()),
            devices,
            columns,
        };
        debug!(channel, "channel added");
        self.tables.insert(channel.to_string(), table);
        self.active.push(channel.to_string());
        Ok(())
    }

    /// Deactivate `channel` and drop its table.
    pub fn remove_channel(&mut self, channel: &str) -> PlannerResult<()> {
        if self.tables.remove(channel).is_none() {
            return Err(PlannerError::ChannelUnknown(channel.to_string()));
        }
        self.active.retain(|c| c != channel);
        debug!(channel, "channel removed");
        Ok(())
    }

    /// Validate and write one cell (every tile under apply-all).
    ///
    /// Writing `step_size` derives `steps` from the tile volume and vice
    /// versa. Returns whether any cell changed.
    pub fn set_cell(
        &mut self,
        address: &CellAddress,
        value: CellValue,
        scan: &ScanAxisPlan,
    ) -> PlannerResult<bool> {
        let CellAddress {
            channel,
            column,
            row,
            col,
        } = address;
        let (row, col) = (*row, *col);
        let targets = if self.apply_all {
            Targets::All
        } else {
            Targets::One(row, col)
        };
        let name = column.to_string();
        let table = self
            .tables
            .get_mut(channel)
            .ok_or_else(|| PlannerError::ChannelUnknown(channel.clone()))?;
        // bounds check before any arithmetic
        table.step_size.at(&name, row, col)?;

        let changed = match column {
            ColumnKey::StepSize => {
                let step = ColumnType::Float {
                    min: Some(0.0),
                    max: None,
                }
                .coerce(&name, value)?;
                let step = step.as_f64().unwrap_or_default();
                let d = Discretization::from_step_size(scan.volume_um(row, col)?, step);
                table.set_discretization(targets, d)
            }
            ColumnKey::Steps => {
                let steps = ColumnType::Int {
                    min: Some(0.0),
                    max: None,
                }
                .coerce(&name, value)?;
                let steps = match steps {
                    CellValue::Int(n) => n,
                    _ => 0,
                };
                let d = Discretization::from_steps(scan.volume_um(row, col)?, steps);
                table.set_discretization(targets, d)
            }
            ColumnKey::Prefix => write(&mut table.prefix, targets, value.to_string()),
            ColumnKey::Device { device, property } => {
                let column = table
                    .columns
                    .get_mut(device)
                    .and_then(|m| m.get_mut(property))
                    .ok_or_else(|| PlannerError::PropertyUnknown(name.clone()))?;
                if !column.ty.is_settable() {
                    return Err(PlannerError::PropertyNotSettable(name));
                }
                let value = column.ty.coerce(&name, value)?;
                write(&mut column.cells, targets, value)
            }
        };
        Ok(changed)
    }

    /// Recompute steps from step size for every active channel and tile.
    ///
    /// Step size is the independent variable when the volume changes.
    /// Returns whether any cell changed.
    pub fn renormalize(&mut self, scan: &ScanAxisPlan) -> bool {
        let mut changed = false;
        for table in self.tables.values_mut() {
            let cells: Vec<((usize, usize), f64)> =
                table.step_size.iter().map(|(rc, v)| (rc, *v)).collect();
            for ((row, col), step) in cells {
                let Ok(volume) = scan.volume_um(row, col) else {
                    continue;
                };
                let d = Discretization::from_step_size(volume, step);
                changed |= table.set_discretization(Targets::One(row, col), d);
            }
        }
        changed
    }

    /// Permute the active channels. `order` must contain exactly the active set.
    ///
    /// Returns whether the order changed.
    pub fn reorder<S: AsRef<str>>(&mut self, order: &[S]) -> PlannerResult<bool> {
        let mut proposed: Vec<String> = order.iter().map(|s| s.as_ref().to_string()).collect();
        let mut sorted_new = proposed.clone();
        sorted_new.sort();
        let mut sorted_old = self.active.clone();
        sorted_old.sort();
        if sorted_new != sorted_old {
            return Err(PlannerError::invalid(
                "active_channels",
                format!("{proposed:?} is not a permutation of {:?}", self.active),
            ));
        }
        if proposed == self.active {
            return Ok(false);
        }
        std::mem::swap(&mut self.active, &mut proposed);
        Ok(true)
    }

    /// Switch apply-all. Broadcasting is driven by the tile matrix.
    pub fn set_apply_all(&mut self, apply_all: bool) {
        self.apply_all = apply_all;
    }

    /// True when every table is uniform.
    pub fn is_uniform(&self) -> bool {
        self.tables.values().all(ChannelTable::is_uniform)
    }
}

impl TileStore for ChannelPlan {
    fn reshape(&mut self, shape: GridShape, seeding: Seeding) {
        self.shape = shape;
        let (registry, setpoints) = (&self.registry, self.setpoints.as_ref());
        for table in self.tables.values_mut() {
            table.reshape(shape, seeding, |device, property, ty| {
                seed_cell(registry, setpoints, device, property, ty)
            });
        }
    }

    fn broadcast_from_origin(&mut self) {
        for table in self.tables.values_mut() {
            table.broadcast_from_origin();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::catalog::{PropertyDescriptor, PropertyKind};
    use crate::units::LengthUnit;
    use parking_lot::Mutex;

    fn catalog() -> ChannelCatalog {
        ChannelCatalog::default()
            .with_device("488", "lasers", "488nm")
            .with_device("488", "filters", "wheel")
            .with_device("639", "lasers", "639nm")
    }

    fn registry() -> PropertyRegistry {
        PropertyRegistry::new([
            PropertyDescriptor::new("488nm", "power_setpoint_mw", PropertyKind::Float)
                .with_range(0.0, 100.0),
            PropertyDescriptor::new("639nm", "power_setpoint_mw", PropertyKind::Float)
                .with_range(0.0, 100.0)
                .with_initial(5.0),
            PropertyDescriptor::new("wheel", "filter", PropertyKind::Enum)
                .with_options(["BP488", "BP561"]),
            PropertyDescriptor::new("wheel", "serial", PropertyKind::Opaque),
        ])
    }

    fn plan(shape: GridShape, apply_all: bool) -> ChannelPlan {
        ChannelPlan::new(catalog(), registry(), shape, apply_all)
    }

    fn scan(shape: GridShape, apply_all: bool) -> ScanAxisPlan {
        ScanAxisPlan::new(LengthUnit::Micrometer, shape, 0.0, apply_all)
    }

    #[test]
    fn add_and_remove_channels() {
        let mut p = plan(GridShape::new(1, 1), true);
        p.add_channel("488").unwrap();
        assert!(matches!(
            p.add_channel("488"),
            Err(PlannerError::ChannelDuplicate(_))
        ));
        assert!(matches!(
            p.add_channel("561"),
            Err(PlannerError::ChannelUnknown(_))
        ));
        p.add_channel("639").unwrap();
        assert_eq!(p.active_channels(), ["488", "639"]);
        p.remove_channel("488").unwrap();
        assert_eq!(p.active_channels(), ["639"]);
        assert!(p.remove_channel("488").is_err());
    }

    #[test]
    fn columns_are_seeded_from_initial_then_setpoint() {
        let mut setpoints = BTreeMap::new();
        setpoints.insert(
            ("488nm".to_string(), "power_setpoint_mw".to_string()),
            CellValue::Float(12.5),
        );
        let mut p = plan(GridShape::new(1, 1), true).with_setpoints(Arc::new(setpoints));
        p.add_channel("488").unwrap();
        p.add_channel("639").unwrap();
        let key = ColumnKey::device("488nm", "power_setpoint_mw");
        assert_eq!(p.table("488").unwrap().cell(&key, 0, 0).unwrap(), CellValue::Float(12.5));
        let key = ColumnKey::device("639nm", "power_setpoint_mw");
        assert_eq!(p.table("639").unwrap().cell(&key, 0, 0).unwrap(), CellValue::Float(5.0));
        let key = ColumnKey::device("wheel", "filter");
        assert_eq!(
            p.table("488").unwrap().cell(&key, 0, 0).unwrap(),
            CellValue::Text("BP488".into())
        );
    }

    /// Set-point source whose value can change between reads.
    struct LiveSetpoint(Mutex<f64>);

    impl SetpointSource for LiveSetpoint {
        fn setpoint(&self, device: &str, property: &str) -> Option<CellValue> {
            (device == "488nm" && property == "power_setpoint_mw")
                .then(|| CellValue::Float(*self.0.lock()))
        }
    }

    #[test]
    fn new_tiles_read_the_current_setpoint() {
        let live = Arc::new(LiveSetpoint(Mutex::new(1.0)));
        let mut p = plan(GridShape::new(1, 1), false).with_setpoints(live.clone());
        p.add_channel("488").unwrap();
        p.add_channel("639").unwrap();
        *live.0.lock() = 7.0;

        TileStore::reshape(&mut p, GridShape::new(2, 1), Seeding::Defaults);
        let power = ColumnKey::device("488nm", "power_setpoint_mw");
        let table = p.table("488").unwrap();
        assert_eq!(table.cell(&power, 0, 0).unwrap(), CellValue::Float(1.0));
        assert_eq!(table.cell(&power, 1, 0).unwrap(), CellValue::Float(7.0));

        // a declared initial value still wins over the live set-point
        let power = ColumnKey::device("639nm", "power_setpoint_mw");
        let table = p.table("639").unwrap();
        assert_eq!(table.cell(&power, 1, 0).unwrap(), CellValue::Float(5.0));
    }

    #[test]
    fn set_cell_validates_columns() {
        let shape = GridShape::new(1, 1);
        let s = scan(shape, true);
        let mut p = plan(shape, true);
        p.add_channel("488").unwrap();

        let power = CellAddress::new("488", ColumnKey::device("488nm", "power_setpoint_mw"), 0, 0);
        assert!(p.set_cell(&power, CellValue::Float(50.0), &s).unwrap());
        assert!(matches!(
            p.set_cell(&power, CellValue::Float(500.0), &s),
            Err(PlannerError::TypeMismatch { .. })
        ));

        let serial = CellAddress::new("488", ColumnKey::device("wheel", "serial"), 0, 0);
        assert!(matches!(
            p.set_cell(&serial, "x".into(), &s),
            Err(PlannerError::PropertyNotSettable(_))
        ));

        let missing = CellAddress::new("488", ColumnKey::device("wheel", "speed"), 0, 0);
        assert!(matches!(
            p.set_cell(&missing, CellValue::Int(1), &s),
            Err(PlannerError::PropertyUnknown(_))
        ));

        let inactive = CellAddress::new("639", ColumnKey::Prefix, 0, 0);
        assert!(matches!(
            p.set_cell(&inactive, "a".into(), &s),
            Err(PlannerError::ChannelUnknown(_))
        ));

        let outside = CellAddress::new("488", ColumnKey::Prefix, 3, 0);
        assert!(p.set_cell(&outside, "a".into(), &s).is_err());
    }

    #[test]
    fn apply_all_broadcasts_and_reshape_seeds_from_origin() {
        let shape = GridShape::new(2, 2);
        let s = scan(shape, true);
        let mut p = plan(shape, true);
        p.add_channel("488").unwrap();
        let prefix = CellAddress::new("488", ColumnKey::Prefix, 1, 1);
        p.set_cell(&prefix, "tile".into(), &s).unwrap();
        assert!(p.is_uniform());

        TileStore::reshape(&mut p, GridShape::new(3, 2), Seeding::FromOrigin);
        assert_eq!(p.table("488").unwrap().prefix(2, 1).unwrap(), "tile");
        assert!(p.is_uniform());
    }

    #[test]
    fn apply_all_off_keeps_cells_independent() {
        let shape = GridShape::new(2, 1);
        let s = scan(shape, false);
        let mut p = plan(shape, false);
        p.add_channel("488").unwrap();
        let prefix = CellAddress::new("488", ColumnKey::Prefix, 1, 0);
        p.set_cell(&prefix, "only_row_1".into(), &s).unwrap();
        let table = p.table("488").unwrap();
        assert_eq!(table.prefix(0, 0).unwrap(), "");
        assert_eq!(table.prefix(1, 0).unwrap(), "only_row_1");

        p.set_apply_all(true);
        TileStore::broadcast_from_origin(&mut p);
        assert_eq!(p.table("488").unwrap().prefix(1, 0).unwrap(), "");
    }

    #[test]
    fn step_size_and_steps_are_dual() {
        let shape = GridShape::new(1, 1);
        let mut s = scan(shape, true);
        s.set_end(0, 0, 10.0).unwrap();
        let mut p = plan(shape, true);
        p.add_channel("488").unwrap();

        let step_size = CellAddress::new("488", ColumnKey::StepSize, 0, 0);
        p.set_cell(&step_size, CellValue::Float(2.0), &s).unwrap();
        assert_eq!(p.table("488").unwrap().steps(0, 0).unwrap(), 5);

        let steps = CellAddress::new("488", ColumnKey::Steps, 0, 0);
        p.set_cell(&steps, CellValue::Int(4), &s).unwrap();
        assert_eq!(p.table("488").unwrap().step_size(0, 0).unwrap(), 2.5);

        s.set_end(0, 0, 20.0).unwrap();
        assert!(p.renormalize(&s));
        assert_eq!(p.table("488").unwrap().steps(0, 0).unwrap(), 8);
    }

    #[test]
    fn reorder_requires_permutation() {
        let mut p = plan(GridShape::new(1, 1), true);
        p.add_channel("488").unwrap();
        p.add_channel("639").unwrap();
        assert!(p.reorder(&["639", "488"]).unwrap());
        assert_eq!(p.active_channels(), ["639", "488"]);
        assert!(!p.reorder(&["639", "488"]).unwrap());
        assert!(p.reorder(&["639"]).is_err());
        assert!(p.reorder(&["639", "561"]).is_err());
    }

    #[test]
    fn column_keys_parse() {
        assert_eq!("prefix".parse::<ColumnKey>().unwrap(), ColumnKey::Prefix);
        assert_eq!(
            "488nm.power_setpoint_mw".parse::<ColumnKey>().unwrap(),
            ColumnKey::device("488nm", "power_setpoint_mw")
        );
        assert!("bogus".parse::<ColumnKey>().is_err());
        assert_eq!(ColumnKey::device("cam", "exposure_ms").to_string(), "cam.exposure_ms");
    }
}
