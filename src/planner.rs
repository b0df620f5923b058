//! The volume planner facade.
//!
//! [`VolumePlanner`] owns the grid description, the per-tile stores (scan
//! ranges, visibility, channel tables) and the change bus. Every setter
//! follows the same discipline:
//!
//! 1. validate the request against the current state; on failure log a
//!    warning and return the error with nothing mutated;
//! 2. apply it, re-laying out the grid and reshaping every per-tile store in
//!    one pass when the tile set changed;
//! 3. publish one coalesced [`ChangeSet`] naming every attribute that
//!    actually changed. A no-op publishes nothing.
//!
//! # Example
//!
//! ```
//! use voxel_planner::channel::{ChannelCatalog, PropertyDescriptor, PropertyKind};
//! use voxel_planner::grid::FovDimensions;
//! use voxel_planner::planner::VolumePlanner;
//!
//! let mut planner = VolumePlanner::builder()
//!     .fov_dimensions(FovDimensions::new(1.0, 1.0))
//!     .catalog(ChannelCatalog::default().with_device("488", "lasers", "488nm"))
//!     .property(PropertyDescriptor::new("488nm", "power_setpoint_mw", PropertyKind::Float))
//!     .build()
//!     .unwrap();
//! planner.set_rows(2).unwrap();
//! planner.add_channel("488").unwrap();
//! assert_eq!(planner.tiles().count(), 2);
//! assert_eq!(planner.tile_list().unwrap().len(), 2);
//! ```

use crate::change_bus::{Attribute, ChangeBus, ChangeEvent, ChangeSet, SubscriptionId};
use crate::channel::{
    CellAddress, CellValue, ChannelCatalog, ChannelPlan, ColumnKey, NoSetpoints,
    PropertyDescriptor, PropertyRegistry, SetpointSource,
};
use crate::config::InstrumentConfig;
use crate::error::{PlannerError, PlannerResult};
use crate::fov::FovTracker;
use crate::grid::{
    FovDimensions, GridMode, GridPlan, GridShape, GridSpec, Placement, RelativeTo, Tile, TileIter,
    TileOrder, TileSequence,
};
use crate::limits::{Limits, PlaneLimits};
use crate::plane::{CoordinatePlane, H0, H1, SCAN};
use crate::scan::ScanAxisPlan;
use crate::serializer::{AcquisitionTile, ChannelOrder, TileListSerializer};
use crate::tile_matrix::{Seeding, TileMatrix, TileStore};
use crate::units::LengthUnit;
use crate::validation::{require_axis_index, require_finite};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serialisable view of the planner state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSnapshot {
    /// Current grid description.
    pub spec: GridSpec,
    /// Matrix shape of the layout.
    pub shape: GridShape,
    /// Tiles in traversal order.
    pub tiles: Vec<Tile>,
    /// Grid offset per planner axis.
    pub grid_offset: [f64; 3],
    /// Anchor flags per planner axis.
    pub anchors: [bool; 3],
    /// Field-of-view size.
    pub fov_dimensions: FovDimensions,
    /// Last reported field-of-view position.
    pub fov_position: [f64; 3],
    /// Declared unit.
    pub unit: LengthUnit,
    /// Apply-all state.
    pub apply_all: bool,
    /// Active channels in traversal order.
    pub active_channels: Vec<String>,
    /// Channel nesting of the tile list.
    pub channel_order: ChannelOrder,
    /// First tile of the range gate.
    pub start_index: usize,
    /// Last tile of the range gate (inclusive).
    pub stop_index: usize,
}

/// Builder for [`VolumePlanner`].
#[derive(Clone)]
pub struct VolumePlannerBuilder {
    plane: CoordinatePlane,
    unit: LengthUnit,
    axis_limits: BTreeMap<String, Limits>,
    spec: GridSpec,
    fov: FovDimensions,
    catalog: ChannelCatalog,
    descriptors: Vec<PropertyDescriptor>,
    setpoints: Arc<dyn SetpointSource>,
    apply_all: bool,
    channel_order: ChannelOrder,
    bus: ChangeBus,
}

impl Default for VolumePlannerBuilder {
    fn default() -> Self {
        Self {
            plane: CoordinatePlane::default(),
            unit: LengthUnit::Micrometer,
            axis_limits: BTreeMap::new(),
            spec: GridSpec::default(),
            fov: FovDimensions::default(),
            catalog: ChannelCatalog::default(),
            descriptors: Vec::new(),
            setpoints: Arc::new(NoSetpoints),
            apply_all: true,
            channel_order: ChannelOrder::default(),
            bus: ChangeBus::new(),
        }
    }
}

impl VolumePlannerBuilder {
    /// Instrument axes.
    pub fn plane(mut self, plane: CoordinatePlane) -> Self {
        self.plane = plane;
        self
    }

    /// Declared length unit of positions.
    pub fn unit(mut self, unit: LengthUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Travel limits of one instrument axis.
    pub fn axis_limit(mut self, axis: &str, limits: Limits) -> Self {
        self.axis_limits.insert(axis.to_string(), limits);
        self
    }

    /// Initial grid description.
    pub fn grid(mut self, spec: GridSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Field-of-view size.
    pub fn fov_dimensions(mut self, fov: FovDimensions) -> Self {
        self.fov = fov;
        self
    }

    /// Channel catalog.
    pub fn catalog(mut self, catalog: ChannelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Register one property descriptor.
    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Register several property descriptors.
    pub fn properties(mut self, descriptors: impl IntoIterator<Item = PropertyDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Device set-points used when a descriptor has no initial value.
    pub fn setpoints(mut self, setpoints: Arc<dyn SetpointSource>) -> Self {
        self.setpoints = setpoints;
        self
    }

    /// Initial apply-all state. Defaults to on.
    pub fn apply_all(mut self, apply_all: bool) -> Self {
        self.apply_all = apply_all;
        self
    }

    /// Initial channel order.
    pub fn channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    /// Publish on an existing bus instead of a fresh one.
    pub fn bus(mut self, bus: ChangeBus) -> Self {
        self.bus = bus;
        self
    }

    /// Validate everything and lay out the initial grid.
    pub fn build(self) -> PlannerResult<VolumePlanner> {
        let limits = PlaneLimits::resolve(&self.plane, &self.axis_limits)?;
        let spec = clamp_bounds(self.spec, &limits);
        let offsets = [0.0; 3];
        let sequence = layout(&self.plane, &spec, self.fov, offsets)?.sequence();
        let shape = sequence.shape();
        let channels = ChannelPlan::new(
            self.catalog,
            PropertyRegistry::new(self.descriptors),
            shape,
            self.apply_all,
        )
        .with_setpoints(self.setpoints);

        debug!(
            rows = shape.rows,
            columns = shape.columns,
            mode = ?spec.mode,
            unit = %self.unit,
            "volume planner built"
        );
        Ok(VolumePlanner {
            scan: ScanAxisPlan::new(self.unit, shape, offsets[SCAN], self.apply_all),
            matrix: TileMatrix::new(shape),
            plane: self.plane,
            unit: self.unit,
            limits,
            spec,
            fov: self.fov,
            offsets,
            tracker: FovTracker::new(),
            sequence,
            channels,
            apply_all: self.apply_all,
            channel_order: self.channel_order,
            start: 0,
            stop: None,
            bus: self.bus,
        })
    }
}

fn layout(
    plane: &CoordinatePlane,
    spec: &GridSpec,
    fov: FovDimensions,
    offsets: [f64; 3],
) -> PlannerResult<GridPlan> {
    let signs = plane.orient([1.0; 3]);
    Ok(GridPlan::new(spec, fov)?.with_placement(Placement {
        origin: [offsets[H0], offsets[H1]],
        signs: [signs[H0], signs[H1]],
    }))
}

fn clamp_bounds(mut spec: GridSpec, limits: &PlaneLimits) -> GridSpec {
    let (h0, h1) = (limits.axis(H0), limits.axis(H1));
    spec.left = h0.clamp(spec.left);
    spec.right = h0.clamp(spec.right);
    spec.bottom = h1.clamp(spec.bottom);
    spec.top = h1.clamp(spec.top);
    spec
}

/// Acquisition volume planner.
#[derive(Debug)]
pub struct VolumePlanner {
    plane: CoordinatePlane,
    unit: LengthUnit,
    limits: PlaneLimits,
    spec: GridSpec,
    fov: FovDimensions,
    offsets: [f64; 3],
    tracker: FovTracker,
    sequence: TileSequence,
    matrix: TileMatrix,
    scan: ScanAxisPlan,
    channels: ChannelPlan,
    apply_all: bool,
    channel_order: ChannelOrder,
    start: usize,
    stop: Option<usize>,
    bus: ChangeBus,
}

impl VolumePlanner {
    /// Start building a planner.
    pub fn builder() -> VolumePlannerBuilder {
        VolumePlannerBuilder::default()
    }

    /// Build a planner from a validated instrument configuration.
    ///
    /// Activates the configured channels, or every catalog channel when the
    /// configuration names none.
    pub fn from_config(config: &InstrumentConfig) -> PlannerResult<Self> {
        let mut builder = Self::builder()
            .plane(config.plane()?)
            .unit(config.unit()?)
            .fov_dimensions(config.fov()?)
            .catalog(config.channels.clone())
            .properties(config.properties.iter().cloned())
            .grid(config.plan.grid.clone())
            .apply_all(config.plan.apply_all)
            .channel_order(config.plan.channel_order);
        for (axis, limits) in config.axis_limits()? {
            builder = builder.axis_limit(&axis, limits);
        }
        let mut planner = builder.build()?;

        let active: Vec<String> = match &config.plan.active_channels {
            Some(names) => names.clone(),
            None => config.channels.channel_names().map(str::to_string).collect(),
        };
        for channel in &active {
            planner.add_channel(channel)?;
        }
        info!(
            channels = active.len(),
            tiles = planner.sequence.len(),
            "planner configured"
        );
        Ok(planner)
    }

    // ----- observation -------------------------------------------------

    /// Instrument axes.
    pub fn plane(&self) -> &CoordinatePlane {
        &self.plane
    }

    /// Declared length unit.
    pub fn unit(&self) -> LengthUnit {
        self.unit
    }

    /// Current grid description.
    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Field-of-view size.
    pub fn fov_dimensions(&self) -> FovDimensions {
        self.fov
    }

    /// Last reported field-of-view position.
    pub fn fov_position(&self) -> [f64; 3] {
        self.tracker.position()
    }

    /// Grid offset per planner axis.
    pub fn grid_offset(&self) -> [f64; 3] {
        self.offsets
    }

    /// Anchor flags per planner axis.
    pub fn anchors(&self) -> [bool; 3] {
        self.tracker.anchors()
    }

    /// Matrix shape of the current layout.
    pub fn shape(&self) -> GridShape {
        self.matrix.shape()
    }

    /// Tiles in traversal order.
    pub fn tiles(&self) -> TileIter<'_> {
        self.sequence.iter()
    }

    /// Restartable tile sequence.
    pub fn tile_sequence(&self) -> &TileSequence {
        &self.sequence
    }

    /// Tiles whose visibility flag is set, in traversal order.
    pub fn visible_tiles(&self) -> Vec<Tile> {
        self.sequence
            .iter()
            .filter(|t| self.matrix.is_visible(t.row, t.col).unwrap_or(false))
            .collect()
    }

    /// Per-tile scan ranges.
    pub fn scan(&self) -> &ScanAxisPlan {
        &self.scan
    }

    /// Channel tables.
    pub fn channels(&self) -> &ChannelPlan {
        &self.channels
    }

    /// Tile matrix (shape and visibility).
    pub fn matrix(&self) -> &TileMatrix {
        &self.matrix
    }

    /// Apply-all state.
    pub fn apply_all(&self) -> bool {
        self.apply_all
    }

    /// Channel nesting of the tile list.
    pub fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    /// Inclusive `(start, stop)` range gate over the traversal.
    pub fn range(&self) -> (usize, usize) {
        let last = self.sequence.len().saturating_sub(1);
        (self.start, self.stop.unwrap_or(last).min(last))
    }

    /// Snapshot of the whole state.
    pub fn value(&self) -> PlanSnapshot {
        let (start_index, stop_index) = self.range();
        PlanSnapshot {
            spec: self.spec.clone(),
            shape: self.shape(),
            tiles: self.sequence.to_vec(),
            grid_offset: self.offsets,
            anchors: self.anchors(),
            fov_dimensions: self.fov,
            fov_position: self.fov_position(),
            unit: self.unit,
            apply_all: self.apply_all,
            active_channels: self.channels.active_channels().to_vec(),
            channel_order: self.channel_order,
            start_index,
            stop_index,
        }
    }

    /// Tile list in the planner's channel order.
    pub fn tile_list(&self) -> PlannerResult<Vec<AcquisitionTile>> {
        TileListSerializer::new(self.channel_order).serialize(self)
    }

    /// Change bus the planner publishes on.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Subscribe to every change.
    pub fn on_change(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe_all(callback)
    }

    /// Subscribe to the attribute named `name`.
    pub fn subscribe(
        &self,
        name: &str,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> PlannerResult<SubscriptionId> {
        self.bus.subscribe(name, callback)
    }

    /// Drop a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ----- grid setters ------------------------------------------------

    /// Switch the extent mode.
    pub fn set_mode(&mut self, mode: GridMode) -> PlannerResult<()> {
        self.transact("mode", |p, changes| {
            if p.spec.mode == mode {
                return Ok(());
            }
            let spec = GridSpec { mode, ..p.spec.clone() };
            changes.mark(Attribute::Mode);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Set the row count (NUMBER mode).
    pub fn set_rows(&mut self, rows: usize) -> PlannerResult<()> {
        self.transact("rows", |p, changes| {
            if p.spec.rows == rows {
                return Ok(());
            }
            let spec = GridSpec { rows, ..p.spec.clone() };
            changes.mark(Attribute::Rows);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Set the column count (NUMBER mode).
    pub fn set_columns(&mut self, columns: usize) -> PlannerResult<()> {
        self.transact("columns", |p, changes| {
            if p.spec.columns == columns {
                return Ok(());
            }
            let spec = GridSpec { columns, ..p.spec.clone() };
            changes.mark(Attribute::Columns);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Set the area to cover (AREA mode).
    pub fn set_area(&mut self, width: f64, height: f64) -> PlannerResult<()> {
        self.transact("area", |p, changes| {
            let spec = GridSpec {
                width,
                height,
                ..p.spec.clone()
            };
            let (old_w, old_h) = (p.spec.width, p.spec.height);
            if spec == p.spec {
                return Ok(());
            }
            changes
                .mark_if(old_w != width, Attribute::AreaWidth)
                .mark_if(old_h != height, Attribute::AreaHeight);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Set the absolute edges to cover (BOUNDS mode), clamped to the axis limits.
    ///
    /// Edges are instrument coordinates, low before high on each axis. An
    /// inverted edge pair is reported under the logical corner label of its
    /// low edge, so on a `-x` plane a bad `left` is reported as `bounds_right`.
    pub fn set_bounds(
        &mut self,
        left: f64,
        right: f64,
        bottom: f64,
        top: f64,
    ) -> PlannerResult<()> {
        self.transact("bounds", |p, changes| {
            let requested = GridSpec {
                left,
                right,
                bottom,
                top,
                ..p.spec.clone()
            };
            p.require_ordered_edges(&requested)?;
            let spec = clamp_bounds(requested.clone(), &p.limits);
            if spec != requested {
                debug!(
                    left = spec.left,
                    right = spec.right,
                    bottom = spec.bottom,
                    top = spec.top,
                    "bounds clamped to axis limits"
                );
            }
            if spec == p.spec {
                return Ok(());
            }
            changes
                .mark_if(spec.left != p.spec.left, Attribute::BoundsLeft)
                .mark_if(spec.right != p.spec.right, Attribute::BoundsRight)
                .mark_if(spec.top != p.spec.top, Attribute::BoundsTop)
                .mark_if(spec.bottom != p.spec.bottom, Attribute::BoundsBottom);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Set the fractional overlap, in (−1, 1).
    pub fn set_overlap(&mut self, overlap: f64) -> PlannerResult<()> {
        self.transact("overlap", |p, changes| {
            if p.spec.overlap == overlap {
                return Ok(());
            }
            let spec = GridSpec { overlap, ..p.spec.clone() };
            changes.mark(Attribute::Overlap);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Set the traversal order.
    pub fn set_order(&mut self, order: TileOrder) -> PlannerResult<()> {
        self.transact("order", |p, changes| {
            if p.spec.order == order {
                return Ok(());
            }
            let spec = GridSpec { order, ..p.spec.clone() };
            changes.mark(Attribute::Order);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Reverse the traversal.
    pub fn set_reverse(&mut self, reverse: bool) -> PlannerResult<()> {
        self.transact("reverse", |p, changes| {
            if p.spec.reverse == reverse {
                return Ok(());
            }
            let spec = GridSpec { reverse, ..p.spec.clone() };
            changes.mark(Attribute::Reverse);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Set the anchoring of NUMBER/AREA grids.
    pub fn set_relative_to(&mut self, relative_to: RelativeTo) -> PlannerResult<()> {
        self.transact("relative_to", |p, changes| {
            if p.spec.relative_to == relative_to {
                return Ok(());
            }
            let spec = GridSpec {
                relative_to,
                ..p.spec.clone()
            };
            changes.mark(Attribute::RelativeTo);
            p.relayout(spec, p.fov, p.offsets, changes)?;
            Ok(())
        })
    }

    // ----- anchors and field of view ------------------------------------

    /// Anchor (or release) planner axis `index`.
    ///
    /// Releasing an anchor snaps that axis's offset to the current FOV position.
    pub fn set_anchor(&mut self, index: usize, anchored: bool) -> PlannerResult<()> {
        self.transact("anchor", |p, changes| {
            let index = require_axis_index("anchor", index)?;
            let mut tracker = p.tracker;
            let mut offsets = p.offsets;
            if !tracker.set_anchor(index, anchored, &mut offsets)? {
                return Ok(());
            }
            p.move_offsets(offsets, changes)?;
            p.tracker = tracker;
            changes.mark(Attribute::Anchor(index));
            Ok(())
        })
    }

    /// Set the grid offset of an anchored axis, clamped to its limits.
    ///
    /// Offsets of axes that follow the FOV are owned by the tracker and
    /// rejected here.
    pub fn set_grid_offset(&mut self, index: usize, value: f64) -> PlannerResult<()> {
        self.transact("grid_offset", |p, changes| {
            let index = require_axis_index("grid_offset", index)?;
            let field = Attribute::GridOffset(index).to_string();
            if !value.is_finite() {
                return Err(PlannerError::invalid(field, format!("{value} is not finite")));
            }
            if !p.tracker.is_anchored(index) {
                return Err(PlannerError::invalid(
                    field,
                    "axis follows the field of view; anchor it first",
                ));
            }
            let limits = p.limits.axis(index);
            let clamped = limits.clamp(value);
            if clamped != value {
                debug!(axis = index, value, clamped, "grid offset clamped to axis limits");
            }
            let mut offsets = p.offsets;
            offsets[index] = clamped;
            p.move_offsets(offsets, changes)
        })
    }

    /// Set the field-of-view size along (h0, h1).
    pub fn set_fov_dimensions(&mut self, h0: f64, h1: f64) -> PlannerResult<()> {
        self.transact("fov_dimensions", |p, changes| {
            let fov = FovDimensions { h0, h1, s: p.fov.s };
            if fov == p.fov {
                return Ok(());
            }
            changes.mark(Attribute::FovDimensions);
            p.relayout(p.spec.clone(), fov, p.offsets, changes)?;
            Ok(())
        })
    }

    /// Report the current field-of-view position.
    ///
    /// Non-anchored axes mirror it into their grid offset.
    pub fn set_fov_position(&mut self, h0: f64, h1: f64, s: f64) -> PlannerResult<()> {
        self.transact("fov_position", |p, changes| {
            let position = [h0, h1, s];
            let mut tracker = p.tracker;
            let mut offsets = p.offsets;
            let moved = tracker.apply(position, &mut offsets)?;
            if !moved.is_empty() {
                p.move_offsets(offsets, changes)?;
            }
            let position_changed = p.tracker.position() != position;
            p.tracker = tracker;
            changes.mark_if(position_changed, Attribute::FovPosition);
            Ok(())
        })
    }

    // ----- range gate ---------------------------------------------------

    /// First tile of the emitted slice.
    pub fn set_start(&mut self, index: usize) -> PlannerResult<()> {
        self.transact("start_index", |p, changes| {
            let (_, stop) = p.range();
            if index > stop {
                return Err(PlannerError::invalid(
                    "start_index",
                    format!("{index} is past the stop index {stop}"),
                ));
            }
            if p.start != index {
                p.start = index;
                changes.mark(Attribute::StartIndex);
            }
            Ok(())
        })
    }

    /// Last tile (inclusive) of the emitted slice; `None` means the last tile.
    pub fn set_stop(&mut self, index: Option<usize>) -> PlannerResult<()> {
        self.transact("stop_index", |p, changes| {
            if let Some(stop) = index {
                let len = p.sequence.len();
                if stop >= len {
                    return Err(PlannerError::invalid(
                        "stop_index",
                        format!("{stop} is outside the {len}-tile traversal"),
                    ));
                }
                if stop < p.start {
                    return Err(PlannerError::invalid(
                        "stop_index",
                        format!("{stop} precedes the start index {}", p.start),
                    ));
                }
            }
            if p.stop != index {
                p.stop = index;
                changes.mark(Attribute::StopIndex);
            }
            Ok(())
        })
    }

    // ----- channels and scan --------------------------------------------

    /// Switch apply-all. Turning it on broadcasts cell (0, 0) of every store.
    pub fn set_apply_all(&mut self, apply_all: bool) -> PlannerResult<()> {
        self.transact("apply_all", |p, changes| {
            if p.apply_all == apply_all {
                return Ok(());
            }
            p.apply_all = apply_all;
            p.scan.set_apply_all(apply_all);
            p.channels.set_apply_all(apply_all);
            if apply_all {
                let scan_uniform = p.scan.starts().is_uniform() && p.scan.ends().is_uniform();
                let channels_uniform = p.channels.is_uniform();
                p.matrix.broadcast_from_origin(&mut [
                    &mut p.scan as &mut dyn TileStore,
                    &mut p.channels as &mut dyn TileStore,
                ]);
                changes
                    .mark_if(!scan_uniform, Attribute::ScanStarts)
                    .mark_if(!scan_uniform, Attribute::ScanEnds)
                    .mark_if(!channels_uniform, Attribute::ChannelCell);
            }
            changes.mark(Attribute::ApplyAll);
            Ok(())
        })
    }

    /// Activate a catalog channel.
    pub fn add_channel(&mut self, channel: &str) -> PlannerResult<()> {
        self.transact("channel_added", |p, changes| {
            p.channels.add_channel(channel)?;
            changes.mark_with(Attribute::ChannelAdded, channel);
            Ok(())
        })
    }

    /// Deactivate a channel.
    pub fn remove_channel(&mut self, channel: &str) -> PlannerResult<()> {
        self.transact("channel_removed", |p, changes| {
            p.channels.remove_channel(channel)?;
            changes.mark_with(Attribute::ChannelRemoved, channel);
            Ok(())
        })
    }

    /// Write one channel table cell (every tile under apply-all).
    pub fn set_cell(
        &mut self,
        address: &CellAddress,
        value: impl Into<CellValue>,
    ) -> PlannerResult<()> {
        let value = value.into();
        self.transact("channel_cell", |p, changes| {
            if p.channels.set_cell(address, value, &p.scan)? {
                changes.mark_with(Attribute::ChannelCell, address.channel.as_str());
            }
            Ok(())
        })
    }

    /// Set the step size (µm) of `channel` at tile `(row, col)`; derives steps.
    pub fn set_step_size(
        &mut self,
        channel: &str,
        row: usize,
        col: usize,
        step_um: f64,
    ) -> PlannerResult<()> {
        self.set_cell(
            &CellAddress::new(channel, ColumnKey::StepSize, row, col),
            step_um,
        )
    }

    /// Set the step count of `channel` at tile `(row, col)`; derives the step size.
    pub fn set_steps(
        &mut self,
        channel: &str,
        row: usize,
        col: usize,
        steps: i64,
    ) -> PlannerResult<()> {
        self.set_cell(&CellAddress::new(channel, ColumnKey::Steps, row, col), steps)
    }

    /// Set the file prefix of `channel` at tile `(row, col)`.
    pub fn set_prefix(
        &mut self,
        channel: &str,
        row: usize,
        col: usize,
        prefix: &str,
    ) -> PlannerResult<()> {
        self.set_cell(&CellAddress::new(channel, ColumnKey::Prefix, row, col), prefix)
    }

    /// Permute the active channels.
    pub fn reorder_channels<S: AsRef<str>>(&mut self, order: &[S]) -> PlannerResult<()> {
        self.transact("active_channels", |p, changes| {
            let changed = p.channels.reorder(order)?;
            changes.mark_if(changed, Attribute::ActiveChannels);
            Ok(())
        })
    }

    /// Select the channel nesting of the tile list.
    pub fn set_channel_order(&mut self, order: ChannelOrder) -> PlannerResult<()> {
        self.transact("channel_order", |p, changes| {
            if p.channel_order != order {
                p.channel_order = order;
                changes.mark(Attribute::ChannelOrder);
            }
            Ok(())
        })
    }

    /// Set the scan start of tile `(row, col)` and renormalise every channel.
    pub fn set_scan_start(&mut self, row: usize, col: usize, start: f64) -> PlannerResult<()> {
        self.transact("scan_starts", |p, changes| {
            if p.scan.set_start(row, col, start)? {
                changes.mark(Attribute::ScanStarts);
                let renormalized = p.channels.renormalize(&p.scan);
                changes.mark_if(renormalized, Attribute::ChannelCell);
            }
            Ok(())
        })
    }

    /// Set the scan end of tile `(row, col)` and renormalise every channel.
    pub fn set_scan_end(&mut self, row: usize, col: usize, end: f64) -> PlannerResult<()> {
        self.transact("scan_ends", |p, changes| {
            if p.scan.set_end(row, col, end)? {
                changes.mark(Attribute::ScanEnds);
                let renormalized = p.channels.renormalize(&p.scan);
                changes.mark_if(renormalized, Attribute::ChannelCell);
            }
            Ok(())
        })
    }

    /// Show or hide tile `(row, col)`. Visibility does not filter the tile list.
    pub fn set_tile_visible(&mut self, row: usize, col: usize, visible: bool) -> PlannerResult<()> {
        self.transact("tile_visibility", |p, changes| {
            let changed = p.matrix.set_visible(row, col, visible)?;
            changes.mark_if(changed, Attribute::TileVisibility);
            Ok(())
        })
    }

    // ----- internals ----------------------------------------------------

    /// Run one user action and publish what it changed.
    ///
    /// `action` must validate before mutating; an error leaves the planner
    /// untouched and publishes nothing.
    fn transact<F>(&mut self, action: &'static str, f: F) -> PlannerResult<()>
    where
        F: FnOnce(&mut Self, &mut ChangeSet) -> PlannerResult<()>,
    {
        let mut changes = ChangeSet::new();
        if let Err(err) = f(self, &mut changes) {
            warn!(action, error = %err, "planner input rejected");
            return Err(err);
        }
        if changes.is_empty() {
            return Ok(());
        }
        debug!(action, changes = changes.len(), "planner updated");
        self.bus.publish(changes)
    }

    /// Lay out `spec` and commit it with every dependent store.
    ///
    /// Fails before mutating anything when the layout is invalid.
    fn relayout(
        &mut self,
        spec: GridSpec,
        fov: FovDimensions,
        offsets: [f64; 3],
        changes: &mut ChangeSet,
    ) -> PlannerResult<()> {
        let sequence = layout(&self.plane, &spec, fov, offsets)?.sequence();
        let tiles_changed = sequence.to_vec() != self.sequence.to_vec();
        let shape = sequence.shape();

        self.spec = spec;
        self.fov = fov;
        self.offsets = offsets;
        self.sequence = sequence;

        let seeding = Seeding::for_apply_all(self.apply_all);
        let reshaped = self.matrix.reshape(
            shape,
            seeding,
            &mut [
                &mut self.scan as &mut dyn TileStore,
                &mut self.channels as &mut dyn TileStore,
            ],
        );
        if reshaped {
            self.channels.renormalize(&self.scan);
            self.clamp_gate(changes);
        }
        changes.mark_if(tiles_changed, Attribute::TilesInvalidated);
        Ok(())
    }

    /// Commit new grid offsets, feeding the scanning-axis offset to the scan plan.
    fn move_offsets(&mut self, offsets: [f64; 3], changes: &mut ChangeSet) -> PlannerResult<()> {
        let old = self.offsets;
        if offsets == old {
            return Ok(());
        }
        // validate the scan start before the layout is committed
        require_finite("grid_offset_2", offsets[SCAN])?;
        self.relayout(self.spec.clone(), self.fov, offsets, changes)?;
        for axis in 0..3 {
            changes.mark_if(old[axis] != offsets[axis], Attribute::GridOffset(axis));
        }
        if old[SCAN] != offsets[SCAN] {
            let (starts, ends) = self.scan.set_default_start(offsets[SCAN])?;
            changes
                .mark_if(starts, Attribute::ScanStarts)
                .mark_if(ends, Attribute::ScanEnds);
            if starts || ends {
                let renormalized = self.channels.renormalize(&self.scan);
                changes.mark_if(renormalized, Attribute::ChannelCell);
            }
        }
        Ok(())
    }

    /// Reject BOUNDS edges whose low edge lies above the high edge.
    fn require_ordered_edges(&self, spec: &GridSpec) -> PlannerResult<()> {
        for (axis, low, high) in [(H0, spec.left, spec.right), (H1, spec.bottom, spec.top)] {
            if low > high {
                let (low_label, high_label) = self.plane.logical_corner_label(axis)?;
                return Err(PlannerError::invalid(
                    format!("bounds_{low_label}"),
                    format!("{low_label} edge {low} lies beyond {high_label} edge {high}"),
                ));
            }
        }
        Ok(())
    }

    /// Keep the range gate inside the traversal after a shrink.
    fn clamp_gate(&mut self, changes: &mut ChangeSet) {
        let last = self.sequence.len().saturating_sub(1);
        if let Some(stop) = self.stop {
            if stop > last {
                self.stop = Some(last);
                changes.mark(Attribute::StopIndex);
            }
        }
        if self.start > last {
            self.start = last;
            changes.mark(Attribute::StartIndex);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PropertyKind;
    use crate::grid::MAX_TILES;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    fn planner() -> VolumePlanner {
        VolumePlanner::builder()
            .fov_dimensions(FovDimensions::new(1.0, 1.0))
            .catalog(
                ChannelCatalog::default()
                    .with_device("488", "lasers", "488nm")
                    .with_device("639", "lasers", "639nm"),
            )
            .property(
                PropertyDescriptor::new("488nm", "power_setpoint_mw", PropertyKind::Float)
                    .with_range(0.0, 100.0),
            )
            .axis_limit("x", Limits::new(-10.0, 10.0).unwrap())
            .build()
            .unwrap()
    }

    fn record(planner: &VolumePlanner) -> Arc<Mutex<Vec<Attribute>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        planner.on_change(move |e| sink.lock().push(e.attribute));
        seen
    }

    #[test]
    fn setter_publishes_one_coalesced_change() {
        let mut p = planner();
        let seen = record(&p);
        p.set_rows(3).unwrap();
        assert_eq!(*seen.lock(), vec![Attribute::Rows, Attribute::TilesInvalidated]);
        assert_eq!(p.shape(), GridShape::new(3, 1));
    }

    #[test]
    fn unsubscribed_callbacks_stop_receiving() {
        let mut p = planner();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = p
            .subscribe("columns", move |e| sink.lock().push(e.attribute))
            .unwrap();
        assert_eq!(p.bus().subscriber_count(), 1);
        p.set_columns(2).unwrap();
        assert!(p.unsubscribe(id));
        assert_eq!(p.bus().subscriber_count(), 0);
        p.set_columns(3).unwrap();
        assert_eq!(*seen.lock(), vec![Attribute::Columns]);
    }

    #[test]
    fn no_op_publishes_nothing() {
        let mut p = planner();
        let seen = record(&p);
        p.set_rows(1).unwrap();
        p.set_order(TileOrder::RowWise).unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    #[traced_test]
    fn rejected_input_leaves_state_and_warns() {
        let mut p = planner();
        let seen = record(&p);
        let before = p.value();
        assert!(matches!(
            p.set_overlap(1.0),
            Err(PlannerError::InvalidInput { .. })
        ));
        assert!(p.set_rows(0).is_err());
        assert_eq!(p.value(), before);
        assert!(seen.lock().is_empty());
        assert!(logs_contain("planner input rejected"));
    }

    #[test]
    fn oversized_grids_are_rejected_without_change() {
        let mut p = planner();
        let seen = record(&p);
        let before = p.value();

        assert!(matches!(
            p.set_rows(usize::MAX),
            Err(PlannerError::InvalidInput { .. })
        ));
        assert!(matches!(
            p.set_columns(MAX_TILES + 1),
            Err(PlannerError::InvalidInput { .. })
        ));
        assert_eq!(p.value(), before);

        p.set_mode(GridMode::Area).unwrap();
        let before = p.value();
        assert!(matches!(
            p.set_area(1e10, 1e10),
            Err(PlannerError::InvalidInput { .. })
        ));
        assert_eq!(p.value(), before);

        p.set_mode(GridMode::Bounds).unwrap();
        let before = p.value();
        assert!(matches!(
            p.set_bounds(-1e300, 1e300, 0.0, 1e300),
            Err(PlannerError::InvalidInput { .. })
        ));
        assert_eq!(p.value(), before);
        assert_eq!(p.shape(), GridShape::new(1, 1));

        let seen = seen.lock();
        assert!(!seen.contains(&Attribute::Rows));
        assert!(!seen.contains(&Attribute::AreaWidth));
        assert!(!seen.contains(&Attribute::BoundsTop));
    }

    #[test]
    fn inverted_bounds_name_the_logical_edge() {
        let mut p = planner();
        p.set_mode(GridMode::Bounds).unwrap();
        match p.set_bounds(3.0, 1.0, 0.0, 1.0) {
            Err(PlannerError::InvalidInput { field, .. }) => assert_eq!(field, "bounds_left"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }

        let mut flipped = VolumePlanner::builder()
            .plane(CoordinatePlane::new(["-x", "-y", "z"]).unwrap())
            .fov_dimensions(FovDimensions::new(1.0, 1.0))
            .build()
            .unwrap();
        flipped.set_mode(GridMode::Bounds).unwrap();
        let before = flipped.value();
        match flipped.set_bounds(3.0, 1.0, 0.0, 1.0) {
            Err(PlannerError::InvalidInput { field, .. }) => assert_eq!(field, "bounds_right"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        match flipped.set_bounds(0.0, 1.0, 2.0, 1.0) {
            Err(PlannerError::InvalidInput { field, .. }) => assert_eq!(field, "bounds_top"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        assert_eq!(flipped.value(), before);
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
    fn grown_tiles_take_the_current_setpoint() {
        let live = Arc::new(LiveSetpoint(Mutex::new(1.0)));
        let mut p = VolumePlanner::builder()
            .fov_dimensions(FovDimensions::new(1.0, 1.0))
            .catalog(ChannelCatalog::default().with_device("488", "lasers", "488nm"))
            .property(PropertyDescriptor::new(
                "488nm",
                "power_setpoint_mw",
                PropertyKind::Float,
            ))
            .setpoints(live.clone())
            .apply_all(false)
            .build()
            .unwrap();
        p.add_channel("488").unwrap();
        *live.0.lock() = 7.0;
        p.set_rows(2).unwrap();

        let power = ColumnKey::device("488nm", "power_setpoint_mw");
        let table = p.channels().table("488").unwrap();
        assert_eq!(table.cell(&power, 0, 0).unwrap(), CellValue::Float(1.0));
        assert_eq!(table.cell(&power, 1, 0).unwrap(), CellValue::Float(7.0));
    }

    #[test]
    fn area_mode_without_fov_is_rejected() {
        let mut p = VolumePlanner::builder().build().unwrap();
        assert!(p.set_mode(GridMode::Area).is_err());
        assert_eq!(p.spec().mode, GridMode::Number);
    }

    #[test]
    fn fov_position_follows_unanchored_axes() {
        let mut p = planner();
        p.set_anchor(1, true).unwrap();
        p.set_fov_position(2.0, 3.0, 4.0).unwrap();
        assert_eq!(p.grid_offset(), [2.0, 0.0, 4.0]);
        assert_eq!(p.tiles().next().unwrap().x, 2.0);
        assert_eq!(p.scan().start(0, 0).unwrap(), 4.0);
    }

    #[test]
    fn grid_offset_requires_anchor_and_is_clamped() {
        let mut p = planner();
        assert!(p.set_grid_offset(0, 5.0).is_err());
        p.set_anchor(0, true).unwrap();
        p.set_grid_offset(0, 50.0).unwrap();
        assert_eq!(p.grid_offset()[0], 10.0);
    }

    #[test]
    fn bounds_are_clamped_to_axis_limits() {
        let mut p = planner();
        p.set_mode(GridMode::Bounds).unwrap();
        p.set_bounds(-20.0, 2.0, 0.0, 3.0).unwrap();
        assert_eq!(p.spec().left, -10.0);
        assert_eq!(p.shape(), GridShape::new(3, 12));
    }

    #[test]
    fn shrinking_clamps_the_range_gate() {
        let mut p = planner();
        p.set_rows(4).unwrap();
        p.set_stop(Some(3)).unwrap();
        p.set_start(2).unwrap();
        let seen = record(&p);
        p.set_rows(2).unwrap();
        assert_eq!(p.range(), (1, 1));
        let seen = seen.lock();
        assert!(seen.contains(&Attribute::StopIndex));
        assert!(seen.contains(&Attribute::StartIndex));
    }

    #[test]
    fn range_gate_validation() {
        let mut p = planner();
        p.set_rows(3).unwrap();
        assert!(p.set_stop(Some(3)).is_err());
        p.set_stop(Some(1)).unwrap();
        assert!(p.set_start(2).is_err());
        p.set_start(1).unwrap();
        assert!(p.set_stop(Some(0)).is_err());
        p.set_stop(None).unwrap();
        assert_eq!(p.range(), (1, 2));
    }

    #[test]
    fn apply_all_toggle_broadcasts() {
        let mut p = planner();
        p.set_rows(2).unwrap();
        p.add_channel("488").unwrap();
        p.set_apply_all(false).unwrap();
        p.set_prefix("488", 1, 0, "b").unwrap();
        p.set_scan_end(1, 0, 9.0).unwrap();
        let seen = record(&p);
        p.set_apply_all(true).unwrap();
        assert!(p.channels().is_uniform());
        assert_eq!(p.scan().end(1, 0).unwrap(), 0.0);
        let seen = seen.lock();
        assert!(seen.contains(&Attribute::ApplyAll));
        assert!(seen.contains(&Attribute::ChannelCell));
        assert!(seen.contains(&Attribute::ScanEnds));
    }

    #[test]
    fn visibility_does_not_filter_tiles() {
        let mut p = planner();
        p.set_columns(2).unwrap();
        p.set_tile_visible(0, 1, false).unwrap();
        assert_eq!(p.visible_tiles().len(), 1);
        assert_eq!(p.tiles().count(), 2);
        assert!(p.set_tile_visible(5, 5, false).is_err());
    }

    #[test]
    fn channel_bookkeeping_publishes() {
        let mut p = planner();
        let seen = record(&p);
        p.add_channel("488").unwrap();
        p.add_channel("639").unwrap();
        p.reorder_channels(&["639", "488"]).unwrap();
        p.set_channel_order(ChannelOrder::PerVolume).unwrap();
        p.remove_channel("639").unwrap();
        assert!(p.add_channel("405").is_err());
        assert_eq!(
            *seen.lock(),
            vec![
                Attribute::ChannelAdded,
                Attribute::ChannelAdded,
                Attribute::ActiveChannels,
                Attribute::ChannelOrder,
                Attribute::ChannelRemoved
            ]
        );
    }

    #[test]
    fn scan_volume_change_renormalizes_channels() {
        let mut p = planner();
        p.add_channel("488").unwrap();
        p.set_scan_end(0, 0, 10.0).unwrap();
        p.set_step_size("488", 0, 0, 2.0).unwrap();
        p.set_scan_end(0, 0, 20.0).unwrap();
        assert_eq!(p.channels().table("488").unwrap().steps(0, 0).unwrap(), 10);
    }
}
