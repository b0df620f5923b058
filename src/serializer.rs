//! Acquisition tile list.
//!
//! Turns the planner state into the ordered records the acquisition runner
//! executes: one record per (channel, tile) inside the range gate, with the
//! tile position, the channel's device settings at that tile and its scan
//! discretisation.

use crate::channel::{CellValue, ChannelTable};
use crate::error::PlannerResult;
use crate::grid::Tile;
use crate::planner::VolumePlanner;
use crate::plane::{H0, H1, SCAN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Nesting of channels and tiles in the emitted list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelOrder {
    /// Every channel at a tile before moving on.
    #[default]
    PerTile,
    /// Every tile of a channel before the next channel.
    PerVolume,
}

/// Meaning of `tile_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileNumbering {
    /// Position in the full traversal (the tile table row).
    #[default]
    TableRow,
    /// Position inside the gated slice.
    SliceIndex,
}

/// One record of the acquisition program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionTile {
    /// Channel name.
    pub channel: String,
    /// Instrument axis name → position in the declared unit.
    pub position: BTreeMap<String, f64>,
    /// Tile number, see [`TileNumbering`].
    pub tile_number: usize,
    /// Device → property → value. Opaque properties are omitted.
    #[serde(flatten)]
    pub devices: BTreeMap<String, BTreeMap<String, CellValue>>,
    /// Slice count.
    pub steps: i64,
    /// Slice spacing in µm.
    pub step_size: f64,
    /// File-name prefix.
    pub prefix: String,
    /// Source tile.
    #[serde(skip)]
    pub tile: Tile,
}

/// Builds [`AcquisitionTile`] lists from a planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileListSerializer {
    order: ChannelOrder,
    numbering: TileNumbering,
}

impl TileListSerializer {
    /// Serializer with the given channel order and table-row numbering.
    pub fn new(order: ChannelOrder) -> Self {
        Self {
            order,
            numbering: TileNumbering::TableRow,
        }
    }

    /// Select the tile numbering.
    pub fn with_numbering(mut self, numbering: TileNumbering) -> Self {
        self.numbering = numbering;
        self
    }

    /// Emit the gated tile list.
    pub fn serialize(&self, planner: &VolumePlanner) -> PlannerResult<Vec<AcquisitionTile>> {
        let (start, stop) = planner.range();
        let slice: Vec<(usize, Tile)> = planner
            .tiles()
            .enumerate()
            .skip(start)
            .take(stop + 1 - start)
            .map(|(k, tile)| {
                let number = match self.numbering {
                    TileNumbering::TableRow => k,
                    TileNumbering::SliceIndex => k - start,
                };
                (number, tile)
            })
            .collect();

        let channels = planner.channels().active_channels();
        let mut records = Vec::with_capacity(slice.len() * channels.len());
        match self.order {
            ChannelOrder::PerTile => {
                for (number, tile) in &slice {
                    for channel in channels {
                        records.push(record(planner, channel, *number, *tile)?);
                    }
                }
            }
            ChannelOrder::PerVolume => {
                for channel in channels {
                    for (number, tile) in &slice {
                        records.push(record(planner, channel, *number, *tile)?);
                    }
                }
            }
        }
        debug!(
            records = records.len(),
            start,
            stop,
            order = ?self.order,
            "tile list serialized"
        );
        Ok(records)
    }

    /// Emit the gated tile list as pretty-printed JSON.
    pub fn to_json(&self, planner: &VolumePlanner) -> PlannerResult<String> {
        Ok(serde_json::to_string_pretty(&self.serialize(planner)?)?)
    }
}

fn record(
    planner: &VolumePlanner,
    channel: &str,
    tile_number: usize,
    tile: Tile,
) -> PlannerResult<AcquisitionTile> {
    let plane = planner.plane();
    let table = planner.channels().table(channel)?;
    let (row, col) = (tile.row, tile.col);

    let mut position = BTreeMap::new();
    position.insert(plane.axis(H0)?.name.clone(), tile.x);
    position.insert(plane.axis(H1)?.name.clone(), tile.y);
    position.insert(plane.axis(SCAN)?.name.clone(), planner.scan().start(row, col)?);

    Ok(AcquisitionTile {
        channel: channel.to_string(),
        position,
        tile_number,
        devices: device_settings(table, row, col)?,
        steps: table.steps(row, col)?,
        step_size: table.step_size(row, col)?,
        prefix: table.prefix(row, col)?.to_string(),
        tile,
    })
}

fn device_settings(
    table: &ChannelTable,
    row: usize,
    col: usize,
) -> PlannerResult<BTreeMap<String, BTreeMap<String, CellValue>>> {
    let mut devices = BTreeMap::new();
    for device in table.devices() {
        let mut properties = BTreeMap::new();
        for (property, column) in table.properties(device) {
            let ty = column.column_type();
            if !ty.is_settable() {
                continue;
            }
            let stored = column.cells().at(property, row, col)?.clone();
            let name = format!("{device}.{property}");
            let value = ty.coerce(&name, stored.clone()).unwrap_or(stored);
            properties.insert(property.to_string(), value);
        }
        devices.insert(device.clone(), properties);
    }
    Ok(devices)
}
