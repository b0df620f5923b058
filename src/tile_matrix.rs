//! Per-tile storage.
//!
//! Every per-tile array in the planner (scan endpoints, visibility, and each
//! channel column) is a [`TileArray`]. Stores that own such arrays implement
//! [`TileStore`] so that [`TileMatrix::reshape`] resizes all of them in one
//! pass before any change is published.

use crate::error::{PlannerError, PlannerResult};
use crate::grid::GridShape;
use tracing::debug;

/// How cells created by a reshape are initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeding {
    /// Copy cell (0, 0). Used while apply-all is on.
    FromOrigin,
    /// Use each array's own default.
    Defaults,
}

impl Seeding {
    /// Seeding policy for the given apply-all state.
    pub fn for_apply_all(apply_all: bool) -> Self {
        if apply_all {
            Seeding::FromOrigin
        } else {
            Seeding::Defaults
        }
    }
}

/// Row-major 2-D array indexed by tile `(row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileArray<T> {
    shape: GridShape,
    cells: Vec<T>,
}

impl<T: Clone> TileArray<T> {
    /// Array of `shape` with every cell set to `value`.
    pub fn filled(shape: GridShape, value: T) -> Self {
        Self {
            shape,
            cells: vec![value; shape.len()],
        }
    }

    /// Current shape.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.shape.rows && col < self.shape.columns).then(|| row * self.shape.columns + col)
    }

    /// Cell at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        self.index(row, col).map(|i| &self.cells[i])
    }

    /// Cell at `(row, col)`, or an error naming `field` when out of range.
    pub fn at(&self, field: &str, row: usize, col: usize) -> PlannerResult<&T> {
        self.get(row, col).ok_or_else(|| out_of_range(field, row, col, self.shape))
    }

    /// Overwrite cell `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> PlannerResult<()> {
        let shape = self.shape;
        let i = self
            .index(row, col)
            .ok_or_else(|| out_of_range("tile", row, col, shape))?;
        self.cells[i] = value;
        Ok(())
    }

    /// Overwrite every cell.
    pub fn fill(&mut self, value: T) {
        for cell in &mut self.cells {
            *cell = value.clone();
        }
    }

    /// Cell (0, 0).
    pub fn origin(&self) -> Option<&T> {
        self.cells.first()
    }

    /// Copy cell (0, 0) into every other cell.
    pub fn broadcast_from_origin(&mut self) {
        if let Some(origin) = self.cells.first().cloned() {
            self.fill(origin);
        }
    }

    /// Resize, preserving the intersection of the old and new shapes.
    ///
    /// New cells take `seed`.
    pub fn reshape(&mut self, shape: GridShape, seed: &T) {
        if shape == self.shape {
            return;
        }
        let mut cells = Vec::with_capacity(shape.len());
        for row in 0..shape.rows {
            for col in 0..shape.columns {
                let value = match self.get(row, col) {
                    Some(existing) => existing.clone(),
                    None => seed.clone(),
                };
                cells.push(value);
            }
        }
        self.shape = shape;
        self.cells = cells;
    }

    /// Resize using `seeding`, with `default` standing in for [`Seeding::Defaults`].
    pub fn reshape_seeded(&mut self, shape: GridShape, seeding: Seeding, default: &T) {
        let seed = match (seeding, self.origin()) {
            (Seeding::FromOrigin, Some(origin)) => origin.clone(),
            _ => default.clone(),
        };
        self.reshape(shape, &seed);
    }

    /// Iterate cells with their coordinates in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &T)> {
        let columns = self.shape.columns.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, v)| ((i / columns, i % columns), v))
    }

    /// Mutable access to every cell.
    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.cells.iter_mut()
    }
}

impl<T: Clone + PartialEq> TileArray<T> {
    /// True when every cell equals cell (0, 0).
    pub fn is_uniform(&self) -> bool {
        match self.cells.first() {
            Some(origin) => self.cells.iter().all(|c| c == origin),
            None => true,
        }
    }
}

fn out_of_range(field: &str, row: usize, col: usize, shape: GridShape) -> PlannerError {
    PlannerError::invalid(
        field,
        format!(
            "tile ({row}, {col}) is outside the {}x{} grid",
            shape.rows, shape.columns
        ),
    )
}

/// Owner of one or more per-tile arrays that follow the grid shape.
pub trait TileStore {
    /// Resize every owned array to `shape`.
    fn reshape(&mut self, shape: GridShape, seeding: Seeding);

    /// Copy cell (0, 0) of every owned array into all other cells.
    fn broadcast_from_origin(&mut self);
}

/// Grid-shaped bookkeeping shared by all per-tile arrays.
///
/// Holds the authoritative shape and the visibility flags; the other stores
/// are passed in at reshape time so every array changes together.
#[derive(Debug, Clone)]
pub struct TileMatrix {
    shape: GridShape,
    visible: TileArray<bool>,
}

impl TileMatrix {
    /// Matrix of `shape` with every tile visible.
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            visible: TileArray::filled(shape, true),
        }
    }

    /// Current shape.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Resize the matrix and every registered store.
    ///
    /// Returns `true` when the shape changed.
    pub fn reshape(
        &mut self,
        shape: GridShape,
        seeding: Seeding,
        stores: &mut [&mut dyn TileStore],
    ) -> bool {
        if shape == self.shape {
            return false;
        }
        debug!(
            from_rows = self.shape.rows,
            from_columns = self.shape.columns,
            rows = shape.rows,
            columns = shape.columns,
            ?seeding,
            "reshaping tile matrix"
        );
        TileStore::reshape(self, shape, seeding);
        for store in stores.iter_mut() {
            store.reshape(shape, seeding);
        }
        true
    }

    /// Broadcast cell (0, 0) across this matrix and every registered store.
    pub fn broadcast_from_origin(&mut self, stores: &mut [&mut dyn TileStore]) {
        TileStore::broadcast_from_origin(self);
        for store in stores.iter_mut() {
            store.broadcast_from_origin();
        }
    }

    /// Visibility of tile `(row, col)`.
    pub fn is_visible(&self, row: usize, col: usize) -> PlannerResult<bool> {
        self.visible.at("tile_visibility", row, col).copied()
    }

    /// Set visibility of tile `(row, col)`; returns whether it changed.
    pub fn set_visible(&mut self, row: usize, col: usize, visible: bool) -> PlannerResult<bool> {
        let current = self.is_visible(row, col)?;
        if current == visible {
            return Ok(false);
        }
        self.visible.set(row, col, visible)?;
        Ok(true)
    }

    /// Visibility flags.
    pub fn visibility(&self) -> &TileArray<bool> {
        &self.visible
    }
}

impl TileStore for TileMatrix {
    fn reshape(&mut self, shape: GridShape, _seeding: Seeding) {
        // visibility is a display flag; new tiles always start visible
        self.visible.reshape(shape, &true);
        self.shape = shape;
    }

    fn broadcast_from_origin(&mut self) {}
}
