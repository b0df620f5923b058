//! Traversal orders over a `rows × columns` tile matrix.
//!
//! Rectangular orders are computed directly from the traversal position so
//! sequences never need to be materialised. The spiral order is tabulated once
//! per layout.

use serde::{Deserialize, Serialize};

/// Order in which tiles are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TileOrder {
    /// Row by row, columns left-to-right.
    #[default]
    RowWise,
    /// Column by column, rows top-to-bottom.
    ColumnWise,
    /// Row by row, alternating column direction.
    RowWiseSnake,
    /// Column by column, alternating row direction.
    ColumnWiseSnake,
    /// Outward from the central tile.
    Spiral,
}

impl TileOrder {
    /// All orders, in declaration order.
    pub const ALL: [TileOrder; 5] = [
        TileOrder::RowWise,
        TileOrder::ColumnWise,
        TileOrder::RowWiseSnake,
        TileOrder::ColumnWiseSnake,
        TileOrder::Spiral,
    ];
}

/// Matrix coordinate visited at traversal position `k` for rectangular orders.
///
/// Returns `None` for [`TileOrder::Spiral`], which is tabulated instead.
pub(crate) fn rect_cell(
    order: TileOrder,
    rows: usize,
    columns: usize,
    k: usize,
) -> Option<(usize, usize)> {
    match order {
        TileOrder::RowWise => Some((k / columns, k % columns)),
        TileOrder::RowWiseSnake => {
            let r = k / columns;
            let c = k % columns;
            Some(if r % 2 == 1 { (r, columns - 1 - c) } else { (r, c) })
        }
        TileOrder::ColumnWise => Some((k % rows, k / rows)),
        TileOrder::ColumnWiseSnake => {
            let c = k / rows;
            let r = k % rows;
            Some(if c % 2 == 1 { (rows - 1 - r, c) } else { (r, c) })
        }
        TileOrder::Spiral => None,
    }
}

/// Spiral traversal starting at the central cell and winding outward.
///
/// Walks a square spiral on the integer lattice and keeps the lattice points
/// that fall inside the grid window, shifted so the window starts at (0, 0).
pub(crate) fn spiral_cells(rows: usize, columns: usize) -> Vec<(usize, usize)> {
    let rows_i = rows as i64;
    let cols_i = columns as i64;
    let x_shift = (cols_i - if cols_i % 2 == 0 { 2 } else { 1 }) / 2;
    let y_shift = (rows_i - if rows_i % 2 == 0 { 2 } else { 1 }) / 2;

    let side = rows.max(columns);
    let mut cells = Vec::with_capacity(rows * columns);
    let (mut x, mut y) = (0i64, 0i64);
    let (mut dx, mut dy) = (0i64, -1i64);

    for _ in 0..side * side {
        if 2 * x > -cols_i && 2 * x <= cols_i && 2 * y > -rows_i && 2 * y <= rows_i {
            cells.push(((y + y_shift) as usize, (x + x_shift) as usize));
            if cells.len() == rows * columns {
                break;
            }
        }
        if x == y || (x < 0 && x == -y) || (x > 0 && x == 1 - y) {
            (dx, dy) = (-dy, dx);
        }
        x += dx;
        y += dy;
    }
    cells
}
