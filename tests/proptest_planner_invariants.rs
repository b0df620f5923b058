//! Property-based invariant tests for the volume planner.
//!
//! These tests verify structural invariants that must hold for any valid inputs:
//!
//! 1. Tile count equals rows × columns in every mode.
//! 2. The traversal is a permutation of the matrix coordinates.
//! 3. Reversing twice restores the traversal.
//! 4. Adjacent tile centres are `fov · (1 − overlap)` apart.
//! 5. With apply-all on, every per-tile array equals its (0, 0) cell.
//! 6. Anchored axes ignore field-of-view updates.
//! 7. Free axes follow the most recent field-of-view position.
//! 8. steps → step size → steps recovers the step count.
//! 9. Switching channel order reshuffles records stably.
//! 10. Rejected edits leave the planner untouched.

use std::collections::BTreeSet;

use proptest::prelude::*;
use voxel_planner::channel::{ChannelCatalog, PropertyDescriptor, PropertyKind};
use voxel_planner::grid::{FovDimensions, GridMode, GridPlan, GridSpec, RelativeTo, TileOrder};
use voxel_planner::planner::VolumePlanner;
use voxel_planner::scan::Discretization;
use voxel_planner::serializer::{ChannelOrder, TileListSerializer};

// ── Helpers ─────────────────────────────────────────────────────────────

const EPS: f64 = 1e-9;
const CHANNELS: [&str; 3] = ["405", "488", "639"];

fn order_strategy() -> impl Strategy<Value = TileOrder> {
    prop_oneof![
        Just(TileOrder::RowWise),
        Just(TileOrder::ColumnWise),
        Just(TileOrder::RowWiseSnake),
        Just(TileOrder::ColumnWiseSnake),
        Just(TileOrder::Spiral),
    ]
}

fn mode_strategy() -> impl Strategy<Value = GridMode> {
    prop_oneof![
        Just(GridMode::Number),
        Just(GridMode::Area),
        Just(GridMode::Bounds),
    ]
}

fn relative_strategy() -> impl Strategy<Value = RelativeTo> {
    prop_oneof![Just(RelativeTo::Center), Just(RelativeTo::OriginCorner)]
}

fn bounds_strategy() -> impl Strategy<Value = [f64; 4]> {
    (-10.0f64..10.0, 0.0f64..15.0, -10.0f64..10.0, 0.0f64..15.0)
        .prop_map(|(left, span_h0, bottom, span_h1)| {
            [left, left + span_h0, bottom, bottom + span_h1]
        })
}

prop_compose! {
    fn spec_strategy()(
        mode in mode_strategy(),
        rows in 1usize..=8,
        columns in 1usize..=8,
        area in (0.0f64..20.0, 0.0f64..20.0),
        bounds in bounds_strategy(),
        overlap in -0.5f64..0.75,
        order in order_strategy(),
        reverse in any::<bool>(),
        relative_to in relative_strategy(),
    ) -> GridSpec {
        let [left, right, bottom, top] = bounds;
        GridSpec {
            mode,
            rows,
            columns,
            width: area.0,
            height: area.1,
            left,
            right,
            bottom,
            top,
            overlap,
            order,
            reverse,
            relative_to,
        }
    }
}

fn fov_strategy() -> impl Strategy<Value = FovDimensions> {
    (0.5f64..5.0, 0.5f64..5.0).prop_map(|(h0, h1)| FovDimensions::new(h0, h1))
}

fn planner() -> VolumePlanner {
    let mut catalog = ChannelCatalog::default();
    let mut builder = VolumePlanner::builder().fov_dimensions(FovDimensions::new(1.0, 1.0));
    for channel in CHANNELS {
        let laser = format!("{channel}nm");
        catalog = catalog.with_device(channel, "lasers", &laser);
        builder = builder.property(
            PropertyDescriptor::new(&laser, "power_setpoint_mw", PropertyKind::Float)
                .with_range(0.0, 100.0),
        );
    }
    builder.catalog(catalog).build().unwrap()
}

#[derive(Debug, Clone)]
enum Edit {
    Rows(usize),
    Columns(usize),
    Prefix(usize, usize, String),
    StepSize(usize, usize, f64),
    ScanEnd(usize, usize, f64),
    Power(usize, usize, f64),
    FovPosition(f64, f64, f64),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (1usize..=4).prop_map(Edit::Rows),
        (1usize..=4).prop_map(Edit::Columns),
        (0usize..4, 0usize..4, "[a-z]{0,6}").prop_map(|(r, c, s)| Edit::Prefix(r, c, s)),
        (0usize..4, 0usize..4, 0.1f64..5.0).prop_map(|(r, c, v)| Edit::StepSize(r, c, v)),
        (0usize..4, 0usize..4, 0.0f64..50.0).prop_map(|(r, c, v)| Edit::ScanEnd(r, c, v)),
        (0usize..4, 0usize..4, 0.0f64..150.0).prop_map(|(r, c, v)| Edit::Power(r, c, v)),
        (-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0).prop_map(|(a, b, s)| Edit::FovPosition(a, b, s)),
    ]
}

fn apply(planner: &mut VolumePlanner, edit: &Edit) {
    // rejected edits are part of the exercise
    let _ = match edit {
        Edit::Rows(n) => planner.set_rows(*n),
        Edit::Columns(n) => planner.set_columns(*n),
        Edit::Prefix(r, c, s) => planner.set_prefix("488", *r, *c, s),
        Edit::StepSize(r, c, v) => planner.set_step_size("488", *r, *c, *v),
        Edit::ScanEnd(r, c, v) => planner.set_scan_end(*r, *c, *v),
        Edit::Power(r, c, v) => planner.set_cell(
            &voxel_planner::CellAddress::new(
                "488",
                voxel_planner::ColumnKey::device("488nm", "power_setpoint_mw"),
                *r,
                *c,
            ),
            *v,
        ),
        Edit::FovPosition(a, b, s) => planner.set_fov_position(*a, *b, *s),
    };
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Tile count equals rows × columns
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn tile_count_matches_shape(spec in spec_strategy(), fov in fov_strategy()) {
        let plan = GridPlan::new(&spec, fov).unwrap();
        let shape = plan.shape();
        let sequence = plan.sequence();
        prop_assert!(shape.rows >= 1 && shape.columns >= 1);
        prop_assert_eq!(sequence.len(), shape.rows * shape.columns);
        prop_assert_eq!(sequence.iter().count(), shape.rows * shape.columns);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Traversal is a permutation of the matrix coordinates
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn traversal_is_permutation(spec in spec_strategy(), fov in fov_strategy()) {
        let plan = GridPlan::new(&spec, fov).unwrap();
        let shape = plan.shape();
        let visited: Vec<(usize, usize)> = plan.sequence().iter().map(|t| (t.row, t.col)).collect();
        let unique: BTreeSet<(usize, usize)> = visited.iter().copied().collect();
        let expected: BTreeSet<(usize, usize)> = (0..shape.rows)
            .flat_map(|r| (0..shape.columns).map(move |c| (r, c)))
            .collect();
        prop_assert_eq!(visited.len(), unique.len(), "traversal repeats a tile");
        prop_assert_eq!(unique, expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Reverse involution
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reverse_twice_is_identity(spec in spec_strategy(), fov in fov_strategy()) {
        let forward = GridPlan::new(&spec, fov).unwrap().sequence().to_vec();
        let flipped = GridSpec { reverse: !spec.reverse, ..spec.clone() };
        let backward = GridPlan::new(&flipped, fov).unwrap().sequence().to_vec();
        let twice = GridSpec { reverse: !flipped.reverse, ..flipped };
        let restored = GridPlan::new(&twice, fov).unwrap().sequence().to_vec();

        let mut reversed = backward.clone();
        reversed.reverse();
        prop_assert_eq!(&reversed, &forward);
        prop_assert_eq!(restored, forward);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Overlap scaling
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn neighbours_are_one_step_apart(
        rows in 1usize..=6,
        columns in 1usize..=6,
        overlap in -0.5f64..0.9,
        fov in fov_strategy(),
    ) {
        let spec = GridSpec { rows, columns, overlap, ..GridSpec::default() };
        let sequence = GridPlan::new(&spec, fov).unwrap().sequence();
        let tiles = sequence.to_vec();
        let at = |r: usize, c: usize| {
            tiles.iter().find(|t| t.row == r && t.col == c).copied().unwrap()
        };
        let dx = fov.h0 * (1.0 - overlap);
        let dy = fov.h1 * (1.0 - overlap);

        for r in 0..rows {
            for c in 0..columns {
                if c + 1 < columns {
                    let gap = at(r, c + 1).x - at(r, c).x;
                    prop_assert!((gap - dx).abs() < EPS, "h0 gap {} != {}", gap, dx);
                }
                if r + 1 < rows {
                    let gap = at(r, c).y - at(r + 1, c).y;
                    prop_assert!((gap - dy).abs() < EPS, "h1 gap {} != {}", gap, dy);
                }
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Apply-all broadcast
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn apply_all_keeps_arrays_uniform(edits in proptest::collection::vec(edit_strategy(), 1..30)) {
        let mut p = planner();
        p.add_channel("488").unwrap();
        for edit in &edits {
            apply(&mut p, edit);
            prop_assert!(p.scan().starts().is_uniform(), "starts diverged after {:?}", edit);
            prop_assert!(p.scan().ends().is_uniform(), "ends diverged after {:?}", edit);
            prop_assert!(p.channels().is_uniform(), "channel table diverged after {:?}", edit);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Anchor idempotence
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn anchored_axis_ignores_fov(
        axis in 0usize..3,
        positions in proptest::collection::vec((-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0), 1..10),
    ) {
        let mut p = planner();
        p.set_anchor(axis, true).unwrap();
        let pinned = p.grid_offset()[axis];
        for (a, b, s) in positions {
            p.set_fov_position(a, b, s).unwrap();
            prop_assert_eq!(p.grid_offset()[axis], pinned);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Anchor follow
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn free_axes_follow_fov(
        anchored in proptest::array::uniform3(any::<bool>()),
        positions in proptest::collection::vec((-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0), 1..10),
    ) {
        let mut p = planner();
        for (axis, &flag) in anchored.iter().enumerate() {
            p.set_anchor(axis, flag).unwrap();
        }
        for (a, b, s) in positions {
            p.set_fov_position(a, b, s).unwrap();
            let position = [a, b, s];
            for axis in 0..3 {
                if !anchored[axis] {
                    prop_assert_eq!(p.grid_offset()[axis], position[axis]);
                }
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 8. Step / volume round trip
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn steps_survive_step_size_round_trip(volume in 10.0f64..1000.0, steps in 1i64..=100) {
        let by_steps = Discretization::from_steps(volume, steps);
        prop_assert!(by_steps.step_size_um > 0.0);
        let by_size = Discretization::from_step_size(volume, by_steps.step_size_um);
        prop_assert_eq!(by_size.steps, steps);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 9. Serializer ordering law
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn channel_order_is_a_stable_reshuffle(
        rows in 1usize..=4,
        columns in 1usize..=4,
        active in proptest::sample::subsequence(CHANNELS.to_vec(), 1..=3),
        gate in (0usize..16, 0usize..16),
    ) {
        let mut p = planner();
        p.set_rows(rows).unwrap();
        p.set_columns(columns).unwrap();
        for channel in &active {
            p.add_channel(channel).unwrap();
        }
        let last = rows * columns - 1;
        let (a, b) = (gate.0.min(last), gate.1.min(last));
        p.set_stop(Some(a.max(b))).unwrap();
        p.set_start(a.min(b)).unwrap();

        let key = |r: &voxel_planner::AcquisitionTile| (r.channel.clone(), r.tile_number);
        let per_tile: Vec<_> = TileListSerializer::new(ChannelOrder::PerTile)
            .serialize(&p).unwrap().iter().map(key).collect();
        let per_volume: Vec<_> = TileListSerializer::new(ChannelOrder::PerVolume)
            .serialize(&p).unwrap().iter().map(key).collect();

        prop_assert_eq!(per_tile.len(), (a.max(b) - a.min(b) + 1) * active.len());
        let mut sorted_tile = per_tile.clone();
        let mut sorted_volume = per_volume.clone();
        sorted_tile.sort();
        sorted_volume.sort();
        prop_assert_eq!(sorted_tile, sorted_volume);

        for channel in &active {
            let pick = |list: &[(String, usize)]| -> Vec<usize> {
                list.iter().filter(|(c, _)| c.as_str() == *channel).map(|(_, n)| *n).collect()
            };
            prop_assert_eq!(pick(&per_tile), pick(&per_volume));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 10. Rejected edits leave the planner untouched
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn rejected_edits_do_not_mutate(overlap in prop_oneof![1.0f64..10.0, -10.0f64..=-1.0]) {
        let mut p = planner();
        p.add_channel("488").unwrap();
        let before = p.value();
        prop_assert!(p.set_overlap(overlap).is_err());
        prop_assert!(p.set_rows(0).is_err());
        prop_assert!(p.set_scan_end(0, 0, f64::NAN).is_err());
        prop_assert_eq!(p.value(), before);
    }
}
