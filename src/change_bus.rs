//! Named-attribute change notifications.
//!
//! Every planner mutation collects the attributes it touched into a
//! [`ChangeSet`] and publishes it once, after all arrays are consistent.
//! Subscribers register for one attribute or for all of them and receive
//! [`ChangeEvent`]s in a deterministic order.
//!
//! A subscriber must not synchronously re-publish the attribute it is being
//! notified about; the bus rejects that with
//! [`PlannerError::InternalReentrancy`]. Cascaded updates go out under a
//! different attribute.
//!
//! # Example
//!
//! ```
//! use voxel_planner::change_bus::{Attribute, ChangeBus, ChangeSet};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let bus = ChangeBus::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let counter = hits.clone();
//! bus.subscribe("rows", move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! })
//! .unwrap();
//!
//! let mut changes = ChangeSet::new();
//! changes.mark(Attribute::Rows);
//! changes.mark(Attribute::TilesInvalidated);
//! bus.publish(changes).unwrap();
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use crate::error::{PlannerError, PlannerResult};
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Stable attribute vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    /// `mode`
    Mode,
    /// `rows`
    Rows,
    /// `columns`
    Columns,
    /// `area_width`
    AreaWidth,
    /// `area_height`
    AreaHeight,
    /// `bounds_left`
    BoundsLeft,
    /// `bounds_right`
    BoundsRight,
    /// `bounds_top`
    BoundsTop,
    /// `bounds_bottom`
    BoundsBottom,
    /// `overlap`
    Overlap,
    /// `order`
    Order,
    /// `reverse`
    Reverse,
    /// `relative_to`
    RelativeTo,
    /// `anchor_{0,1,2}`
    Anchor(usize),
    /// `grid_offset_{0,1,2}`
    GridOffset(usize),
    /// `fov_position`
    FovPosition,
    /// `fov_dimensions`
    FovDimensions,
    /// `apply_all`
    ApplyAll,
    /// `channel_added`
    ChannelAdded,
    /// `channel_removed`
    ChannelRemoved,
    /// `channel_cell`
    ChannelCell,
    /// `scan_starts`
    ScanStarts,
    /// `scan_ends`
    ScanEnds,
    /// `start_index`
    StartIndex,
    /// `stop_index`
    StopIndex,
    /// `tiles_invalidated`
    TilesInvalidated,
    /// `channel_order`
    ChannelOrder,
    /// `active_channels`
    ActiveChannels,
    /// `tile_visibility`
    TileVisibility,
}

impl Attribute {
    /// Every attribute name in vocabulary order.
    pub fn vocabulary() -> Vec<Attribute> {
        use Attribute::*;
        let mut all = vec![
            Mode,
            Rows,
            Columns,
            AreaWidth,
            AreaHeight,
            BoundsLeft,
            BoundsRight,
            BoundsTop,
            BoundsBottom,
            Overlap,
            Order,
            Reverse,
            RelativeTo,
        ];
        all.extend((0..3).map(Anchor));
        all.extend((0..3).map(GridOffset));
        all.extend([
            FovPosition,
            FovDimensions,
            ApplyAll,
            ChannelAdded,
            ChannelRemoved,
            ChannelCell,
            ScanStarts,
            ScanEnds,
            StartIndex,
            StopIndex,
            TilesInvalidated,
            ChannelOrder,
            ActiveChannels,
            TileVisibility,
        ]);
        all
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Attribute::Mode => "mode",
            Attribute::Rows => "rows",
            Attribute::Columns => "columns",
            Attribute::AreaWidth => "area_width",
            Attribute::AreaHeight => "area_height",
            Attribute::BoundsLeft => "bounds_left",
            Attribute::BoundsRight => "bounds_right",
            Attribute::BoundsTop => "bounds_top",
            Attribute::BoundsBottom => "bounds_bottom",
            Attribute::Overlap => "overlap",
            Attribute::Order => "order",
            Attribute::Reverse => "reverse",
            Attribute::RelativeTo => "relative_to",
            Attribute::Anchor(i) => return write!(f, "anchor_{i}"),
            Attribute::GridOffset(i) => return write!(f, "grid_offset_{i}"),
            Attribute::FovPosition => "fov_position",
            Attribute::FovDimensions => "fov_dimensions",
            Attribute::ApplyAll => "apply_all",
            Attribute::ChannelAdded => "channel_added",
            Attribute::ChannelRemoved => "channel_removed",
            Attribute::ChannelCell => "channel_cell",
            Attribute::ScanStarts => "scan_starts",
            Attribute::ScanEnds => "scan_ends",
            Attribute::StartIndex => "start_index",
            Attribute::StopIndex => "stop_index",
            Attribute::TilesInvalidated => "tiles_invalidated",
            Attribute::ChannelOrder => "channel_order",
            Attribute::ActiveChannels => "active_channels",
            Attribute::TileVisibility => "tile_visibility",
        };
        f.write_str(name)
    }
}

impl FromStr for Attribute {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::vocabulary()
            .into_iter()
            .find(|a| a.to_string() == s)
            .ok_or_else(|| PlannerError::invalid("attribute", format!("unknown attribute '{s}'")))
    }
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What changed.
    pub attribute: Attribute,
    /// Optional qualifier, e.g. the channel name for `channel_added`.
    pub detail: Option<String>,
    /// Sequence number of the user action that produced the event.
    pub action: u64,
}

/// Attributes touched by one user action, in first-touch order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<(Attribute, Option<String>)>,
}

impl ChangeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `attribute`.
    pub fn mark(&mut self, attribute: Attribute) -> &mut Self {
        self.push(attribute, None)
    }

    /// Record `attribute` with a qualifier.
    pub fn mark_with(&mut self, attribute: Attribute, detail: impl Into<String>) -> &mut Self {
        self.push(attribute, Some(detail.into()))
    }

    /// Record `attribute` when `changed` is true.
    pub fn mark_if(&mut self, changed: bool, attribute: Attribute) -> &mut Self {
        if changed {
            self.mark(attribute);
        }
        self
    }

    fn push(&mut self, attribute: Attribute, detail: Option<String>) -> &mut Self {
        if !self
            .entries
            .iter()
            .any(|(a, d)| *a == attribute && *d == detail)
        {
            self.entries.push((attribute, detail));
        }
        self
    }

    /// Whether `attribute` was recorded.
    pub fn contains(&self, attribute: Attribute) -> bool {
        self.entries.iter().any(|(a, _)| *a == attribute)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded attributes in order.
    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.entries.iter().map(|(a, _)| *a)
    }
}

/// Handle returned by subscribe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    filter: Option<Attribute>,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    next_action: u64,
    subscribers: Vec<Subscriber>,
    delivering: Vec<Attribute>,
}

/// Publish/subscribe hub keyed by [`Attribute`].
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct ChangeBus {
    state: Arc<Mutex<BusState>>,
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ChangeBus")
            .field("subscribers", &state.subscribers.len())
            .field("delivering", &state.delivering)
            .finish()
    }
}

impl ChangeBus {
    /// Bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the attribute named `name`.
    ///
    /// Unknown names are rejected with [`PlannerError::InvalidInput`].
    pub fn subscribe(
        &self,
        name: &str,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> PlannerResult<SubscriptionId> {
        let attribute: Attribute = name.parse()?;
        Ok(self.subscribe_to(attribute, callback))
    }

    /// Subscribe to one attribute.
    pub fn subscribe_to(
        &self,
        attribute: Attribute,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.insert(Some(attribute), Arc::new(callback))
    }

    /// Subscribe to every attribute.
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.insert(None, Arc::new(callback))
    }

    fn insert(&self, filter: Option<Attribute>, callback: Callback) -> SubscriptionId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscribers.push(Subscriber {
            id,
            filter,
            callback,
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id != id);
        state.subscribers.len() != before
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Whether `attribute` is currently being delivered.
    pub fn is_delivering(&self, attribute: Attribute) -> bool {
        self.state.lock().delivering.contains(&attribute)
    }

    /// Deliver every entry of `changes` as one action.
    ///
    /// Events go out in the set's order; each event reaches matching
    /// subscribers in subscription order. Callbacks run with the bus
    /// unlocked, so they may subscribe or publish other attributes.
    pub fn publish(&self, changes: ChangeSet) -> PlannerResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let (action, deliveries) = {
            let mut state = self.state.lock();
            if let Some(attribute) = changes
                .attributes()
                .find(|a| state.delivering.contains(a))
            {
                return Err(PlannerError::InternalReentrancy(attribute.to_string()));
            }
            state.next_action += 1;
            let action = state.next_action;
            let deliveries: Vec<(ChangeEvent, Vec<Callback>)> = changes
                .entries
                .into_iter()
                .map(|(attribute, detail)| {
                    let callbacks = state
                        .subscribers
                        .iter()
                        .filter(|s| s.filter.map_or(true, |f| f == attribute))
                        .map(|s| s.callback.clone())
                        .collect();
                    (
                        ChangeEvent {
                            attribute,
                            detail,
                            action,
                        },
                        callbacks,
                    )
                })
                .collect();
            state
                .delivering
                .extend(deliveries.iter().map(|(e, _)| e.attribute));
            (action, deliveries)
        };

        let _guard = DeliveryGuard {
            state: &self.state,
            count: deliveries.len(),
        };
        debug!(action, events = deliveries.len(), "publishing changes");
        for (event, callbacks) in &deliveries {
            trace!(attribute = %event.attribute, detail = ?event.detail, "change delivered");
            for callback in callbacks {
                callback(event);
            }
        }
        Ok(())
    }
}

/// Pops the delivering stack even if a callback panics.
struct DeliveryGuard<'a> {
    state: &'a Mutex<BusState>,
    count: usize,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let keep = state.delivering.len().saturating_sub(self.count);
        state.delivering.truncate(keep);
    }
}
