//! Bridges
//!
//! A bridge is a directed link between two cells along which the source
//! periodically spawns balls. A pair of opposite bridges between the same
//! cells is merged into a two-way connection; removing one side demotes the
//! other back to one-way.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, to_int};
use crate::game::cell::CellId;

/// Key of a directed bridge: `(source, target)`.
pub type BridgeKey = (CellId, CellId);

/// Whether a bridge is paired with its reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeDirection {
    /// Unpaired.
    #[default]
    OneWay,
    /// A target->source sibling exists.
    TwoWay,
}

/// A directed bridge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    /// Spawning end.
    pub source: CellId,
    /// Receiving end.
    pub target: CellId,
    /// One-way or merged with its reverse.
    pub direction: BridgeDirection,
    /// True iff the reverse sibling exists and is merged.
    pub has_reverse: bool,
    /// Points charged to the source at creation.
    pub creation_cost: u32,
    /// Creation order within the simulation.
    pub serial: u32,
}

impl Bridge {
    /// Create a one-way bridge.
    pub fn new(source: CellId, target: CellId, creation_cost: u32) -> Self {
        Self {
            source,
            target,
            direction: BridgeDirection::OneWay,
            has_reverse: false,
            creation_cost,
            serial: 0,
        }
    }

    /// This bridge's key.
    #[inline]
    pub fn key(&self) -> BridgeKey {
        (self.source, self.target)
    }

    /// Key of the reverse sibling.
    #[inline]
    pub fn reverse_key(&self) -> BridgeKey {
        (self.target, self.source)
    }

    /// True if either end is `cell`.
    #[inline]
    pub fn touches(&self, cell: CellId) -> bool {
        self.source == cell || self.target == cell
    }

    /// Mark as merged with its reverse.
    pub fn promote(&mut self) {
        self.direction = BridgeDirection::TwoWay;
        self.has_reverse = true;
    }

    /// Undo a merge after the reverse was removed.
    pub fn demote(&mut self) {
        self.direction = BridgeDirection::OneWay;
        self.has_reverse = false;
    }
}

/// Creation cost for a bridge of the given length.
///
/// `max(1, floor(distance / divisor))`, with `distance` in Q16.16 pixels.
pub fn bridge_cost(distance: Fixed, divisor: i32) -> u32 {
    let whole_pixels = to_int(distance).max(0);
    let cost = if divisor > 0 { whole_pixels / divisor } else { whole_pixels };
    cost.max(1) as u32
}
