//! Game Events
//!
//! Every committed command and every significant automatic transition emits
//! one `GameEvent`. The recorder, the playback driver and the network layer
//! consume this stream through the `EventSink` trait; the simulation itself
//! knows nothing about how events are stored or sent.
//!
//! Serialized form (JSON):
//!
//! ```text
//! {"tick": 120, "timestamp": 2000, "eventType": "BRIDGE_CREATED",
//!  "data": {"sourceId": 0, "targetId": 3, "direction": "ONE_WAY", "cost": 6}}
//! ```

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, FIXED_ONE};
use crate::core::vec2::FixedVec2;
use crate::game::bridge::BridgeDirection;
use crate::game::cell::{Cell, CellId, CellShape, CellType, EvolutionLevel, Faction};
use crate::game::command::Command;
use crate::game::config::SimulationConfig;

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Serializable view of one cell, used by `GAME_START` and `GAME_END`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSnapshot {
    /// Stable cell id.
    pub id: CellId,
    /// Centre x in pixels.
    pub x: f64,
    /// Centre y in pixels.
    pub y: f64,
    /// Owner.
    #[serde(rename = "type")]
    pub cell_type: CellType,
    /// Shape.
    pub shape: CellShape,
    /// Evolution level (derived, informational).
    pub evolution: EvolutionLevel,
    /// Point balance.
    pub points: u32,
}

impl CellSnapshot {
    /// Capture a cell.
    pub fn of(cell: &Cell) -> Self {
        Self {
            id: cell.id,
            x: fixed_to_pixels(cell.position.x),
            y: fixed_to_pixels(cell.position.y),
            cell_type: cell.cell_type,
            shape: cell.shape,
            evolution: cell.evolution(),
            points: cell.points(),
        }
    }

    /// Position back in fixed point.
    pub fn position(&self) -> FixedVec2 {
        FixedVec2::new(pixels_to_fixed(self.x), pixels_to_fixed(self.y))
    }
}

/// Exact Q16.16 -> f64 conversion (f64 holds every Q16.16 value).
fn fixed_to_pixels(value: Fixed) -> f64 {
    value as f64 / FIXED_ONE as f64
}

fn pixels_to_fixed(value: f64) -> Fixed {
    (value * FIXED_ONE as f64).round() as Fixed
}

// =============================================================================
// EVENT PAYLOADS
// =============================================================================

/// How an empty or owned cell changed hands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureCause {
    /// Influence on an empty cell crossed the threshold.
    Empty,
    /// An owned cell was depleted to zero points.
    Combat,
}

/// Why a bridge disappeared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalReason {
    /// A `RemoveBridge` command.
    Manual,
    /// An endpoint was captured through combat.
    Capture,
    /// The source lost an evolution level and was over its bridge cap.
    Downgrade,
}

/// Why the active turn changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnSwitchReason {
    /// The turn timer expired.
    Timer,
    /// The active side made a move.
    MoveMade,
    /// An explicit `SwitchTurn` command.
    Manual,
}

/// Event payloads, one variant per event type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum GameEventData {
    /// Initial board.
    #[serde(rename_all = "camelCase")]
    GameStart {
        seed: u64,
        turn_based: bool,
        config: SimulationConfig,
        cells: Vec<CellSnapshot>,
    },

    /// A bridge was built.
    #[serde(rename_all = "camelCase")]
    BridgeCreated {
        source_id: CellId,
        target_id: CellId,
        direction: BridgeDirection,
        cost: u32,
    },

    /// A bridge was removed. `refund` went to `refunded_to`, if any.
    #[serde(rename_all = "camelCase")]
    BridgeRemoved {
        source_id: CellId,
        target_id: CellId,
        reason: RemovalReason,
        refund: u32,
        refunded_to: Option<CellId>,
    },

    /// Every outgoing bridge of a cell was removed on request.
    #[serde(rename_all = "camelCase")]
    AllBridgesRemoved {
        cell_id: CellId,
        count: u32,
    },

    /// A cell changed owner.
    #[serde(rename_all = "camelCase")]
    CellCaptured {
        cell_id: CellId,
        new_type: CellType,
        points: u32,
        cause: CaptureCause,
    },

    /// An opposing ball damaged a cell.
    #[serde(rename_all = "camelCase")]
    CellAttacked {
        cell_id: CellId,
        attacker: Faction,
        damage: u32,
        remaining: u32,
    },

    /// A friendly ball reinforced a cell.
    #[serde(rename_all = "camelCase")]
    CellReinforced {
        cell_id: CellId,
        amount: u32,
        points: u32,
    },

    /// A cell changed evolution level.
    #[serde(rename_all = "camelCase")]
    CellEvolved {
        cell_id: CellId,
        old_level: EvolutionLevel,
        new_level: EvolutionLevel,
    },

    /// Turn-based mode switched on or off.
    #[serde(rename_all = "camelCase")]
    TurnModeToggled {
        enabled: bool,
    },

    /// The active side changed.
    #[serde(rename_all = "camelCase")]
    TurnSwitch {
        active_faction: Faction,
        is_player_turn: bool,
        reason: TurnSwitchReason,
    },

    /// The game finished.
    #[serde(rename_all = "camelCase")]
    GameEnd {
        winner: Faction,
        score: u32,
        time: String,
        elapsed_ms: u64,
        cells: Vec<CellSnapshot>,
    },
}

impl GameEventData {
    /// Wire name of this event type (`"BRIDGE_CREATED"`, ...).
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEventData::GameStart { .. } => "GAME_START",
            GameEventData::BridgeCreated { .. } => "BRIDGE_CREATED",
            GameEventData::BridgeRemoved { .. } => "BRIDGE_REMOVED",
            GameEventData::AllBridgesRemoved { .. } => "ALL_BRIDGES_REMOVED",
            GameEventData::CellCaptured { .. } => "CELL_CAPTURED",
            GameEventData::CellAttacked { .. } => "CELL_ATTACKED",
            GameEventData::CellReinforced { .. } => "CELL_REINFORCED",
            GameEventData::CellEvolved { .. } => "CELL_EVOLVED",
            GameEventData::TurnModeToggled { .. } => "TURN_MODE_TOGGLED",
            GameEventData::TurnSwitch { .. } => "TURN_SWITCH",
            GameEventData::GameEnd { .. } => "GAME_END",
        }
    }
}

// =============================================================================
// EVENT
// =============================================================================

/// A game event with its timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Completed ticks when the event was emitted.
    pub tick: u32,

    /// Milliseconds since game start.
    pub timestamp: u64,

    /// Event payload.
    #[serde(flatten)]
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u32, timestamp: u64, data: GameEventData) -> Self {
        Self { tick, timestamp, data }
    }

    /// The command that reproduces this event, if it records one.
    ///
    /// Derived events (captures, attacks, evolutions, timer and move-made
    /// turn switches, game end) return `None`: re-running the simulation
    /// regenerates them.
    pub fn as_command(&self) -> Option<Command> {
        match &self.data {
            GameEventData::BridgeCreated { source_id, target_id, .. } => Some(Command::CreateBridge {
                source: *source_id,
                target: *target_id,
            }),
            GameEventData::BridgeRemoved { source_id, target_id, reason: RemovalReason::Manual, .. } => {
                Some(Command::RemoveBridge {
                    source: *source_id,
                    target: *target_id,
                })
            }
            GameEventData::AllBridgesRemoved { cell_id, .. } => {
                Some(Command::RemoveAllBridgesFromCell { cell: *cell_id })
            }
            GameEventData::TurnModeToggled { .. } => Some(Command::ToggleTurnBasedMode),
            GameEventData::TurnSwitch { reason: TurnSwitchReason::Manual, .. } => Some(Command::SwitchTurn),
            _ => None,
        }
    }

    /// True for `GAME_START`.
    pub fn is_game_start(&self) -> bool {
        matches!(self.data, GameEventData::GameStart { .. })
    }
}

// =============================================================================
// SUBSCRIBERS
// =============================================================================

/// Consumer of the simulation's event stream.
pub trait EventSink {
    /// Called once per event, in emission order.
    fn on_event(&mut self, event: &GameEvent);
}

impl EventSink for Vec<GameEvent> {
    fn on_event(&mut self, event: &GameEvent) {
        self.push(event.clone());
    }
}

/// Fans one event stream out to several sinks.
#[derive(Default)]
pub struct EventFanout<'a> {
    sinks: Vec<&'a mut dyn EventSink>,
}

impl<'a> EventFanout<'a> {
    /// Empty fan-out.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink.
    pub fn with(mut self, sink: &'a mut dyn EventSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for EventFanout<'_> {
    fn on_event(&mut self, event: &GameEvent) {
        for sink in self.sinks.iter_mut() {
            sink.on_event(event);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
