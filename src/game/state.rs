//! Simulation State
//!
//! `Simulation` owns every cell, bridge and ball of one running level in
//! id-keyed arenas, and exposes the command API. Uses BTreeMap for
//! deterministic iteration order.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::hash::{StateHash, compute_state_hash};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::ball::Ball;
use crate::game::bridge::{Bridge, BridgeDirection, BridgeKey, bridge_cost};
use crate::game::cell::{Cell, CellId, CellShape, CellType, EvolutionChange, Faction};
use crate::game::command::{BridgeRejection, Command};
use crate::game::config::SimulationConfig;
use crate::game::events::{
    CellSnapshot, EventSink, GameEvent, GameEventData, RemovalReason, TurnSwitchReason,
};
use crate::game::tick::{self, TickResult};
use crate::game::turn::TurnState;

// =============================================================================
// SUPPORTING TYPES
// =============================================================================

/// A cell to place when a level is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellPlacement {
    /// Cell centre.
    pub position: FixedVec2,
    /// Initial owner.
    pub cell_type: CellType,
    /// Shape.
    pub shape: CellShape,
    /// Initial points; `None` uses the configured starting points.
    pub points: Option<u32>,
}

impl CellPlacement {
    /// Placement at integer pixel coordinates.
    pub fn at(x: i32, y: i32, cell_type: CellType, shape: CellShape) -> Self {
        Self {
            position: FixedVec2::from_ints(x, y),
            cell_type,
            shape,
            points: None,
        }
    }

    /// Override the initial points.
    pub fn with_points(mut self, points: u32) -> Self {
        self.points = Some(points);
        self
    }
}

/// Lifecycle of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GamePhase {
    /// Accepting commands and ticking.
    #[default]
    Running,
    /// Terminal state.
    Over {
        /// Winning faction.
        winner: Faction,
        /// Simulation time at the end.
        ended_at_ms: u64,
    },
}

/// Result of a successful `RemoveBridge`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The bridge existed and was removed.
    Removed {
        /// Points credited back to the source.
        refund: u32,
    },
    /// No such bridge; nothing changed.
    NotFound,
}

// =============================================================================
// SIMULATION
// =============================================================================

/// Complete state of one running level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Simulation {
    pub(crate) config: SimulationConfig,
    pub(crate) seed: u64,
    pub(crate) tick: u32,
    pub(crate) cells: BTreeMap<CellId, Cell>,
    pub(crate) bridges: BTreeMap<BridgeKey, Bridge>,
    pub(crate) balls: BTreeMap<u32, Ball>,
    pub(crate) next_ball_id: u32,
    pub(crate) next_bridge_serial: u32,
    pub(crate) last_spawn_ms: BTreeMap<BridgeKey, u64>,
    pub(crate) turn: TurnState,
    pub(crate) score: u32,
    pub(crate) phase: GamePhase,
    pub(crate) rng: DeterministicRng,
    #[serde(skip)]
    pub(crate) pending_events: Vec<GameEvent>,
}

impl Simulation {
    /// Build a simulation from level placements. Ids are assigned in order.
    ///
    /// Emits `GAME_START`.
    pub fn new(config: SimulationConfig, seed: u64, placements: &[CellPlacement]) -> Self {
        let cells = placements
            .iter()
            .enumerate()
            .map(|(index, placement)| {
                let id = CellId(index as u32);
                let points = placement.points.unwrap_or(config.starting_points);
                let cell = Cell::new(id, placement.position, placement.cell_type, placement.shape, points)
                    .with_capture_rules(config.required_points, config.empty_capture_grant);
                (id, cell)
            })
            .collect();

        let mut sim = Self::with_cells(config, seed, cells);
        sim.emit_start();
        sim
    }

    /// Rebuild a simulation from a `GAME_START` snapshot.
    ///
    /// Emits its own `GAME_START`.
    pub fn from_snapshot(
        config: SimulationConfig,
        seed: u64,
        turn_based: bool,
        snapshot: &[CellSnapshot],
    ) -> Self {
        let cells = snapshot
            .iter()
            .map(|s| {
                let cell = Cell::new(s.id, s.position(), s.cell_type, s.shape, s.points)
                    .with_capture_rules(config.required_points, config.empty_capture_grant);
                (s.id, cell)
            })
            .collect();

        let mut sim = Self::with_cells(config, seed, cells);
        if turn_based {
            sim.turn.enable(sim.config.scored_faction, sim.config.turn_duration_ms);
        }
        sim.emit_start();
        sim
    }

    fn with_cells(config: SimulationConfig, seed: u64, cells: BTreeMap<CellId, Cell>) -> Self {
        info!(cells = cells.len(), seed, "Simulation created");
        Self {
            config,
            seed,
            tick: 0,
            cells,
            bridges: BTreeMap::new(),
            balls: BTreeMap::new(),
            next_ball_id: 0,
            next_bridge_serial: 0,
            last_spawn_ms: BTreeMap::new(),
            turn: TurnState::default(),
            score: 0,
            phase: GamePhase::Running,
            rng: DeterministicRng::new(seed),
            pending_events: Vec::new(),
        }
    }

    fn emit_start(&mut self) {
        let data = GameEventData::GameStart {
            seed: self.seed,
            turn_based: self.turn.enabled,
            config: self.config.clone(),
            cells: self.snapshot(),
        };
        self.emit(data);
    }

    // =========================================================================
    // READ API
    // =========================================================================

    /// Configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// RNG seed the game started with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Completed ticks.
    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    /// Simulation time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.config.tick_to_ms(self.tick)
    }

    /// Look up a cell.
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    /// All cells in id order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Look up the `source -> target` bridge.
    pub fn bridge(&self, source: CellId, target: CellId) -> Option<&Bridge> {
        self.bridges.get(&(source, target))
    }

    /// All bridges in key order.
    pub fn bridges(&self) -> impl Iterator<Item = &Bridge> {
        self.bridges.values()
    }

    /// All balls in flight, in spawn order.
    pub fn balls(&self) -> impl Iterator<Item = &Ball> {
        self.balls.values()
    }

    /// Score of the scored faction.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Turn bookkeeping.
    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// True once a faction has won.
    pub fn is_over(&self) -> bool {
        matches!(self.phase, GamePhase::Over { .. })
    }

    /// Winner, once the game is over.
    pub fn winner(&self) -> Option<Faction> {
        match self.phase {
            GamePhase::Over { winner, .. } => Some(winner),
            GamePhase::Running => None,
        }
    }

    /// Number of cells owned by `faction`.
    pub fn cell_count(&self, faction: Faction) -> usize {
        self.cells.values().filter(|c| c.owner() == Some(faction)).count()
    }

    /// Number of unowned cells.
    pub fn empty_count(&self) -> usize {
        self.cells.values().filter(|c| c.is_empty()).count()
    }

    /// Snapshot of every cell.
    pub fn snapshot(&self) -> Vec<CellSnapshot> {
        self.cells.values().map(CellSnapshot::of).collect()
    }

    /// Cells bridging into `cell` that share its faction.
    pub fn supporting_count(&self, cell: CellId) -> u32 {
        let Some(target) = self.cells.get(&cell) else {
            return 0;
        };
        let Some(faction) = target.owner() else {
            return 0;
        };
        target
            .incoming
            .iter()
            .filter(|source| self.cells.get(source).and_then(Cell::owner) == Some(faction))
            .count() as u32
    }

    /// Combat multiplier of `cell`, in percent (100 = no bonus).
    pub fn support_multiplier_percent(&self, cell: CellId) -> u32 {
        let bonus = self.supporting_count(cell) * self.config.support_bonus_percent;
        (100 + bonus).min(self.config.support_cap_percent.max(100))
    }

    // =========================================================================
    // COMMAND API
    // =========================================================================

    /// Apply a command from any input source.
    pub fn apply(&mut self, command: Command) -> Result<(), BridgeRejection> {
        let result = match command {
            Command::CreateBridge { source, target } => self.create_bridge(source, target).map(|_| ()),
            Command::RemoveBridge { source, target } => self.remove_bridge(source, target).map(|_| ()),
            Command::RemoveAllBridgesFromCell { cell } => {
                self.remove_all_bridges_from_cell(cell).map(|_| ())
            }
            Command::ToggleTurnBasedMode => self.toggle_turn_based_mode(),
            Command::SwitchTurn => self.switch_turn(),
        };
        if let Err(reason) = &result {
            debug!(?command, %reason, "Command rejected");
        }
        result
    }

    /// Validate a `CreateBridge` without mutating anything.
    ///
    /// Returns the bridge cost on success. Checks run in order: game over,
    /// unknown or identical cells, unowned source, turn, bridge cap, cost,
    /// duplicate, same-faction reverse.
    pub fn check_create_bridge(&self, source: CellId, target: CellId) -> Result<u32, BridgeRejection> {
        self.ensure_running()?;
        if source == target {
            return Err(BridgeRejection::SameCell);
        }
        let src = self.cells.get(&source).ok_or(BridgeRejection::UnknownCell(source))?;
        let dst = self.cells.get(&target).ok_or(BridgeRejection::UnknownCell(target))?;
        let faction = src.owner().ok_or(BridgeRejection::SourceNotOwned(source))?;
        if !self.turn.may_act(faction) {
            return Err(BridgeRejection::NotYourTurn(faction));
        }

        // 1. Bridge cap
        let level = src.evolution().value();
        if src.outgoing_count() >= level as usize {
            return Err(BridgeRejection::CapReached { level });
        }

        // 2. Cost
        let cost = bridge_cost(src.position.distance(dst.position), self.config.bridge_cost_divisor);
        if src.points() < cost {
            return Err(BridgeRejection::InsufficientPoints {
                needed: cost,
                available: src.points(),
            });
        }

        // 3. Duplicate
        if self.bridges.contains_key(&(source, target)) {
            return Err(BridgeRejection::Duplicate);
        }

        // 4. Same-faction reverse
        if self.bridges.contains_key(&(target, source)) && src.cell_type == dst.cell_type {
            return Err(BridgeRejection::DuplicateReverse);
        }

        Ok(cost)
    }

    /// Build a bridge. A counter-bridge merges both into a two-way pair.
    pub fn create_bridge(&mut self, source: CellId, target: CellId) -> Result<BridgeDirection, BridgeRejection> {
        let cost = self.check_create_bridge(source, target)?;

        let change = self.cells.get_mut(&source).and_then(|c| c.remove_points(cost).1);

        let mut bridge = Bridge::new(source, target, cost);
        bridge.serial = self.next_bridge_serial;
        self.next_bridge_serial += 1;
        if let Some(reverse) = self.bridges.get_mut(&(target, source)) {
            reverse.promote();
            bridge.promote();
        }
        let direction = bridge.direction;
        self.bridges.insert(bridge.key(), bridge);
        if let Some(cell) = self.cells.get_mut(&source) {
            cell.outgoing.insert(target);
        }
        if let Some(cell) = self.cells.get_mut(&target) {
            cell.incoming.insert(source);
        }

        info!(%source, %target, cost, ?direction, "Bridge created");
        self.emit(GameEventData::BridgeCreated {
            source_id: source,
            target_id: target,
            direction,
            cost,
        });
        self.note_evolution(source, change);

        if self.turn.enabled {
            self.turn.move_made = true;
            self.pass_turn(TurnSwitchReason::MoveMade);
        }

        Ok(direction)
    }

    /// Remove the `source -> target` bridge and refund its cost to the
    /// source cell. Removing a missing bridge is a no-op.
    pub fn remove_bridge(&mut self, source: CellId, target: CellId) -> Result<RemoveOutcome, BridgeRejection> {
        if !self.bridges.contains_key(&(source, target)) {
            return Ok(RemoveOutcome::NotFound);
        }
        self.ensure_running()?;
        let src = self.cells.get(&source).ok_or(BridgeRejection::UnknownCell(source))?;
        let faction = src.owner().ok_or(BridgeRejection::SourceNotOwned(source))?;
        if !self.turn.may_act(faction) {
            return Err(BridgeRejection::NotYourTurn(faction));
        }

        let Some(bridge) = self.detach_bridge((source, target)) else {
            return Ok(RemoveOutcome::NotFound);
        };
        let refund = bridge.creation_cost;
        let change = self.cells.get_mut(&source).and_then(|c| c.add_points(refund));

        info!(%source, %target, refund, "Bridge removed");
        self.emit(GameEventData::BridgeRemoved {
            source_id: source,
            target_id: target,
            reason: RemovalReason::Manual,
            refund,
            refunded_to: Some(source),
        });
        self.note_evolution(source, change);

        if self.turn.enabled {
            self.turn.move_made = true;
            self.pass_turn(TurnSwitchReason::MoveMade);
        }

        Ok(RemoveOutcome::Removed { refund })
    }

    /// Remove every outgoing bridge of `cell`, demoting merged siblings.
    ///
    /// Returns the number of bridges removed. No refunds.
    pub fn remove_all_bridges_from_cell(&mut self, cell: CellId) -> Result<usize, BridgeRejection> {
        self.ensure_running()?;
        let target = self.cells.get(&cell).ok_or(BridgeRejection::UnknownCell(cell))?;
        let faction = target.owner().ok_or(BridgeRejection::SourceNotOwned(cell))?;
        if !self.turn.may_act(faction) {
            return Err(BridgeRejection::NotYourTurn(faction));
        }

        let keys: Vec<BridgeKey> = target.outgoing.iter().map(|t| (cell, *t)).collect();
        let count = keys
            .into_iter()
            .filter_map(|key| self.detach_bridge(key))
            .count();

        info!(%cell, count, "All bridges removed from cell");
        self.emit(GameEventData::AllBridgesRemoved {
            cell_id: cell,
            count: count as u32,
        });
        Ok(count)
    }

    /// Switch turn-based mode on or off.
    ///
    /// Turning it on hands the first turn to the scored faction.
    pub fn toggle_turn_based_mode(&mut self) -> Result<(), BridgeRejection> {
        self.ensure_running()?;
        if self.turn.enabled {
            self.turn.disable();
            info!("Real-time mode activated");
        } else {
            self.turn.enable(self.config.scored_faction, self.config.turn_duration_ms);
            info!(first = ?self.turn.active, "Turn-based mode activated");
        }
        self.emit(GameEventData::TurnModeToggled { enabled: self.turn.enabled });
        Ok(())
    }

    /// Hand the turn to the other side. No-op in real-time mode.
    pub fn switch_turn(&mut self) -> Result<(), BridgeRejection> {
        self.ensure_running()?;
        if self.turn.enabled {
            self.pass_turn(TurnSwitchReason::Manual);
        }
        Ok(())
    }

    /// Advance the simulation by one fixed step.
    pub fn tick(&mut self) -> TickResult {
        tick::tick(self)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Hand every buffered event to `sink`, in emission order.
    pub fn drain_events(&mut self, sink: &mut dyn EventSink) {
        for event in self.pending_events.drain(..) {
            sink.on_event(&event);
        }
    }

    /// Take the buffered events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub(crate) fn emit(&mut self, data: GameEventData) {
        let event = GameEvent::new(self.tick, self.now_ms(), data);
        self.pending_events.push(event);
    }

    /// Emit `CELL_EVOLVED` for a level change.
    ///
    /// A cell that drops a level loses its oldest outgoing bridges until it
    /// is back within the cap.
    pub(crate) fn note_evolution(&mut self, cell: CellId, change: Option<EvolutionChange>) {
        if let Some((old_level, new_level)) = change {
            debug!(%cell, ?old_level, ?new_level, "Cell evolved");
            self.emit(GameEventData::CellEvolved {
                cell_id: cell,
                old_level,
                new_level,
            });
            if new_level < old_level {
                self.enforce_bridge_cap(cell);
            }
        }
    }

    // =========================================================================
    // INTERNAL MUTATION
    // =========================================================================

    fn ensure_running(&self) -> Result<(), BridgeRejection> {
        if self.is_over() {
            Err(BridgeRejection::GameOver)
        } else {
            Ok(())
        }
    }

    pub(crate) fn pass_turn(&mut self, reason: TurnSwitchReason) {
        let active = self.turn.switch(self.config.turn_duration_ms);
        info!(?active, ?reason, "Turn switched");
        self.emit(GameEventData::TurnSwitch {
            active_faction: active,
            is_player_turn: active == Faction::Player,
            reason,
        });
    }

    /// Remove a bridge from the arena and both adjacency lists, demoting
    /// its reverse sibling.
    fn enforce_bridge_cap(&mut self, cell: CellId) {
        loop {
            let Some(source) = self.cells.get(&cell) else {
                return;
            };
            if source.outgoing_count() <= source.evolution().value() as usize {
                return;
            }
            let oldest = source
                .outgoing
                .iter()
                .filter_map(|target| self.bridges.get(&(cell, *target)))
                .min_by_key(|bridge| bridge.serial)
                .map(|bridge| bridge.key());
            let Some(key) = oldest.and_then(|key| self.detach_bridge(key)).map(|b| b.key()) else {
                return;
            };
            info!(source = %key.0, target = %key.1, "Bridge dropped over cap");
            self.emit(GameEventData::BridgeRemoved {
                source_id: key.0,
                target_id: key.1,
                reason: RemovalReason::Downgrade,
                refund: 0,
                refunded_to: None,
            });
        }
    }

    pub(crate) fn detach_bridge(&mut self, key: BridgeKey) -> Option<Bridge> {
        let bridge = self.bridges.remove(&key)?;
        if let Some(reverse) = self.bridges.get_mut(&bridge.reverse_key()) {
            reverse.demote();
        }
        if let Some(cell) = self.cells.get_mut(&bridge.source) {
            cell.outgoing.remove(&bridge.target);
        }
        if let Some(cell) = self.cells.get_mut(&bridge.target) {
            cell.incoming.remove(&bridge.source);
        }
        Some(bridge)
    }

    // =========================================================================
    // HASHING AND SAVE FILES
    // =========================================================================

    /// Hash of everything that influences future ticks.
    pub fn state_hash(&self) -> StateHash {
        compute_state_hash(self.tick, self.seed, |h| {
            h.update_u32(self.cells.len() as u32);
            for cell in self.cells.values() {
                h.update_u32(cell.id.0);
                h.update_vec2(cell.position);
                h.update_u8(cell.cell_type as u8);
                h.update_u8(cell.shape as u8);
                h.update_u8(cell.evolution() as u8);
                h.update_u32(cell.points());
                h.update_u32(cell.points_to_capture);
                h.update_u32(cell.enemy_points_to_capture);
                h.update_u64(cell.last_growth_ms);
            }

            h.update_u32(self.bridges.len() as u32);
            for bridge in self.bridges.values() {
                h.update_u32(bridge.source.0);
                h.update_u32(bridge.target.0);
                h.update_bool(bridge.has_reverse);
                h.update_u32(bridge.creation_cost);
                h.update_u32(bridge.serial);
            }
            h.update_u32(self.next_bridge_serial);

            h.update_u32(self.balls.len() as u32);
            for ball in self.balls.values() {
                h.update_u32(ball.id);
                h.update_u32(ball.source.0);
                h.update_u32(ball.target.0);
                h.update_vec2(ball.position);
                h.update_vec2(ball.direction);
                h.update_u8(ball.faction as u8);
                h.update_u32(ball.attack_value);
                h.update_bool(ball.is_support_ball);
            }

            for ((source, target), at) in &self.last_spawn_ms {
                h.update_u32(source.0);
                h.update_u32(target.0);
                h.update_u64(*at);
            }

            h.update_bool(self.turn.enabled);
            h.update_u8(self.turn.active as u8);
            h.update_u64(self.turn.remaining_ms);
            h.update_u32(self.score);
            h.update_bool(self.is_over());
            let [s0, s1] = self.rng.state();
            h.update_u64(s0);
            h.update_u64(s1);
        })
    }

    /// Serialize a running game (bincode) for save/resume.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Resume a game saved with `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cell::EvolutionLevel;

    /// Player at (100,300), enemy at (400,300), empty at (250,100).
    fn duel() -> Simulation {
        Simulation::new(
            SimulationConfig::default(),
            7,
            &[
                CellPlacement::at(100, 300, CellType::Player, CellShape::Circle),
                CellPlacement::at(400, 300, CellType::Enemy, CellShape::Circle),
                CellPlacement::at(250, 100, CellType::Empty, CellShape::Triangle),
            ],
        )
    }

    const P: CellId = CellId(0);
    const E: CellId = CellId(1);
    const N: CellId = CellId(2);

    #[test]
    fn test_new_emits_game_start() {
        let mut sim = duel();
        let events = sim.take_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_game_start());
        assert_eq!(sim.cell(P).unwrap().points(), 20);
        assert_eq!(sim.cell(N).unwrap().points(), 0);
    }

    #[test]
    fn test_create_bridge_charges_cost() {
        let mut sim = duel();
        // distance 300 -> cost 10
        assert_eq!(sim.check_create_bridge(P, E), Ok(10));
        assert_eq!(sim.create_bridge(P, E), Ok(BridgeDirection::OneWay));
        assert_eq!(sim.cell(P).unwrap().points(), 10);
        assert!(sim.cell(P).unwrap().outgoing.contains(&E));
        assert!(sim.cell(E).unwrap().incoming.contains(&P));
    }

    #[test]
    fn test_bridge_cap_by_evolution() {
        let mut sim = duel();
        sim.cells.get_mut(&P).unwrap().set_points(14);
        assert_eq!(sim.cell(P).unwrap().evolution(), EvolutionLevel::Level1);
        sim.create_bridge(P, N).unwrap();
        assert_eq!(
            sim.create_bridge(P, E),
            Err(BridgeRejection::CapReached { level: 1 })
        );

        sim.cells.get_mut(&P).unwrap().set_points(30);
        assert_eq!(sim.create_bridge(P, E), Ok(BridgeDirection::OneWay));
    }

    #[test]
    fn test_insufficient_points() {
        let mut sim = duel();
        sim.cells.get_mut(&P).unwrap().set_points(9);
        assert_eq!(
            sim.create_bridge(P, E),
            Err(BridgeRejection::InsufficientPoints { needed: 10, available: 9 })
        );
        assert_eq!(sim.cell(P).unwrap().points(), 9);
        assert_eq!(sim.bridges().count(), 0);
    }

    #[test]
    fn test_duplicate_rejections() {
        let mut sim = duel();
        sim.cells.get_mut(&P).unwrap().set_points(60);
        sim.create_bridge(P, E).unwrap();
        assert_eq!(sim.create_bridge(P, E), Err(BridgeRejection::Duplicate));

        let mut sim = Simulation::new(
            SimulationConfig::default(),
            1,
            &[
                CellPlacement::at(100, 100, CellType::Player, CellShape::Circle),
                CellPlacement::at(200, 100, CellType::Player, CellShape::Circle),
            ],
        );
        sim.create_bridge(CellId(0), CellId(1)).unwrap();
        assert_eq!(
            sim.create_bridge(CellId(1), CellId(0)),
            Err(BridgeRejection::DuplicateReverse)
        );
    }

    #[test]
    fn test_precondition_rejections() {
        let mut sim = duel();
        assert_eq!(sim.create_bridge(P, P), Err(BridgeRejection::SameCell));
        assert_eq!(sim.create_bridge(P, CellId(9)), Err(BridgeRejection::UnknownCell(CellId(9))));
        assert_eq!(sim.create_bridge(N, P), Err(BridgeRejection::SourceNotOwned(N)));
    }

    #[test]
    fn test_mutual_promotion_and_demotion() {
        let mut sim = duel();
        sim.create_bridge(P, E).unwrap();
        assert_eq!(sim.create_bridge(E, P), Ok(BridgeDirection::TwoWay));
        for (s, t) in [(P, E), (E, P)] {
            let bridge = sim.bridge(s, t).unwrap();
            assert_eq!(bridge.direction, BridgeDirection::TwoWay);
            assert!(bridge.has_reverse);
        }

        assert_eq!(sim.remove_bridge(P, E), Ok(RemoveOutcome::Removed { refund: 10 }));
        assert_eq!(sim.bridges().count(), 1);
        let remaining = sim.bridge(E, P).unwrap();
        assert_eq!(remaining.direction, BridgeDirection::OneWay);
        assert!(!remaining.has_reverse);
    }

    #[test]
    fn test_remove_refunds_source_and_is_idempotent() {
        let mut sim = duel();
        sim.create_bridge(P, E).unwrap();
        sim.take_events();
        assert_eq!(sim.remove_bridge(P, E), Ok(RemoveOutcome::Removed { refund: 10 }));
        assert_eq!(sim.cell(P).unwrap().points(), 20);

        let events = sim.take_events();
        assert!(matches!(
            events[0].data,
            GameEventData::BridgeRemoved { refund: 10, refunded_to: Some(P), .. }
        ));

        let before = sim.state_hash();
        assert_eq!(sim.remove_bridge(P, E), Ok(RemoveOutcome::NotFound));
        assert_eq!(sim.remove_bridge(P, CellId(9)), Ok(RemoveOutcome::NotFound));
        assert_eq!(sim.remove_bridge(CellId(9), CellId(10)), Ok(RemoveOutcome::NotFound));
        assert_eq!(sim.state_hash(), before);
        assert!(sim.take_events().is_empty());
    }

    #[test]
    fn test_downgrade_drops_oldest_bridge_over_cap() {
        let mut sim = duel();
        sim.cells.get_mut(&P).unwrap().set_points(40);
        sim.create_bridge(P, N).unwrap();
        sim.create_bridge(P, E).unwrap();
        sim.create_bridge(E, P).unwrap();
        assert_eq!(sim.cell(P).unwrap().points(), 22);
        sim.take_events();

        let change = sim.cells.get_mut(&P).unwrap().remove_points(10).1;
        sim.note_evolution(P, change);

        let cell = sim.cell(P).unwrap();
        assert_eq!(cell.evolution(), EvolutionLevel::Level1);
        assert_eq!(cell.points(), 12);
        assert_eq!(cell.outgoing.iter().copied().collect::<Vec<_>>(), vec![E]);
        assert!(sim.bridge(P, N).is_none());
        assert!(!sim.cell(N).unwrap().incoming.contains(&P));
        assert!(sim.bridge(P, E).unwrap().has_reverse);

        let events = sim.take_events();
        assert!(matches!(events[0].data, GameEventData::CellEvolved { .. }));
        assert!(matches!(
            events[1].data,
            GameEventData::BridgeRemoved { source_id: P, target_id: N, reason: RemovalReason::Downgrade, refund: 0, .. }
        ));
        assert_eq!(events[1].as_command(), None);
    }

    #[test]
    fn test_upgrade_keeps_bridges() {
        let mut sim = duel();
        sim.create_bridge(P, E).unwrap();
        sim.take_events();
        let change = sim.cells.get_mut(&P).unwrap().add_points(30);
        sim.note_evolution(P, change);
        assert_eq!(sim.cell(P).unwrap().outgoing_count(), 1);
        assert!(!sim
            .take_events()
            .iter()
            .any(|e| matches!(e.data, GameEventData::BridgeRemoved { .. })));
    }

    #[test]
    fn test_remove_all_bridges_from_cell() {
        let mut sim = duel();
        sim.cells.get_mut(&P).unwrap().set_points(40);
        sim.create_bridge(P, E).unwrap();
        sim.create_bridge(P, N).unwrap();
        sim.create_bridge(E, P).unwrap();

        assert_eq!(sim.remove_all_bridges_from_cell(P), Ok(2));
        assert_eq!(sim.cell(P).unwrap().outgoing_count(), 0);
        let survivor = sim.bridge(E, P).unwrap();
        assert_eq!(survivor.direction, BridgeDirection::OneWay);
        assert!(!survivor.has_reverse);
    }

    #[test]
    fn test_turn_mode_gates_and_switches() {
        let mut sim = duel();
        sim.toggle_turn_based_mode().unwrap();
        assert_eq!(sim.turn().active, Faction::Player);
        assert_eq!(sim.create_bridge(E, P), Err(BridgeRejection::NotYourTurn(Faction::Enemy)));

        sim.create_bridge(P, E).unwrap();
        assert_eq!(sim.turn().active, Faction::Enemy);
        assert!(!sim.turn().move_made);

        sim.switch_turn().unwrap();
        assert_eq!(sim.turn().active, Faction::Player);

        sim.toggle_turn_based_mode().unwrap();
        assert!(!sim.turn().enabled);
        assert_eq!(sim.create_bridge(E, P), Ok(BridgeDirection::TwoWay));
    }

    #[test]
    fn test_switch_turn_outside_turn_mode_is_noop() {
        let mut sim = duel();
        sim.take_events();
        sim.switch_turn().unwrap();
        assert!(sim.take_events().is_empty());
    }

    #[test]
    fn test_support_multiplier() {
        let mut sim = Simulation::new(
            SimulationConfig::default(),
            1,
            &[
                CellPlacement::at(100, 100, CellType::Player, CellShape::Circle),
                CellPlacement::at(100, 200, CellType::Player, CellShape::Circle),
                CellPlacement::at(100, 300, CellType::Player, CellShape::Circle),
                CellPlacement::at(400, 200, CellType::Enemy, CellShape::Circle),
            ],
        );
        assert_eq!(sim.support_multiplier_percent(CellId(1)), 100);
        sim.create_bridge(CellId(0), CellId(1)).unwrap();
        sim.create_bridge(CellId(2), CellId(1)).unwrap();
        sim.create_bridge(CellId(3), CellId(1)).unwrap();
        assert_eq!(sim.supporting_count(CellId(1)), 2);
        assert_eq!(sim.support_multiplier_percent(CellId(1)), 140);
    }

    #[test]
    fn test_apply_routes_commands() {
        let mut sim = duel();
        sim.apply(Command::CreateBridge { source: P, target: E }).unwrap();
        assert!(sim.bridge(P, E).is_some());
        sim.apply(Command::RemoveBridge { source: P, target: E }).unwrap();
        assert!(sim.bridge(P, E).is_none());
        sim.apply(Command::ToggleTurnBasedMode).unwrap();
        assert!(sim.turn().enabled);
    }

    #[test]
    fn test_save_and_resume() {
        let mut sim = duel();
        sim.create_bridge(P, E).unwrap();
        for _ in 0..200 {
            sim.tick();
        }
        let bytes = sim.to_bytes().unwrap();
        let mut resumed = Simulation::from_bytes(&bytes).unwrap();
        assert_eq!(resumed.state_hash(), sim.state_hash());

        for _ in 0..200 {
            sim.tick();
            resumed.tick();
        }
        assert_eq!(resumed.state_hash(), sim.state_hash());
    }
}
