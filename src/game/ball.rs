//! Balls
//!
//! In-flight units. A ball travels in a straight line from just outside its
//! source cell towards the target cell at constant speed, and carries the
//! attack value its source had at spawn time.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, from_int};
use crate::core::vec2::FixedVec2;
use crate::game::cell::{Cell, CellId, Faction};
use crate::game::config::SimulationConfig;

/// A ball in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ball {
    /// Unique id within the simulation (spawn order).
    pub id: u32,
    /// Cell that spawned the ball.
    pub source: CellId,
    /// Cell the ball travels to.
    pub target: CellId,
    /// Source centre at spawn time.
    pub source_pos: FixedVec2,
    /// Target centre at spawn time.
    pub target_pos: FixedVec2,
    /// Current position.
    pub position: FixedVec2,
    /// Unit direction of travel.
    pub direction: FixedVec2,
    /// Pixels per tick.
    pub speed: Fixed,
    /// Side the ball fights for.
    pub faction: Faction,
    /// Source shape multiplier at spawn time.
    pub attack_value: u32,
    /// Spawned as bonus traffic from a supported cell.
    pub is_support_ball: bool,
    /// Ticks since spawn.
    pub age: u32,
}

impl Ball {
    /// Spawn a ball from `source` towards `target`.
    ///
    /// The ball starts `cell_radius + spawn_offset` pixels from the source
    /// centre along the direction of travel.
    pub fn spawn(id: u32, source: &Cell, target: &Cell, faction: Faction, config: &SimulationConfig) -> Self {
        let direction = source.position.direction_to(target.position);
        let offset = from_int(config.cell_radius + config.spawn_offset);
        Self {
            id,
            source: source.id,
            target: target.id,
            source_pos: source.position,
            target_pos: target.position,
            position: source.position.add(direction.scale(offset)),
            direction,
            speed: config.ball_speed,
            faction,
            attack_value: source.attack_multiplier(),
            is_support_ball: false,
            age: 0,
        }
    }

    /// Mark as a support ball.
    pub fn into_support(mut self) -> Self {
        self.is_support_ball = true;
        self
    }

    /// Move one tick along the direction of travel.
    pub fn advance(&mut self) {
        self.position = self.position.add(self.direction.scale(self.speed));
        self.age += 1;
    }

    /// Opposing balls within `2 * ball_radius` annihilate each other.
    pub fn collides_with(&self, other: &Ball, ball_radius: Fixed) -> bool {
        self.faction != other.faction && self.position.within(other.position, ball_radius * 2)
    }

    /// True once the ball is within `cell_radius` of the target centre.
    pub fn has_arrived(&self, cell_radius: Fixed) -> bool {
        self.position.within(self.target_pos, cell_radius)
    }
}
