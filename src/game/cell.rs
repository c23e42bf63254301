//! Cells
//!
//! A cell is a permanent board slot. It never leaves the simulation; only its
//! owner, points and evolution change. Evolution is derived from points and
//! is recomputed every time points change.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::core::vec2::FixedVec2;

// =============================================================================
// IDS AND ENUMS
// =============================================================================

/// Stable cell identifier, assigned at level load.
///
/// Used for serialization, network addressing and every cross reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u32);

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One of the two competing sides.
///
/// `Player` is faction A (blue, the human-scored side by default),
/// `Enemy` is faction B (red).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Faction {
    /// Faction A.
    #[default]
    Player,
    /// Faction B.
    Enemy,
}

impl Faction {
    /// The other faction.
    #[inline]
    pub fn opponent(self) -> Faction {
        match self {
            Faction::Player => Faction::Enemy,
            Faction::Enemy => Faction::Player,
        }
    }

    /// Display name used in log lines and result strings.
    pub fn name(self) -> &'static str {
        match self {
            Faction::Player => "Player",
            Faction::Enemy => "Enemy",
        }
    }
}

/// Ownership of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellType {
    /// Unowned; captured by accumulated influence.
    #[default]
    Empty,
    /// Owned by faction A.
    Player,
    /// Owned by faction B.
    Enemy,
}

impl CellType {
    /// The owning faction, if any.
    #[inline]
    pub fn owner(self) -> Option<Faction> {
        match self {
            CellType::Empty => None,
            CellType::Player => Some(Faction::Player),
            CellType::Enemy => Some(Faction::Enemy),
        }
    }
}

impl From<Faction> for CellType {
    fn from(faction: Faction) -> Self {
        match faction {
            Faction::Player => CellType::Player,
            Faction::Enemy => CellType::Enemy,
        }
    }
}

/// Cell shape, fixed at creation. Determines the attack value of its balls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellShape {
    /// Attack value 1.
    #[default]
    Circle,
    /// Attack value 2.
    Triangle,
    /// Attack value 3.
    Rectangle,
}

impl CellShape {
    /// Attack value carried by balls spawned from this shape.
    #[inline]
    pub fn attack_multiplier(self) -> u32 {
        match self {
            CellShape::Circle => 1,
            CellShape::Triangle => 2,
            CellShape::Rectangle => 3,
        }
    }
}

/// Evolution tier (1-3), a pure function of points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum EvolutionLevel {
    /// Fewer than 15 points.
    #[default]
    Level1 = 1,
    /// 15 to 34 points.
    Level2 = 2,
    /// 35 points or more.
    Level3 = 3,
}

impl EvolutionLevel {
    /// Points at which a cell reaches level 2.
    pub const LEVEL_2_POINTS: u32 = 15;
    /// Points at which a cell reaches level 3.
    pub const LEVEL_3_POINTS: u32 = 35;

    /// Derive the level from a point balance. No hysteresis.
    #[inline]
    pub fn from_points(points: u32) -> Self {
        if points < Self::LEVEL_2_POINTS {
            EvolutionLevel::Level1
        } else if points < Self::LEVEL_3_POINTS {
            EvolutionLevel::Level2
        } else {
            EvolutionLevel::Level3
        }
    }

    /// Numeric level (1-3). Also the outgoing bridge cap and spawn divisor.
    #[inline]
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl From<EvolutionLevel> for u8 {
    fn from(level: EvolutionLevel) -> u8 {
        level as u8
    }
}

impl TryFrom<u8> for EvolutionLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EvolutionLevel::Level1),
            2 => Ok(EvolutionLevel::Level2),
            3 => Ok(EvolutionLevel::Level3),
            other => Err(format!("evolution level out of range: {other}")),
        }
    }
}

/// An evolution transition: `(old, new)`.
pub type EvolutionChange = (EvolutionLevel, EvolutionLevel);

// =============================================================================
// CELL
// =============================================================================

/// A board cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Stable id.
    pub id: CellId,
    /// Centre of the cell.
    pub position: FixedVec2,
    /// Current owner.
    pub cell_type: CellType,
    /// Shape (fixed).
    pub shape: CellShape,
    evolution: EvolutionLevel,
    points: u32,
    /// Net influence needed to capture while empty.
    pub required_points: u32,
    /// Points granted when captured while empty.
    pub capture_grant: u32,
    /// Faction A influence accumulated while empty.
    pub points_to_capture: u32,
    /// Faction B influence accumulated while empty.
    pub enemy_points_to_capture: u32,
    /// Simulation time of the last growth step.
    pub last_growth_ms: u64,
    /// Targets of this cell's outgoing bridges.
    pub outgoing: BTreeSet<CellId>,
    /// Sources of bridges that target this cell.
    pub incoming: BTreeSet<CellId>,
}

impl Cell {
    /// Default net influence needed to capture an empty cell.
    pub const DEFAULT_REQUIRED_POINTS: u32 = 6;
    /// Default points granted on empty capture.
    pub const DEFAULT_CAPTURE_GRANT: u32 = 20;

    /// Create a cell. Empty cells always start with zero points.
    pub fn new(id: CellId, position: FixedVec2, cell_type: CellType, shape: CellShape, points: u32) -> Self {
        let points = if cell_type == CellType::Empty { 0 } else { points };
        Self {
            id,
            position,
            cell_type,
            shape,
            evolution: EvolutionLevel::from_points(points),
            points,
            required_points: Self::DEFAULT_REQUIRED_POINTS,
            capture_grant: Self::DEFAULT_CAPTURE_GRANT,
            points_to_capture: 0,
            enemy_points_to_capture: 0,
            last_growth_ms: 0,
            outgoing: BTreeSet::new(),
            incoming: BTreeSet::new(),
        }
    }

    /// Override the capture threshold and grant.
    pub fn with_capture_rules(mut self, required_points: u32, capture_grant: u32) -> Self {
        self.required_points = required_points;
        self.capture_grant = capture_grant;
        self
    }

    /// Current point balance.
    #[inline]
    pub fn points(&self) -> u32 {
        self.points
    }

    /// Current evolution level.
    #[inline]
    pub fn evolution(&self) -> EvolutionLevel {
        self.evolution
    }

    /// Owning faction, if any.
    #[inline]
    pub fn owner(&self) -> Option<Faction> {
        self.cell_type.owner()
    }

    /// True if the cell is unowned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cell_type == CellType::Empty
    }

    /// Attack value of balls spawned here.
    #[inline]
    pub fn attack_multiplier(&self) -> u32 {
        self.shape.attack_multiplier()
    }

    /// Number of outgoing bridges.
    #[inline]
    pub fn outgoing_count(&self) -> usize {
        self.outgoing.len()
    }

    /// Set points and re-derive evolution.
    ///
    /// Returns the evolution transition if the level changed.
    pub fn set_points(&mut self, points: u32) -> Option<EvolutionChange> {
        self.points = points;
        let new_level = EvolutionLevel::from_points(points);
        let old_level = self.evolution;
        if new_level != old_level {
            self.evolution = new_level;
            Some((old_level, new_level))
        } else {
            None
        }
    }

    /// Add points.
    pub fn add_points(&mut self, amount: u32) -> Option<EvolutionChange> {
        self.set_points(self.points.saturating_add(amount))
    }

    /// Remove points, floored at zero. Returns the amount actually removed.
    pub fn remove_points(&mut self, amount: u32) -> (u32, Option<EvolutionChange>) {
        let removed = amount.min(self.points);
        let change = self.set_points(self.points - removed);
        (removed, change)
    }

    /// Growth step: +1 point once per `growth_interval_ms` while owned.
    ///
    /// Returns the evolution transition caused by the growth, if any.
    pub fn update(&mut self, now_ms: u64, growth_interval_ms: u64) -> Option<EvolutionChange> {
        if self.is_empty() {
            return None;
        }
        if now_ms.saturating_sub(self.last_growth_ms) >= growth_interval_ms {
            self.last_growth_ms = now_ms;
            return self.add_points(1);
        }
        None
    }

    /// Apply influence to an empty cell.
    ///
    /// The check runs after every call: the cell flips to the side whose
    /// accumulator leads by at least `required_points`, receives the capture
    /// grant, and both accumulators reset. Returns true on capture.
    pub fn try_capture(&mut self, points_gained: u32, attacker: Faction) -> bool {
        if !self.is_empty() {
            return false;
        }

        match attacker {
            Faction::Player => self.points_to_capture += points_gained,
            Faction::Enemy => self.enemy_points_to_capture += points_gained,
        }

        let net = self.points_to_capture as i64 - self.enemy_points_to_capture as i64;
        if net.unsigned_abs() < self.required_points as u64 {
            return false;
        }

        self.cell_type = if net > 0 { CellType::Player } else { CellType::Enemy };
        self.points_to_capture = 0;
        self.enemy_points_to_capture = 0;
        self.set_points(self.capture_grant);
        true
    }

    /// Flip an owned cell to `faction` after it was depleted in combat.
    pub fn capture_by_combat(&mut self, faction: Faction, grant: u32) -> Option<EvolutionChange> {
        self.cell_type = faction.into();
        self.set_points(grant)
    }
}

// =============================================================================
// TESTS
// =============================================================================
