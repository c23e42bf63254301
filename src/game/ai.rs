//! AI Move Suggestions
//!
//! `suggest` is a stateless query over the simulation's read API that ranks
//! candidate bridges for one faction. `AiController` turns the ranking into
//! commands at a difficulty-dependent pace.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::fixed::to_int;
use crate::core::rng::DeterministicRng;
use crate::game::cell::{Cell, CellId, Faction};
use crate::game::command::Command;
use crate::game::state::Simulation;

// Heuristic weights.
const COUNTER_ATTACK_BASE: i32 = 100;
const CAPTURE_BASE: i32 = 60;
const ATTACK_BASE: i32 = 40;
const SUPPORT_BASE: i32 = 30;
const SHAPE_WEIGHT: i32 = 10;
const THREAT_WEIGHT: i32 = 10;

/// What a suggested bridge is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    /// Bridge into an enemy cell.
    Attack,
    /// Bridge into an empty cell.
    Capture,
    /// Bridge into a friendly cell that is under attack.
    Support,
}

/// A ranked candidate move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Purpose.
    pub kind: SuggestionKind,
    /// Bridge source.
    pub source: CellId,
    /// Bridge target.
    pub target: CellId,
    /// Higher is better.
    pub score: i32,
}

impl Suggestion {
    /// The command that carries out this suggestion.
    pub fn command(&self) -> Command {
        Command::CreateBridge {
            source: self.source,
            target: self.target,
        }
    }
}

/// Rank every legal bridge `faction` could build right now.
///
/// Sorted by score (descending), ties by source then target id. Every
/// candidate passes `Simulation::check_create_bridge`, so the list is empty
/// when the faction may not act (game over, other side's turn).
pub fn suggest(sim: &Simulation, faction: Faction) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for source in sim.cells().filter(|c| c.owner() == Some(faction)) {
        for target in sim.cells() {
            if sim.check_create_bridge(source.id, target.id).is_err() {
                continue;
            }
            if let Some((kind, score)) = rate(sim, faction, source, target) {
                suggestions.push(Suggestion {
                    kind,
                    source: source.id,
                    target: target.id,
                    score,
                });
            }
        }
    }

    suggestions.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.source.cmp(&b.source))
            .then(a.target.cmp(&b.target))
    });
    suggestions
}

fn rate(sim: &Simulation, faction: Faction, source: &Cell, target: &Cell) -> Option<(SuggestionKind, i32)> {
    let distance = to_int(source.position.distance(target.position));
    let shape = source.attack_multiplier() as i32;

    match target.owner() {
        None => Some((SuggestionKind::Capture, CAPTURE_BASE - distance / 10)),
        Some(owner) if owner == faction => {
            let threats = enemy_bridges_into(sim, target, faction);
            (threats > 0).then(|| (SuggestionKind::Support, SUPPORT_BASE + THREAT_WEIGHT * threats))
        }
        Some(_) => {
            let counter = target
                .outgoing
                .iter()
                .any(|id| sim.cell(*id).and_then(Cell::owner) == Some(faction));
            let score = if counter {
                COUNTER_ATTACK_BASE + SHAPE_WEIGHT * shape - distance / 20
            } else {
                ATTACK_BASE + SHAPE_WEIGHT * shape - target.points() as i32
            };
            Some((SuggestionKind::Attack, score))
        }
    }
}

fn enemy_bridges_into(sim: &Simulation, cell: &Cell, faction: Faction) -> i32 {
    cell.incoming
        .iter()
        .filter(|id| sim.cell(**id).and_then(Cell::owner) == Some(faction.opponent()))
        .count() as i32
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// How often and how well the AI plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiDifficulty {
    /// Slow; picks among the top three.
    Easy,
    /// Takes the best move.
    #[default]
    Medium,
    /// Takes the best move, twice as often.
    Hard,
}

impl AiDifficulty {
    /// Base think interval in milliseconds (before game-speed scaling).
    pub fn think_interval_ms(self) -> u64 {
        match self {
            AiDifficulty::Easy => 3000,
            AiDifficulty::Medium => 1500,
            AiDifficulty::Hard => 750,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            AiDifficulty::Easy => "Easy",
            AiDifficulty::Medium => "Medium",
            AiDifficulty::Hard => "Hard",
        }
    }
}

/// Plays one faction by polling `suggest`.
#[derive(Clone, Debug)]
pub struct AiController {
    faction: Faction,
    difficulty: AiDifficulty,
    rng: DeterministicRng,
    last_think_ms: Option<u64>,
}

impl AiController {
    /// Controller for `faction`. `seed` drives Easy's move choice.
    pub fn new(faction: Faction, difficulty: AiDifficulty, seed: u64) -> Self {
        Self {
            faction,
            difficulty,
            rng: DeterministicRng::new(seed),
            last_think_ms: None,
        }
    }

    /// Faction played.
    pub fn faction(&self) -> Faction {
        self.faction
    }

    /// Difficulty.
    pub fn difficulty(&self) -> AiDifficulty {
        self.difficulty
    }

    /// The next command, if the think interval has elapsed and a legal move
    /// exists. Call once per tick.
    pub fn decide(&mut self, sim: &Simulation) -> Option<Command> {
        if sim.is_over() {
            return None;
        }
        let now = sim.now_ms();
        let interval = sim.config().scaled(self.difficulty.think_interval_ms());
        if let Some(last) = self.last_think_ms {
            if now.saturating_sub(last) < interval {
                return None;
            }
        }
        self.last_think_ms = Some(now);

        let suggestions = suggest(sim, self.faction);
        let pick = match self.difficulty {
            AiDifficulty::Easy => {
                let top = &suggestions[..suggestions.len().min(3)];
                self.rng.choose(top)
            }
            AiDifficulty::Medium | AiDifficulty::Hard => suggestions.first(),
        }?;

        debug!(faction = self.faction.name(), kind = ?pick.kind, source = %pick.source,
            target = %pick.target, score = pick.score, "AI move");
        Some(pick.command())
    }
}

// =============================================================================
// TESTS
// =============================================================================
