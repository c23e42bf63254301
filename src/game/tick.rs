//! Simulation Tick
//!
//! The per-tick update. Order matters for determinism:
//!
//! 1. Cell growth (and evolution re-derivation)
//! 2. Spawn scheduling, including support balls
//! 3. Ball movement
//! 4. Ball-ball annihilation
//! 5. Ball arrival: capture, reinforcement or attack
//! 6. Turn timer
//! 7. Win condition

use std::collections::BTreeSet;

use tracing::info;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::game::ball::Ball;
use crate::game::bridge::BridgeKey;
use crate::game::cell::{CellId, Faction};
use crate::game::events::{CaptureCause, GameEventData, RemovalReason, TurnSwitchReason};
use crate::game::state::{GamePhase, Simulation};
use crate::game::summary::format_time;

/// Result of a tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickResult {
    /// Balls spawned this tick (support balls included).
    pub spawned: u32,
    /// Balls destroyed by annihilation.
    pub annihilated: u32,
    /// Balls that reached their target.
    pub arrivals: u32,
    /// The game is over (now or earlier).
    pub game_ended: bool,
    /// Winner, once over.
    pub winner: Option<Faction>,
}

/// Run one simulation tick.
///
/// # Determinism
///
/// - Cells, bridges and balls are iterated in id order (BTreeMap)
/// - Fixed-point geometry only
/// - Support-ball draws use the simulation's seeded RNG
pub fn tick(sim: &mut Simulation) -> TickResult {
    let mut result = TickResult::default();

    if let GamePhase::Over { winner, .. } = sim.phase {
        result.game_ended = true;
        result.winner = Some(winner);
        return result;
    }

    // 0. Advance clock
    sim.tick += 1;
    let now = sim.now_ms();

    // 1. Cell growth
    grow_cells(sim, now);

    // 2. Spawn balls
    result.spawned = spawn_balls(sim, now);

    // 3. Move balls
    for ball in sim.balls.values_mut() {
        ball.advance();
    }

    // 4. Annihilate opposing balls
    result.annihilated = annihilate_balls(sim);

    // 5. Resolve arrivals
    result.arrivals = resolve_arrivals(sim);

    // 6. Turn timer
    let dt = sim.config.tick_duration_ms(sim.tick);
    if sim.turn.advance(dt) {
        sim.pass_turn(TurnSwitchReason::Timer);
    }

    // 7. Win condition
    if let Some(winner) = check_win_condition(sim) {
        end_game(sim, winner, now);
        result.game_ended = true;
        result.winner = Some(winner);
    }

    result
}

// =============================================================================
// STEPS
// =============================================================================

fn grow_cells(sim: &mut Simulation, now: u64) {
    let interval = sim.config.scaled(sim.config.growth_interval_ms);
    let changes: Vec<_> = sim
        .cells
        .values_mut()
        .filter_map(|cell| cell.update(now, interval).map(|change| (cell.id, change)))
        .collect();
    for (id, change) in changes {
        sim.note_evolution(id, Some(change));
    }
}

/// Every live directed key spawns at most once per interval. A two-way pair
/// contributes both directions; each is throttled independently.
fn spawn_balls(sim: &mut Simulation, now: u64) -> u32 {
    let mut keys: BTreeSet<BridgeKey> = BTreeSet::new();
    for bridge in sim.bridges.values() {
        keys.insert(bridge.key());
        if bridge.has_reverse {
            keys.insert(bridge.reverse_key());
        }
    }

    let mut spawned = 0;
    for key in keys {
        spawned += spawn_on(sim, key, now);
    }
    spawned
}

fn spawn_on(sim: &mut Simulation, (source_id, target_id): BridgeKey, now: u64) -> u32 {
    // An earlier spawn this tick may have dropped the bridge over the cap.
    if !sim.bridges.contains_key(&(source_id, target_id)) {
        return 0;
    }
    let support_percent = sim.support_multiplier_percent(source_id);
    let (Some(source), Some(target)) = (sim.cells.get(&source_id), sim.cells.get(&target_id)) else {
        return 0;
    };
    let Some(faction) = source.owner() else {
        return 0;
    };
    if source.points() == 0 {
        return 0;
    }

    let interval = sim.config.scaled(sim.config.spawn_interval_ms) / source.evolution().value() as u64;
    if let Some(last) = sim.last_spawn_ms.get(&(source_id, target_id)) {
        if now.saturating_sub(*last) < interval {
            return 0;
        }
    }

    let id = sim.next_ball_id;
    sim.next_ball_id += 1;
    let mut balls = vec![Ball::spawn(id, source, target, faction, &sim.config)];

    let is_combat = target.owner().is_some_and(|owner| owner != faction);
    if is_combat && support_percent > 100 {
        let slots = ((support_percent - 100) * 5 / 100).min(sim.config.support_extra_balls);
        for _ in 0..slots {
            if sim.rng.next_bool(sim.config.support_ball_probability) {
                let id = sim.next_ball_id;
                sim.next_ball_id += 1;
                balls.push(Ball::spawn(id, source, target, faction, &sim.config).into_support());
            }
        }
    }

    #[cfg(feature = "debug-tracing")]
    trace!(source = %source_id, target = %target_id, count = balls.len(), "Spawned balls");

    let count = balls.len() as u32;
    for ball in balls {
        sim.balls.insert(ball.id, ball);
    }

    let change = sim.cells.get_mut(&source_id).and_then(|c| c.remove_points(1).1);
    sim.note_evolution(source_id, change);
    sim.last_spawn_ms.insert((source_id, target_id), now);
    count
}

fn annihilate_balls(sim: &mut Simulation) -> u32 {
    let radius = sim.config.ball_radius_fixed();
    let balls: Vec<&Ball> = sim.balls.values().collect();
    let mut doomed = BTreeSet::new();
    for (i, a) in balls.iter().enumerate() {
        for b in &balls[i + 1..] {
            if a.collides_with(b, radius) {
                doomed.insert(a.id);
                doomed.insert(b.id);
            }
        }
    }

    #[cfg(feature = "debug-tracing")]
    if !doomed.is_empty() {
        trace!(count = doomed.len(), "Balls annihilated");
    }

    for id in &doomed {
        sim.balls.remove(id);
    }
    doomed.len() as u32
}

fn resolve_arrivals(sim: &mut Simulation) -> u32 {
    let radius = sim.config.cell_radius_fixed();
    let arrived: Vec<u32> = sim
        .balls
        .values()
        .filter(|ball| ball.has_arrived(radius))
        .map(|ball| ball.id)
        .collect();

    let mut count = 0;
    for id in arrived {
        if let Some(ball) = sim.balls.remove(&id) {
            resolve_arrival(sim, &ball);
            count += 1;
        }
    }
    count
}

fn resolve_arrival(sim: &mut Simulation, ball: &Ball) {
    let scored = ball.faction == sim.config.scored_faction;
    let support_percent = sim.support_multiplier_percent(ball.source);
    let Some(target) = sim.cells.get_mut(&ball.target) else {
        return;
    };

    match target.owner() {
        None => {
            let before = target.evolution();
            if target.try_capture(ball.attack_value, ball.faction) {
                let (new_type, points, after) = (target.cell_type, target.points(), target.evolution());
                info!(cell = %ball.target, ?new_type, "Empty cell captured");
                sim.emit(GameEventData::CellCaptured {
                    cell_id: ball.target,
                    new_type,
                    points,
                    cause: CaptureCause::Empty,
                });
                if before != after {
                    sim.note_evolution(ball.target, Some((before, after)));
                }
                if scored {
                    sim.score += sim.config.scoring.empty_capture;
                }
            }
        }
        Some(owner) if owner == ball.faction => {
            let change = target.add_points(ball.attack_value);
            let points = target.points();
            sim.emit(GameEventData::CellReinforced {
                cell_id: ball.target,
                amount: ball.attack_value,
                points,
            });
            sim.note_evolution(ball.target, change);
            if scored {
                sim.score += sim.config.scoring.reinforcement;
            }
        }
        Some(_) => {
            let damage = if ball.is_support_ball {
                ball.attack_value
            } else {
                ball.attack_value * support_percent / 100
            };
            let (removed, change) = target.remove_points(damage);
            let remaining = target.points();
            sim.emit(GameEventData::CellAttacked {
                cell_id: ball.target,
                attacker: ball.faction,
                damage: removed,
                remaining,
            });
            sim.note_evolution(ball.target, change);
            if scored {
                sim.score += removed * sim.config.scoring.per_damage_point;
            }
            if remaining == 0 {
                capture_by_combat(sim, ball.target, ball.faction);
                if scored {
                    sim.score += sim.config.scoring.combat_capture;
                }
            }
        }
    }
}

/// Depleted cell changes hands: every bridge touching it is removed and it
/// restarts with the combat grant.
fn capture_by_combat(sim: &mut Simulation, cell: CellId, attacker: Faction) {
    let keys: Vec<BridgeKey> = sim
        .bridges
        .values()
        .filter(|bridge| bridge.touches(cell))
        .map(|bridge| bridge.key())
        .collect();
    for key in keys {
        if sim.detach_bridge(key).is_some() {
            sim.emit(GameEventData::BridgeRemoved {
                source_id: key.0,
                target_id: key.1,
                reason: RemovalReason::Capture,
                refund: 0,
                refunded_to: None,
            });
        }
    }

    let grant = sim.config.combat_capture_grant;
    let Some(target) = sim.cells.get_mut(&cell) else {
        return;
    };
    let change = target.capture_by_combat(attacker, grant);
    let (new_type, points) = (target.cell_type, target.points());
    info!(%cell, ?new_type, "Cell captured in combat");
    sim.emit(GameEventData::CellCaptured {
        cell_id: cell,
        new_type,
        points,
        cause: CaptureCause::Combat,
    });
    sim.note_evolution(cell, change);
}

/// No empty cells left and one faction holds nothing: the other wins.
pub fn check_win_condition(sim: &Simulation) -> Option<Faction> {
    if sim.empty_count() > 0 {
        return None;
    }
    if sim.cell_count(Faction::Player) == 0 {
        Some(Faction::Enemy)
    } else if sim.cell_count(Faction::Enemy) == 0 {
        Some(Faction::Player)
    } else {
        None
    }
}

fn end_game(sim: &mut Simulation, winner: Faction, now: u64) {
    sim.phase = GamePhase::Over {
        winner,
        ended_at_ms: now,
    };
    info!(winner = winner.name(), score = sim.score, tick = sim.tick, "Game over");
    let cells = sim.snapshot();
    sim.emit(GameEventData::GameEnd {
        winner,
        score: sim.score,
        time: format_time(now / 1000),
        elapsed_ms: now,
        cells,
    });
}

// =============================================================================
// TESTS
// =============================================================================
