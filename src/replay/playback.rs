//! Playback
//!
//! Rebuilds a recorded game on a fresh simulation. Only command events are
//! re-applied, each just before the tick it was issued in; everything else
//! (captures, attacks, timer switches, game end) is regenerated by the
//! simulation itself. Time is a virtual clock scaled by the playback speed.

use tracing::{debug, info, warn};

use crate::game::command::Command;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::Simulation;
use crate::replay::history::{GameHistory, HistoryError};

/// Slowest playback speed.
pub const MIN_SPEED: f64 = 0.25;

/// Fastest playback speed.
pub const MAX_SPEED: f64 = 4.0;

/// Drives a recorded game forward.
#[derive(Debug)]
pub struct Playback {
    start: GameEvent,
    commands: Vec<(u32, Command)>,
    end_tick: u32,
    duration_ms: u64,

    sim: Simulation,
    next_command: usize,
    skipped: usize,

    clock_ms: f64,
    speed: f64,
    paused: bool,
}

impl Playback {
    /// Prepare playback of `history` from its `GAME_START`.
    pub fn new(history: &GameHistory) -> Result<Self, HistoryError> {
        let start = history.game_start()?.clone();
        let commands: Vec<(u32, Command)> = history
            .events
            .iter()
            .filter_map(|e| e.as_command().map(|c| (e.tick, c)))
            .collect();
        let end_tick = history.events.iter().map(|e| e.tick).max().unwrap_or(0);
        let sim = build(&start)?;

        info!(
            commands = commands.len(),
            end_tick,
            game_id = %history.metadata.game_id,
            "Playback ready"
        );

        Ok(Self {
            start,
            commands,
            end_tick,
            duration_ms: history.duration_ms(),
            sim,
            next_command: 0,
            skipped: 0,
            clock_ms: 0.0,
            speed: 1.0,
            paused: false,
        })
    }

    /// The reconstructed simulation.
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Virtual clock in ms.
    pub fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    /// Current speed multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Set the speed multiplier, clamped to `MIN_SPEED..=MAX_SPEED`.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
    }

    /// Paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stop the clock.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Restart the clock.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Flip between paused and running.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Commands that could not be re-applied.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Every command applied and the last recorded tick reached.
    pub fn is_finished(&self) -> bool {
        self.next_command >= self.commands.len()
            && (self.sim.tick_count() >= self.end_tick || self.sim.is_over())
    }

    /// Fraction of the recording played, `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.is_finished() || self.duration_ms == 0 {
            return 1.0;
        }
        (self.clock_ms / self.duration_ms as f64).clamp(0.0, 1.0)
    }

    /// Advance the virtual clock by `dt_ms * speed` and catch the simulation
    /// up. Returns the regenerated events.
    pub fn update(&mut self, dt_ms: f64) -> Vec<GameEvent> {
        if self.paused || self.is_finished() {
            return Vec::new();
        }
        self.clock_ms += dt_ms.max(0.0) * self.speed;
        let target = self.clock_tick().min(self.end_tick);
        self.advance_to_tick(target)
    }

    /// Jump to `ms`: rebuild from `GAME_START` and fast-forward. Events
    /// regenerated on the way are discarded.
    pub fn seek(&mut self, ms: f64) -> Result<(), HistoryError> {
        self.sim = build(&self.start)?;
        self.next_command = 0;
        self.skipped = 0;
        self.clock_ms = ms.max(0.0);
        let target = self.clock_tick().min(self.end_tick);
        self.advance_to_tick(target);
        debug!(ms, tick = self.sim.tick_count(), "Playback seek");
        Ok(())
    }

    /// Play everything that is left, ignoring the clock.
    pub fn run_to_end(&mut self) -> Vec<GameEvent> {
        let events = self.advance_to_tick(self.end_tick);
        self.clock_ms = self.clock_ms.max(self.sim.now_ms() as f64);
        events
    }

    /// Apply due commands and tick until the simulation reaches `tick`
    /// (or the game ends).
    pub fn advance_to_tick(&mut self, tick: u32) -> Vec<GameEvent> {
        loop {
            self.apply_due_commands();
            if self.sim.tick_count() >= tick || self.sim.is_over() {
                break;
            }
            self.sim.tick();
        }
        self.sim.take_events()
    }

    fn clock_tick(&self) -> u32 {
        let rate = self.sim.config().tick_rate.max(1) as f64;
        (self.clock_ms * rate / 1000.0).floor() as u32
    }

    fn apply_due_commands(&mut self) {
        let now = self.sim.tick_count();
        while let Some(&(tick, command)) = self.commands.get(self.next_command) {
            if tick > now {
                break;
            }
            self.next_command += 1;
            if let Err(reason) = self.sim.apply(command) {
                warn!(tick, ?command, %reason, "Skipping recorded command");
                self.skipped += 1;
            }
        }
    }
}

fn build(start: &GameEvent) -> Result<Simulation, HistoryError> {
    match &start.data {
        GameEventData::GameStart { seed, turn_based, config, cells } => {
            let mut sim = Simulation::from_snapshot(config.clone(), *seed, *turn_based, cells);
            sim.take_events();
            Ok(sim)
        }
        _ => Err(HistoryError::MissingGameStart),
    }
}

// =============================================================================
// TESTS
// =============================================================================
