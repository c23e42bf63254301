//! Simulation Configuration
//!
//! Every tunable of the cell simulation lives in one `SimulationConfig`,
//! built once per level and handed to the simulation at construction.
//! Defaults reproduce the classic 800x600 board at 60 ticks per second.

use std::path::Path;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::fixed::{Fixed, FIXED_HALF, from_int};
use crate::game::cell::Faction;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// File is not valid JSON for this schema.
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Score awarded to the scored faction for each kind of arrival.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTable {
    /// Capturing an empty cell.
    pub empty_capture: u32,
    /// A ball reinforcing a friendly cell.
    pub reinforcement: u32,
    /// Per point removed from an enemy cell.
    pub per_damage_point: u32,
    /// Capturing an enemy cell by depleting it.
    pub combat_capture: u32,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            empty_capture: 50,
            reinforcement: 5,
            per_damage_point: 10,
            combat_capture: 100,
        }
    }
}

/// Configuration for one simulation instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Board width in pixels.
    pub screen_width: i32,
    /// Board height in pixels.
    pub screen_height: i32,
    /// Cell radius in pixels (arrival distance).
    pub cell_radius: i32,
    /// Ball radius in pixels (collision distance is twice this).
    pub ball_radius: i32,
    /// Ball speed in pixels per tick (Q16.16).
    pub ball_speed: Fixed,
    /// Distance beyond the source rim at which balls appear, in pixels.
    pub spawn_offset: i32,
    /// Milliseconds between +1 point growth of an owned cell.
    pub growth_interval_ms: u64,
    /// Base milliseconds between spawns on a bridge, divided by evolution.
    pub spawn_interval_ms: u64,
    /// Pixels of bridge length per point of creation cost.
    pub bridge_cost_divisor: i32,
    /// Net influence needed to capture an empty cell.
    pub required_points: u32,
    /// Points granted to an empty cell on capture.
    pub empty_capture_grant: u32,
    /// Points granted to an owned cell captured through combat.
    pub combat_capture_grant: u32,
    /// Points of a freshly placed owned cell when the level gives none.
    pub starting_points: u32,
    /// Length of one turn in turn-based mode, in milliseconds.
    pub turn_duration_ms: u64,
    /// Global game speed in percent; 200 halves every interval.
    pub game_speed_percent: u32,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Support bonus per supporting cell, in percent.
    pub support_bonus_percent: u32,
    /// Maximum support multiplier, in percent.
    pub support_cap_percent: u32,
    /// Maximum number of extra support balls per spawn.
    pub support_extra_balls: u32,
    /// Probability of each extra support ball (Q16.16, 1.0 = always).
    pub support_ball_probability: Fixed,
    /// Score table for the scored faction.
    pub scoring: ScoreTable,
    /// The faction whose actions earn score (the human side).
    pub scored_faction: Faction,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            screen_width: 800,
            screen_height: 600,
            cell_radius: 30,
            ball_radius: 5,
            ball_speed: from_int(2),
            spawn_offset: 5,
            growth_interval_ms: 3000,
            spawn_interval_ms: 3000,
            bridge_cost_divisor: 30,
            required_points: 6,
            empty_capture_grant: 20,
            combat_capture_grant: 10,
            starting_points: 20,
            turn_duration_ms: 10_000,
            game_speed_percent: 100,
            tick_rate: 60,
            support_bonus_percent: 20,
            support_cap_percent: 200,
            support_extra_balls: 3,
            support_ball_probability: FIXED_HALF,
            scoring: ScoreTable::default(),
            scored_faction: Faction::Player,
        }
    }
}

impl SimulationConfig {
    /// Parse a JSON config; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Apply the game-speed scale to a base interval.
    #[inline]
    pub fn scaled(&self, interval_ms: u64) -> u64 {
        interval_ms * 100 / self.game_speed_percent.max(1) as u64
    }

    /// Simulation time at the given tick, in milliseconds.
    #[inline]
    pub fn tick_to_ms(&self, tick: u32) -> u64 {
        tick as u64 * 1000 / self.tick_rate.max(1) as u64
    }

    /// Milliseconds covered by the tick that ends at `tick`.
    #[inline]
    pub fn tick_duration_ms(&self, tick: u32) -> u64 {
        self.tick_to_ms(tick) - self.tick_to_ms(tick.saturating_sub(1))
    }

    /// Cell radius in fixed point.
    #[inline]
    pub fn cell_radius_fixed(&self) -> Fixed {
        from_int(self.cell_radius)
    }

    /// Ball radius in fixed point.
    #[inline]
    pub fn ball_radius_fixed(&self) -> Fixed {
        from_int(self.ball_radius)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.required_points, 6);
        assert_eq!(config.scaled(3000), 3000);
        assert_eq!(config.tick_to_ms(60), 1000);
        assert_eq!(config.scoring.combat_capture, 100);
    }

    #[test]
    fn test_game_speed_scales_intervals() {
        let config = SimulationConfig {
            game_speed_percent: 200,
            ..Default::default()
        };
        assert_eq!(config.scaled(3000), 1500);

        let stalled = SimulationConfig {
            game_speed_percent: 0,
            ..Default::default()
        };
        assert_eq!(stalled.scaled(30), 3000);
    }

    #[test]
    fn test_tick_durations_sum_to_a_second() {
        let config = SimulationConfig::default();
        let total: u64 = (1..=60).map(|t| config.tick_duration_ms(t)).sum();
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{"required_points": 8, "scoring": {"reinforcement": 7}}"#,
        ).unwrap();
        assert_eq!(config.required_points, 8);
        assert_eq!(config.scoring.reinforcement, 7);
        assert_eq!(config.scoring.empty_capture, 50);
        assert_eq!(config.cell_radius, 30);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(matches!(
            SimulationConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
