//! Level Data
//!
//! The game-data file holds every level (a character grid plus a per-symbol
//! description list) and the player's per-level summary records.
//!
//! ```text
//! ########
//! #u  o e#      '#' and ' ' are skipped; every other symbol binds the
//! #  o   #      next entry of its description list, in row-major order.
//! ########
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::game::cell::{CellShape, CellType, EvolutionLevel};
use crate::game::config::SimulationConfig;
use crate::game::state::CellPlacement;
use crate::game::summary::{calculate_stars, format_time};

/// Levels bundled with the binary.
const BUILTIN_LEVELS: &str = include_str!("levels.json");

// =============================================================================
// ERRORS
// =============================================================================

/// Errors loading a level or the game-data file.
#[derive(Debug, Error)]
pub enum LevelError {
    /// File could not be read or written.
    #[error("game data I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid game-data JSON.
    #[error("invalid game data: {0}")]
    Json(#[from] serde_json::Error),

    /// No level with this name.
    #[error("level '{0}' not found")]
    UnknownLevel(String),

    /// The level map places no cells.
    #[error("level '{0}' has no cells")]
    EmptyMap(String),
}

// =============================================================================
// FILE SCHEMA
// =============================================================================

/// One cell's entry in a level description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDescription {
    /// Starting points.
    pub points: u32,
    /// Evolution level as saved by the editor. Informational: evolution is
    /// always derived from points.
    pub evolution: u8,
    /// Shape code: `"c"`, `"t"` or `"r"`.
    pub kind: String,
    /// Owner: `"blue"` (player), `"red"` (enemy) or anything else (empty).
    pub color: String,
}

impl CellDescription {
    /// Shape for the `kind` code. Unknown codes are rectangles.
    pub fn shape(&self) -> CellShape {
        match self.kind.as_str() {
            "c" => CellShape::Circle,
            "t" => CellShape::Triangle,
            _ => CellShape::Rectangle,
        }
    }

    /// Owner for the `color` code.
    pub fn cell_type(&self) -> CellType {
        match self.color.as_str() {
            "blue" => CellType::Player,
            "red" => CellType::Enemy,
            _ => CellType::Empty,
        }
    }
}

/// A level: character grid plus per-symbol descriptions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDefinition {
    /// Grid rows, top to bottom.
    pub map: Vec<String>,
    /// Description list per symbol.
    #[serde(default)]
    pub description: BTreeMap<String, Vec<CellDescription>>,
}

/// Best result recorded for a level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    /// 0-3.
    pub stars: u8,
    /// Elapsed time, `MM:SS`.
    pub time: String,
    /// Final score.
    pub score: u32,
}

/// Per-level progress.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of levels in the file.
    #[serde(default)]
    pub total_levels: usize,
    /// Records by level name.
    #[serde(default)]
    pub levels: BTreeMap<String, LevelRecord>,
}

/// The whole game-data file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    /// Levels by name (`level1`, `level2`, ...).
    #[serde(default)]
    pub levels: BTreeMap<String, LevelDefinition>,
    /// Progress records.
    #[serde(default)]
    pub summary: Summary,
}

// =============================================================================
// LOADING
// =============================================================================

impl LevelDefinition {
    /// Cell placements for this level on the configured screen.
    ///
    /// Each grid cell is `screen_width / columns` by `screen_height / rows`
    /// and cells sit at its centre. Surplus symbols and unused description
    /// entries are logged and skipped.
    pub fn placements(&self, name: &str, config: &SimulationConfig) -> Result<Vec<CellPlacement>, LevelError> {
        let rows = self.map.len() as i32;
        let columns = self.map.first().map(|row| row.chars().count()).unwrap_or(0) as i32;
        if rows == 0 || columns == 0 {
            return Err(LevelError::EmptyMap(name.to_string()));
        }
        let grid_width = config.screen_width / columns;
        let grid_height = config.screen_height / rows;

        let mut used: BTreeMap<&str, usize> = BTreeMap::new();
        let mut placements = Vec::new();
        let mut symbol_buf = [0u8; 4];

        for (y, row) in self.map.iter().enumerate() {
            for (x, symbol) in row.chars().enumerate() {
                if symbol == '#' || symbol == ' ' {
                    continue;
                }
                let symbol: &str = symbol.encode_utf8(&mut symbol_buf);
                let Some((key, entries)) = self.description.get_key_value(symbol) else {
                    warn!(level = name, symbol, "Map symbol has no description; skipped");
                    continue;
                };
                let index = used.entry(key.as_str()).or_insert(0);
                let Some(entry) = entries.get(*index) else {
                    warn!(level = name, symbol, "Too many cells of this type in map; skipped");
                    continue;
                };
                *index += 1;

                if EvolutionLevel::from_points(entry.points).value() != entry.evolution as u32 {
                    debug!(level = name, symbol, "Saved evolution differs from points; deriving");
                }

                let px = x as i32 * grid_width + grid_width / 2;
                let py = y as i32 * grid_height + grid_height / 2;
                placements.push(
                    CellPlacement::at(px, py, entry.cell_type(), entry.shape()).with_points(entry.points),
                );
            }
        }

        for (symbol, entries) in &self.description {
            let placed = used.get(symbol.as_str()).copied().unwrap_or(0);
            if placed != entries.len() {
                warn!(level = name, symbol = symbol.as_str(), placed, listed = entries.len(),
                    "Not all described cells were placed");
            }
        }

        if placements.is_empty() {
            return Err(LevelError::EmptyMap(name.to_string()));
        }
        Ok(placements)
    }
}

impl GameData {
    /// The bundled demo levels.
    pub fn builtin() -> Result<Self, LevelError> {
        Ok(serde_json::from_str(BUILTIN_LEVELS)?)
    }

    /// Parse game data from JSON.
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a game-data file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let data = Self::from_json(&text)?;
        info!(path = %path.as_ref().display(), levels = data.levels.len(), "Game data loaded");
        Ok(data)
    }

    /// Write the game-data file (pretty JSON).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LevelError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Placements for a named level.
    pub fn build_placements(&self, name: &str, config: &SimulationConfig) -> Result<Vec<CellPlacement>, LevelError> {
        let level = self
            .levels
            .get(name)
            .ok_or_else(|| LevelError::UnknownLevel(name.to_string()))?;
        let placements = level.placements(name, config)?;
        info!(level = name, cells = placements.len(), "Level loaded");
        Ok(placements)
    }

    /// `level1` is always open; `levelN` opens once `level(N-1)` earned a star.
    pub fn is_level_unlocked(&self, name: &str) -> bool {
        if name == "level1" {
            return true;
        }
        let Some(number) = level_number(name) else {
            return false;
        };
        let previous = format!("level{}", number.saturating_sub(1));
        self.summary
            .levels
            .get(&previous)
            .is_some_and(|record| record.stars > 0)
    }

    /// The level after `name`, if the file has one.
    pub fn next_level_name(&self, name: &str) -> Option<String> {
        let next = format!("level{}", level_number(name)? + 1);
        self.levels.contains_key(&next).then_some(next)
    }

    /// Record a finished level, keeping the better of the old and new result.
    ///
    /// Returns the stars earned by this run.
    pub fn record_result(&mut self, name: &str, score: u32, elapsed_secs: u64) -> u8 {
        let record = LevelRecord {
            stars: calculate_stars(score, elapsed_secs),
            time: format_time(elapsed_secs),
            score,
        };
        let stars = record.stars;

        let better = match self.summary.levels.get(name) {
            Some(old) => (record.stars, record.score) > (old.stars, old.score),
            None => true,
        };
        if better {
            info!(level = name, stars, score, time = %record.time, "Level record saved");
            self.summary.levels.insert(name.to_string(), record);
        }
        self.summary.total_levels = self.levels.len();
        stars
    }
}

fn level_number(name: &str) -> Option<u32> {
    name.strip_prefix("level")?.parse().ok()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;

    fn description(points: u32, kind: &str, color: &str) -> CellDescription {
        CellDescription {
            points,
            evolution: 1,
            kind: kind.to_string(),
            color: color.to_string(),
        }
    }

    #[test]
    fn test_builtin_levels_parse() {
        let data = GameData::builtin().unwrap();
        assert_eq!(data.levels.len(), 2);
        let config = SimulationConfig::default();
        assert_eq!(data.build_placements("level1", &config).unwrap().len(), 8);

        let level2 = data.build_placements("level2", &config).unwrap();
        assert_eq!(level2.len(), 6);
        assert_eq!(level2.iter().filter(|p| p.cell_type == CellType::Empty).count(), 2);
    }

    #[test]
    fn test_row_major_binding() {
        let mut level = LevelDefinition {
            map: vec!["#u u#".to_string(), "#e o#".to_string()],
            description: BTreeMap::new(),
        };
        level.description.insert("u".into(), vec![description(5, "c", "blue"), description(7, "t", "blue")]);
        level.description.insert("e".into(), vec![description(9, "r", "red")]);
        level.description.insert("o".into(), vec![description(0, "c", "no")]);

        let placements = level.placements("test", &SimulationConfig::default()).unwrap();
        assert_eq!(placements.len(), 4);
        // 800 / 5 = 160 wide, 600 / 2 = 300 tall.
        assert_eq!(placements[0].position, FixedVec2::from_ints(240, 150));
        assert_eq!(placements[0].points, Some(5));
        assert_eq!(placements[1].position, FixedVec2::from_ints(560, 150));
        assert_eq!(placements[1].shape, CellShape::Triangle);
        assert_eq!(placements[2].cell_type, CellType::Enemy);
        assert_eq!(placements[2].shape, CellShape::Rectangle);
        assert_eq!(placements[3].cell_type, CellType::Empty);
    }

    #[test]
    fn test_count_mismatch_is_not_fatal() {
        let mut level = LevelDefinition {
            map: vec!["uuu".to_string(), "x  ".to_string()],
            description: BTreeMap::new(),
        };
        level.description.insert("u".into(), vec![description(5, "c", "blue"), description(5, "c", "blue")]);
        level.description.insert("e".into(), vec![description(5, "c", "red")]);

        let placements = level.placements("test", &SimulationConfig::default()).unwrap();
        assert_eq!(placements.len(), 2);
    }

    #[test]
    fn test_unknown_and_empty_levels() {
        let data = GameData::builtin().unwrap();
        assert!(matches!(
            data.build_placements("level9", &SimulationConfig::default()),
            Err(LevelError::UnknownLevel(_))
        ));

        let level = LevelDefinition {
            map: vec!["####".to_string(), "#  #".to_string()],
            description: BTreeMap::new(),
        };
        assert!(matches!(
            level.placements("walls", &SimulationConfig::default()),
            Err(LevelError::EmptyMap(_))
        ));
    }

    #[test]
    fn test_unlocking_and_next_level() {
        let mut data = GameData::builtin().unwrap();
        assert!(data.is_level_unlocked("level1"));
        assert!(!data.is_level_unlocked("level2"));
        assert!(!data.is_level_unlocked("bonus"));

        assert_eq!(data.record_result("level1", 0, 60), 0);
        assert!(!data.is_level_unlocked("level2"));

        assert_eq!(data.record_result("level1", 1200, 90), 2);
        assert!(data.is_level_unlocked("level2"));

        assert_eq!(data.next_level_name("level1"), Some("level2".to_string()));
        assert_eq!(data.next_level_name("level2"), None);
    }

    #[test]
    fn test_record_keeps_best() {
        let mut data = GameData::builtin().unwrap();
        data.record_result("level1", 1600, 100);
        data.record_result("level1", 1100, 50);
        let record = &data.summary.levels["level1"];
        assert_eq!(record.stars, 3);
        assert_eq!(record.score, 1600);
        assert_eq!(record.time, "01:40");
        assert_eq!(data.summary.total_levels, 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game_data.json");
        let mut data = GameData::builtin().unwrap();
        data.record_result("level1", 500, 30);
        data.save(&path).unwrap();
        assert_eq!(GameData::load(&path).unwrap(), data);
    }
}
