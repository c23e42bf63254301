//! Game Recorder
//!
//! `GameRecorder` is an `EventSink`: drain the simulation into it every tick
//! and call `finish` for a `GameHistory` ready to save.

use chrono::{DateTime, Local};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::game::ai::AiDifficulty;
use crate::game::cell::Faction;
use crate::game::events::{EventSink, GameEvent, GameEventData};
use crate::replay::history::GameHistory;

/// How the recorded game was played.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameType {
    /// Human against the AI.
    #[default]
    #[serde(rename = "Single player")]
    SinglePlayer,
    /// Two humans on one machine.
    #[serde(rename = "Local multiplayer")]
    LocalMultiplayer,
    /// Two processes over the network.
    #[serde(rename = "Online game")]
    Online,
}

/// Descriptive header of a recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    /// `{level}_{YYYYmmdd_HHMMSS}_{completed|in_progress}`.
    pub game_id: String,
    /// Wall-clock start, RFC 3339.
    pub timestamp: String,
    /// Level name.
    pub level: String,
    /// How the game was played.
    pub game_type: GameType,
    /// Turn-based mode was on at the start.
    pub turn_based: bool,
    /// An AI controlled one side.
    pub ai_enabled: bool,
    /// AI difficulty, when enabled.
    pub ai_difficulty: Option<AiDifficulty>,
    /// Winner, once the game ended.
    pub result: Option<Faction>,
    /// Simulated duration in seconds.
    pub duration: f64,
}

/// Build a game id from a level name and a start time.
pub fn generate_game_id(level: &str, started: &DateTime<Local>, completed: bool) -> String {
    let status = if completed { "completed" } else { "in_progress" };
    format!("{}_{}_{}", level, started.format("%Y%m%d_%H%M%S"), status)
}

/// Collects the event stream of one game.
#[derive(Debug)]
pub struct GameRecorder {
    metadata: GameMetadata,
    events: Vec<GameEvent>,
    started: DateTime<Local>,
    recording: bool,
}

impl GameRecorder {
    /// Start recording a game on `level`.
    pub fn new(level: &str, game_type: GameType) -> Self {
        let started = Local::now();
        let metadata = GameMetadata {
            game_id: generate_game_id(level, &started, false),
            timestamp: started.to_rfc3339(),
            level: level.to_string(),
            game_type,
            turn_based: false,
            ai_enabled: false,
            ai_difficulty: None,
            result: None,
            duration: 0.0,
        };
        info!(game_id = %metadata.game_id, "Recording started");
        Self {
            metadata,
            events: Vec::new(),
            started,
            recording: true,
        }
    }

    /// Note that an AI plays one side.
    pub fn with_ai(mut self, difficulty: AiDifficulty) -> Self {
        self.metadata.ai_enabled = true;
        self.metadata.ai_difficulty = Some(difficulty);
        self
    }

    /// Still accepting events.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Events so far.
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// Metadata so far.
    pub fn metadata(&self) -> &GameMetadata {
        &self.metadata
    }

    /// Stop accepting events. `GAME_END` stops recording on its own.
    pub fn stop(&mut self) {
        self.recording = false;
    }

    /// Close the recording.
    pub fn finish(mut self) -> GameHistory {
        self.recording = false;
        if let Some(last) = self.events.last() {
            self.metadata.duration = last.timestamp as f64 / 1000.0;
        }
        info!(game_id = %self.metadata.game_id, events = self.events.len(), "Recording finished");
        GameHistory {
            metadata: self.metadata,
            events: self.events,
        }
    }
}

impl EventSink for GameRecorder {
    fn on_event(&mut self, event: &GameEvent) {
        if !self.recording {
            return;
        }
        match &event.data {
            GameEventData::GameStart { turn_based, .. } => {
                self.metadata.turn_based = *turn_based;
            }
            GameEventData::GameEnd { winner, elapsed_ms, .. } => {
                self.metadata.result = Some(*winner);
                self.metadata.duration = *elapsed_ms as f64 / 1000.0;
                self.metadata.game_id = generate_game_id(&self.metadata.level, &self.started, true);
                self.recording = false;
            }
            _ => {}
        }
        debug!(event = event.data.event_type(), tick = event.tick, "Recorded");
        self.events.push(event.clone());
    }
}
