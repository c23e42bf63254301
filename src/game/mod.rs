//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `config`: Simulation constants and score table
//! - `cell`: Cells, factions, shapes, evolution
//! - `bridge`: Directed bridges and their cost
//! - `ball`: In-flight units
//! - `state`: The simulation arena and command API
//! - `tick`: Per-tick update
//! - `turn`: Turn-based mode bookkeeping
//! - `command`: Commands and rejection reasons
//! - `events`: Event taxonomy and subscribers
//! - `level`: Level files and the progress summary
//! - `summary`: Stars and time formatting
//! - `ai`: Move suggestions and the AI controller

pub mod config;
pub mod cell;
pub mod bridge;
pub mod ball;
pub mod state;
pub mod tick;
pub mod turn;
pub mod command;
pub mod events;
pub mod level;
pub mod summary;
pub mod ai;

// Re-export key types
pub use config::SimulationConfig;
pub use cell::{Cell, CellId, CellShape, CellType, EvolutionLevel, Faction};
pub use bridge::{Bridge, BridgeDirection};
pub use ball::Ball;
pub use state::{CellPlacement, GamePhase, RemoveOutcome, Simulation};
pub use tick::TickResult;
pub use command::{BridgeRejection, Command};
pub use events::{EventSink, GameEvent, GameEventData};
pub use level::{GameData, LevelError};
pub use ai::{AiController, AiDifficulty, Suggestion, SuggestionKind};
