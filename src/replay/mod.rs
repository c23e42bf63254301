//! Recording and Playback
//!
//! - `recorder`: `EventSink` that captures a game's event stream
//! - `history`: The saved document (JSON or XML)
//! - `playback`: Deterministic re-run of a recorded game

pub mod recorder;
pub mod history;
pub mod playback;

pub use recorder::{GameMetadata, GameRecorder, GameType};
pub use history::{GameHistory, HistoryError};
pub use playback::Playback;
