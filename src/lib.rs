//! # War of Cells
//!
//! Deterministic simulation of a territory-control game: cells grow points,
//! bridges carry balls between cells, balls reinforce or attack, and the
//! side that owns every cell wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WAR OF CELLS                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── state.rs    - Simulation arena and command API          │
//! │  ├── tick.rs     - Per-tick update                           │
//! │  ├── cell.rs     - Cells, shapes, evolution                  │
//! │  ├── bridge.rs   - Bridges and their cost                    │
//! │  ├── events.rs   - Event taxonomy                            │
//! │  ├── level.rs    - Level maps and progress summary           │
//! │  └── ai.rs       - Move suggestions                          │
//! │                                                              │
//! │  replay/         - Recording and playback                    │
//! │  ├── recorder.rs - Event stream capture                      │
//! │  ├── history.rs  - JSON / XML documents                      │
//! │  └── playback.rs - Deterministic re-run                      │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── relay.rs    - Async relay server                        │
//! │  ├── peer.rs     - Blocking relay client                     │
//! │  └── session.rs  - Simulation plus peer link                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in game logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Given the same board, seed and commands at the same ticks, two runs
//! produce identical state hashes. Playback relies on this.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod replay;
pub mod network;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use core::rng::DeterministicRng;
pub use game::{CellId, Command, Faction, GameEvent, Simulation, SimulationConfig};
pub use replay::{GameHistory, GameRecorder, Playback};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
