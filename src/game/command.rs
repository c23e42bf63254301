//! Simulation Commands
//!
//! The small command set every input source funnels into: local UI, AI,
//! playback and the network peer all call `Simulation::apply`.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::cell::{CellId, Faction};

/// A mutation request against the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Build a bridge from `source` to `target`.
    CreateBridge {
        /// Spawning cell.
        source: CellId,
        /// Receiving cell.
        target: CellId,
    },
    /// Remove the `source -> target` bridge, refunding its cost to the source.
    RemoveBridge {
        /// Spawning cell.
        source: CellId,
        /// Receiving cell.
        target: CellId,
    },
    /// Remove every outgoing bridge of `cell`.
    RemoveAllBridgesFromCell {
        /// The cell to clear.
        cell: CellId,
    },
    /// Switch between real-time and turn-based play.
    ToggleTurnBasedMode,
    /// Hand the turn to the other side.
    SwitchTurn,
}

impl Command {
    /// The cell whose owner issues this command, if any.
    pub fn acting_cell(&self) -> Option<CellId> {
        match self {
            Command::CreateBridge { source, .. } | Command::RemoveBridge { source, .. } => Some(*source),
            Command::RemoveAllBridgesFromCell { cell } => Some(*cell),
            Command::ToggleTurnBasedMode | Command::SwitchTurn => None,
        }
    }
}

/// Why a command was refused. The simulation is unchanged after a rejection.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BridgeRejection {
    /// The game has ended.
    #[error("game is over")]
    GameOver,

    /// No cell with this id.
    #[error("unknown cell {0}")]
    UnknownCell(CellId),

    /// Source and target are the same cell.
    #[error("a bridge needs two different cells")]
    SameCell,

    /// The acting cell is empty.
    #[error("cell {0} is not owned by any faction")]
    SourceNotOwned(CellId),

    /// Turn-based mode and it is the other side's turn.
    #[error("not {0:?}'s turn")]
    NotYourTurn(Faction),

    /// Outgoing bridges already equal the evolution level.
    #[error("bridge cap reached for evolution level {level}")]
    CapReached {
        /// Source evolution level.
        level: u32,
    },

    /// The source cannot pay the bridge cost.
    #[error("insufficient points: need {needed}, have {available}")]
    InsufficientPoints {
        /// Bridge cost.
        needed: u32,
        /// Source balance.
        available: u32,
    },

    /// The same directed bridge already exists.
    #[error("duplicate bridge")]
    Duplicate,

    /// A same-faction bridge already runs the other way.
    #[error("duplicate same-faction reverse bridge")]
    DuplicateReverse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acting_cell() {
        let create = Command::CreateBridge { source: CellId(3), target: CellId(4) };
        assert_eq!(create.acting_cell(), Some(CellId(3)));
        assert_eq!(Command::SwitchTurn.acting_cell(), None);
    }

    #[test]
    fn test_rejection_messages() {
        let err = BridgeRejection::InsufficientPoints { needed: 5, available: 2 };
        assert_eq!(err.to_string(), "insufficient points: need 5, have 2");
        assert_eq!(BridgeRejection::UnknownCell(CellId(9)).to_string(), "unknown cell #9");
    }

    #[test]
    fn test_command_json() {
        let json = serde_json::to_string(&Command::RemoveAllBridgesFromCell { cell: CellId(2) }).unwrap();
        assert_eq!(json, r#"{"command":"remove_all_bridges_from_cell","cell":2}"#);
    }
}
