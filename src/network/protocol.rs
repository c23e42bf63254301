//! Protocol Messages
//!
//! Messages exchanged between peers and the relay. Serialized as JSON with a
//! `type` tag; the framing layer adds the length prefix and the byte mask.

use serde::{Serialize, Deserialize};

use crate::game::cell::Faction;
use crate::game::events::GameEvent;

/// The side a connected process plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Controls the `Player` faction.
    Player,
    /// Controls the `Enemy` faction.
    Enemy,
    /// Watches without issuing commands.
    Observer,
}

impl Role {
    /// The faction this role controls. Observers control none.
    pub fn faction(self) -> Option<Faction> {
        match self {
            Role::Player => Some(Faction::Player),
            Role::Enemy => Some(Faction::Enemy),
            Role::Observer => None,
        }
    }

    /// The role on the other side of the board. Observers have none.
    pub fn opponent(self) -> Option<Role> {
        self.faction().map(|f| Role::for_faction(f.opponent()))
    }

    /// The role that controls `faction`.
    pub fn for_faction(faction: Faction) -> Role {
        match faction {
            Faction::Player => Role::Player,
            Faction::Enemy => Role::Enemy,
        }
    }
}

/// A message on the peer wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerMessage {
    /// First message from a client: the role it would like.
    Connect {
        /// Requested role.
        role: Role,
    },

    /// Relay answer to `CONNECT`: the role actually granted.
    ConnectAck {
        /// Granted role.
        role: Role,
    },

    /// A command event to re-apply on the receiving side.
    GameEvent {
        /// The event as emitted by the sender's simulation.
        event: GameEvent,
    },

    /// Orderly goodbye.
    Disconnect,
}

impl PeerMessage {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Wire name, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Connect { .. } => "CONNECT",
            PeerMessage::ConnectAck { .. } => "CONNECT_ACK",
            PeerMessage::GameEvent { .. } => "GAME_EVENT",
            PeerMessage::Disconnect => "DISCONNECT",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
