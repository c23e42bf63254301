//! Network Layer
//!
//! Peer-to-peer command sync through a small relay. Not deterministic;
//! only command events cross the wire and each side re-applies them
//! through its own simulation.
//!
//! - `protocol`: Peer messages and roles
//! - `framing`: Length-prefixed, masked frames (blocking and async)
//! - `relay`: Async relay server
//! - `peer`: Blocking relay client with a background reader
//! - `session`: Simulation plus optional peer link

pub mod protocol;
pub mod framing;
pub mod relay;
pub mod peer;
pub mod session;

pub use protocol::{PeerMessage, Role};
pub use framing::{NetError, DEFAULT_KEY, MAX_FRAME_SIZE};
pub use relay::{ClientInfo, RelayConfig, RelayError, RelayServer};
pub use peer::{validate_address, PeerConfig, PeerLink};
pub use session::{NetworkSession, SessionError};
