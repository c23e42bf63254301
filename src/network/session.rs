//! Network Session
//!
//! One simulation plus an optional relay link. Local commands are applied
//! immediately and their command events forwarded; inbound command events
//! are drained once per tick and re-applied through the same
//! `Simulation::apply` path. Inbound-origin events are never sent back.
//!
//! Both directions go through the same permission rule: a player session
//! only issues commands for its own faction and only accepts remote commands
//! for the opposing one.

use tracing::{debug, info, warn};

use crate::game::command::{BridgeRejection, Command};
use crate::game::events::GameEvent;
use crate::game::state::Simulation;
use crate::network::peer::{PeerConfig, PeerLink};
use crate::network::protocol::{PeerMessage, Role};

/// Why a local command was not applied.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session's role may not issue this command.
    #[error("role {0:?} may not issue this command")]
    NotPermitted(Role),

    /// The simulation refused it.
    #[error(transparent)]
    Rejected(#[from] BridgeRejection),
}

/// A simulation, possibly mirrored with a remote peer.
#[derive(Debug)]
pub struct NetworkSession {
    sim: Simulation,
    link: Option<PeerLink>,
    role: Option<Role>,
}

impl NetworkSession {
    /// Local-only session: every command allowed, nothing sent.
    pub fn local(sim: Simulation) -> Self {
        Self { sim, link: None, role: None }
    }

    /// Session over an established link, restricted to its granted role.
    pub fn with_link(sim: Simulation, link: PeerLink) -> Self {
        let role = Some(link.role());
        Self { sim, link: Some(link), role }
    }

    /// Connect to the relay, or fall back to a local-only session if the
    /// connection or handshake fails.
    pub fn connect_or_local(sim: Simulation, config: &PeerConfig, role: Role) -> Self {
        match PeerLink::connect(config, role) {
            Ok(link) => {
                info!(role = ?link.role(), "Online session");
                Self::with_link(sim, link)
            }
            Err(e) => {
                warn!(error = %e, "Relay unavailable, playing locally");
                Self::local(sim)
            }
        }
    }

    /// The simulation.
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Give the simulation back, closing the link.
    pub fn into_simulation(self) -> Simulation {
        self.sim
    }

    /// Role restriction, `None` when local-only.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// A peer link is up.
    pub fn is_online(&self) -> bool {
        self.link.as_ref().is_some_and(PeerLink::is_connected)
    }

    /// Apply a command from local input and forward its command events.
    pub fn apply_local(&mut self, command: Command) -> Result<(), SessionError> {
        self.check_permitted(command)?;

        let first_new = self.sim.pending_events.len();
        self.sim.apply(command)?;

        let outgoing: Vec<GameEvent> = self.sim.pending_events[first_new..]
            .iter()
            .filter(|e| e.as_command().is_some())
            .cloned()
            .collect();
        self.send_events(outgoing);
        Ok(())
    }

    /// Apply inbound commands, advance one tick, and return every event
    /// produced since the last call.
    pub fn tick(&mut self) -> Vec<GameEvent> {
        self.receive();
        self.sim.tick();
        self.sim.take_events()
    }

    fn check_permitted(&self, command: Command) -> Result<(), SessionError> {
        match self.role {
            Some(role) if !permits(&self.sim, role, command) => Err(SessionError::NotPermitted(role)),
            _ => Ok(()),
        }
    }

    /// Role of the far side. An observer session takes commands for either
    /// faction; the relay never forwards observer commands.
    fn remote_role(&self) -> Option<Role> {
        self.role.and_then(Role::opponent)
    }

    fn send_events(&mut self, events: Vec<GameEvent>) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        for event in events {
            if let Err(e) = link.send(&PeerMessage::GameEvent { event }) {
                warn!(error = %e, "Send failed");
                break;
            }
        }
        self.drop_link_if_closed();
    }

    fn receive(&mut self) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        for msg in link.poll() {
            match msg {
                PeerMessage::GameEvent { event } => match event.as_command() {
                    Some(command) => {
                        if let Some(remote) = self.remote_role().filter(|r| !permits(&self.sim, *r, command)) {
                            warn!(tick = event.tick, ?command, ?remote, "Remote command not permitted for sender");
                            continue;
                        }
                        if let Err(reason) = self.sim.apply(command) {
                            warn!(tick = event.tick, ?command, %reason, "Remote command rejected");
                        }
                    }
                    None => debug!(event = event.data.event_type(), "Ignoring derived remote event"),
                },
                other => debug!(kind = other.kind(), "Ignoring control message"),
            }
        }
        self.drop_link_if_closed();
    }

    fn drop_link_if_closed(&mut self) {
        if self.link.as_ref().is_some_and(|l| !l.is_connected()) {
            warn!("Peer link lost, continuing locally");
            self.link = None;
            self.role = None;
        }
    }
}

/// May `role` issue `command` against `sim`?
///
/// Observers never may. Turn mode may always be toggled, `SwitchTurn` needs
/// the turn, and everything else must act from a cell the role's faction
/// owns (or one that no longer resolves, which the simulation rejects).
fn permits(sim: &Simulation, role: Role, command: Command) -> bool {
    let Some(faction) = role.faction() else {
        return false;
    };
    match command {
        Command::ToggleTurnBasedMode => true,
        Command::SwitchTurn => sim.turn().may_act(faction),
        _ => command
            .acting_cell()
            .and_then(|id| sim.cell(id))
            .and_then(|cell| cell.owner())
            .map_or(true, |owner| owner == faction),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdListener;
    use std::sync::Arc;
    use std::time::Duration;
    use crate::game::bridge::BridgeDirection;
    use crate::game::cell::{CellId, CellShape, CellType};
    use crate::game::config::SimulationConfig;
    use crate::game::events::GameEventData;
    use crate::game::state::CellPlacement;
    use crate::network::relay::{RelayConfig, RelayServer};

    fn board() -> Simulation {
        Simulation::new(
            SimulationConfig::default(),
            9,
            &[
                CellPlacement::at(100, 300, CellType::Player, CellShape::Circle).with_points(30),
                CellPlacement::at(400, 300, CellType::Enemy, CellShape::Circle).with_points(30),
                CellPlacement::at(250, 100, CellType::Empty, CellShape::Circle),
            ],
        )
    }

    fn unused_port() -> u16 {
        StdListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn test_local_session_allows_both_sides() {
        let mut session = NetworkSession::local(board());
        session.apply_local(Command::CreateBridge { source: CellId(0), target: CellId(2) }).unwrap();
        session.apply_local(Command::CreateBridge { source: CellId(1), target: CellId(2) }).unwrap();
        let events = session.tick();
        assert_eq!(events.iter().filter(|e| e.as_command().is_some()).count(), 2);
        assert_eq!(session.simulation().tick_count(), 1);
    }

    #[test]
    fn test_falls_back_to_local() {
        let config = PeerConfig {
            port: unused_port(),
            connect_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let session = NetworkSession::connect_or_local(board(), &config, Role::Player);
        assert!(!session.is_online());
        assert_eq!(session.role(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_commands_mirror_between_peers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = Arc::new(RelayServer::new(RelayConfig::default()));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        let (host_hash, guest_hash) = tokio::task::spawn_blocking(move || {
            let config = PeerConfig { port, ..Default::default() };
            let mut host = NetworkSession::connect_or_local(board(), &config, Role::Player);
            let mut guest = NetworkSession::connect_or_local(board(), &config, Role::Player);
            assert_eq!(host.role(), Some(Role::Player));
            assert_eq!(guest.role(), Some(Role::Enemy));

            // Each side only commands its own faction.
            assert!(matches!(
                host.apply_local(Command::CreateBridge { source: CellId(1), target: CellId(2) }),
                Err(SessionError::NotPermitted(Role::Player))
            ));

            host.apply_local(Command::CreateBridge { source: CellId(0), target: CellId(2) }).unwrap();
            guest.apply_local(Command::CreateBridge { source: CellId(1), target: CellId(0) }).unwrap();

            // Wait until both sides hold both bridges.
            for _ in 0..200 {
                host.receive();
                guest.receive();
                if host.simulation().bridges().count() == 2 && guest.simulation().bridges().count() == 2 {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            assert_eq!(host.simulation().bridges().count(), 2);
            assert_eq!(guest.simulation().bridges().count(), 2);

            // Nothing echoes back.
            std::thread::sleep(Duration::from_millis(100));
            host.receive();
            guest.receive();
            assert_eq!(host.simulation().bridges().count(), 2);

            (host.simulation().state_hash(), guest.simulation().state_hash())
        })
        .await
        .unwrap();

        assert_eq!(host_hash, guest_hash);
        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remote_command_for_local_faction_is_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = Arc::new(RelayServer::new(RelayConfig::default()));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        tokio::task::spawn_blocking(move || {
            let config = PeerConfig { port, ..Default::default() };
            let mut host = NetworkSession::connect_or_local(board(), &config, Role::Player);
            let mut enemy = PeerLink::connect(&config, Role::Enemy).unwrap();
            assert_eq!(enemy.role(), Role::Enemy);

            let created = |source: u32| PeerMessage::GameEvent {
                event: GameEvent::new(0, 0, GameEventData::BridgeCreated {
                    source_id: CellId(source),
                    target_id: CellId(2),
                    direction: BridgeDirection::OneWay,
                    cost: 8,
                }),
            };
            // A bridge from the host's own cell, then a legitimate one.
            enemy.send(&created(0)).unwrap();
            enemy.send(&created(1)).unwrap();

            for _ in 0..200 {
                host.receive();
                if host.simulation().bridges().count() > 0 {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            assert!(host.simulation().bridge(CellId(1), CellId(2)).is_some());
            assert!(host.simulation().bridge(CellId(0), CellId(2)).is_none());
            assert_eq!(host.simulation().bridges().count(), 1);
        })
        .await
        .unwrap();

        server.shutdown();
    }

    #[test]
    fn test_permission_rules() {
        let sim = board();
        let own = Command::CreateBridge { source: CellId(0), target: CellId(2) };
        let theirs = Command::CreateBridge { source: CellId(1), target: CellId(2) };
        assert!(permits(&sim, Role::Player, own));
        assert!(!permits(&sim, Role::Player, theirs));
        assert!(permits(&sim, Role::Enemy, theirs));
        assert!(!permits(&sim, Role::Observer, Command::ToggleTurnBasedMode));
        assert!(permits(&sim, Role::Enemy, Command::ToggleTurnBasedMode));
        assert_eq!(Role::Player.opponent(), Some(Role::Enemy));
        assert_eq!(Role::Observer.opponent(), None);
    }
}
