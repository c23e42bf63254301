//! Relay Server
//!
//! Async TCP relay between game processes. Each client opens with `CONNECT`
//! and gets a `CONNECT_ACK` carrying its granted role; every later
//! `GAME_EVENT` is forwarded verbatim to all other handshaken clients.
//! The relay never runs a simulation of its own.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::network::framing::{decode, encode, read_frame_async, write_frame_async, DEFAULT_KEY};
use crate::network::protocol::{PeerMessage, Role};

/// Outbound frames buffered per client.
const OUTBOUND_QUEUE: usize = 256;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_clients: usize,
    /// Payload XOR key.
    pub key: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5555)),
            max_clients: 8,
            key: DEFAULT_KEY,
        }
    }
}

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Admin view of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Remote address.
    pub addr: SocketAddr,
    /// Granted role; `None` until `CONNECT` arrives.
    pub role: Option<Role>,
    /// Time since the socket was accepted.
    pub connected_for: Duration,
}

/// Connected client state.
struct ConnectedClient {
    role: Option<Role>,
    connected_at: Instant,
    /// Masked payloads waiting for this client's writer task.
    sender: mpsc::Sender<Vec<u8>>,
    kicked: Arc<Notify>,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The relay server.
pub struct RelayServer {
    config: RelayConfig,
    clients: ClientMap,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a relay server.
    pub fn new(config: RelayConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until `shutdown`.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until `shutdown`.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        info!("Relay listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_clients {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr).await;
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Register a client and spawn its reader and writer tasks.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", addr, e);
        }
        let (mut reader, mut writer) = stream.into_split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE);
        let kicked = Arc::new(Notify::new());

        self.clients.write().await.insert(addr, ConnectedClient {
            role: None,
            connected_at: Instant::now(),
            sender: msg_tx.clone(),
            kicked: kicked.clone(),
        });

        let clients = self.clients.clone();
        let key = self.config.key;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let writer_task = tokio::spawn(async move {
                while let Some(payload) = msg_rx.recv().await {
                    if write_frame_async(&mut writer, &payload).await.is_err() {
                        break;
                    }
                }
            });

            let mut say_goodbye = false;
            loop {
                tokio::select! {
                    frame = read_frame_async(&mut reader) => {
                        let payload = match frame {
                            Ok(p) => p,
                            Err(e) => {
                                debug!("Client {} closed: {}", addr, e);
                                break;
                            }
                        };
                        let msg = match decode(&payload, key) {
                            Ok(m) => m,
                            Err(e) => {
                                warn!("Dropping malformed frame from {}: {}", addr, e);
                                continue;
                            }
                        };
                        match msg {
                            PeerMessage::Connect { role } => {
                                let granted = Self::grant_role(&clients, addr, role).await;
                                info!(%addr, requested = ?role, granted = ?granted, "Role assigned");
                                match encode(&PeerMessage::ConnectAck { role: granted }, key) {
                                    Ok(ack) => {
                                        let _ = msg_tx.send(ack).await;
                                    }
                                    Err(e) => error!("Failed to encode ack: {}", e),
                                }
                            }
                            PeerMessage::GameEvent { .. } => {
                                let role = clients.read().await.get(&addr).and_then(|c| c.role);
                                if role.and_then(Role::faction).is_some() {
                                    Self::forward(&clients, addr, payload).await;
                                } else {
                                    warn!(?role, "Dropping GAME_EVENT from {} without a faction", addr);
                                }
                            }
                            PeerMessage::Disconnect => {
                                debug!("Client {} said goodbye", addr);
                                break;
                            }
                            PeerMessage::ConnectAck { .. } => {
                                debug!("Ignoring CONNECT_ACK from {}", addr);
                            }
                        }
                    }
                    _ = kicked.notified() => {
                        info!("Client {} kicked", addr);
                        say_goodbye = true;
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        say_goodbye = true;
                        break;
                    }
                }
            }

            if say_goodbye {
                if let Ok(bye) = encode(&PeerMessage::Disconnect, key) {
                    let _ = msg_tx.send(bye).await;
                }
            }

            // Dropping every sender lets the writer drain and close the socket.
            let role = clients.write().await.remove(&addr).and_then(|c| c.role);
            drop(msg_tx);
            let _ = writer_task.await;

            info!(?role, "Client {} cleaned up", addr);
        });
    }

    /// Grant `requested` if free, else a free faction role, else `OBSERVER`.
    async fn grant_role(clients: &ClientMap, addr: SocketAddr, requested: Role) -> Role {
        let mut clients = clients.write().await;
        let taken: Vec<Role> = clients
            .iter()
            .filter(|(a, _)| **a != addr)
            .filter_map(|(_, c)| c.role)
            .collect();
        let granted = assign_role(&taken, requested);
        if let Some(client) = clients.get_mut(&addr) {
            client.role = Some(granted);
        }
        granted
    }

    /// Queue `payload` for every handshaken client except `from`.
    async fn forward(clients: &ClientMap, from: SocketAddr, payload: Vec<u8>) {
        let targets: Vec<(SocketAddr, mpsc::Sender<Vec<u8>>)> = {
            let clients = clients.read().await;
            clients
                .iter()
                .filter(|(addr, c)| **addr != from && c.role.is_some())
                .map(|(addr, c)| (*addr, c.sender.clone()))
                .collect()
        };
        for (addr, sender) in targets {
            if sender.send(payload.clone()).await.is_err() {
                debug!("Client {} went away before forward", addr);
            }
        }
    }

    /// Disconnect one client. False if `addr` is not connected.
    pub async fn kick(&self, addr: SocketAddr) -> bool {
        match self.clients.read().await.get(&addr) {
            Some(client) => {
                client.kicked.notify_one();
                true
            }
            None => false,
        }
    }

    /// Connected clients, by address.
    pub async fn clients(&self) -> Vec<ClientInfo> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(addr, c)| ClientInfo {
                addr: *addr,
                role: c.role,
                connected_for: c.connected_at.elapsed(),
            })
            .collect()
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Shutdown the server and every client task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Role to grant when `taken` are already held.
pub fn assign_role(taken: &[Role], requested: Role) -> Role {
    if requested == Role::Observer {
        return Role::Observer;
    }
    if !taken.contains(&requested) {
        return requested;
    }
    [Role::Player, Role::Enemy]
        .into_iter()
        .find(|r| !taken.contains(r))
        .unwrap_or(Role::Observer)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::time::{sleep, timeout};
    use crate::game::bridge::BridgeDirection;
    use crate::game::cell::CellId;
    use crate::game::events::{GameEvent, GameEventData};

    struct TestClient {
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        local: SocketAddr,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr, role: Role) -> (Self, Role) {
            let stream = TcpStream::connect(addr).await.unwrap();
            let local = stream.local_addr().unwrap();
            let (reader, writer) = stream.into_split();
            let mut client = Self { reader, writer, local };
            client.send(&PeerMessage::Connect { role }).await;
            match client.recv().await {
                Some(PeerMessage::ConnectAck { role }) => (client, role),
                other => panic!("expected CONNECT_ACK, got {:?}", other),
            }
        }

        async fn send(&mut self, msg: &PeerMessage) {
            let payload = encode(msg, DEFAULT_KEY).unwrap();
            write_frame_async(&mut self.writer, &payload).await.unwrap();
        }

        /// Next message, or `None` on EOF or after 500 ms of silence.
        async fn recv(&mut self) -> Option<PeerMessage> {
            match timeout(Duration::from_millis(500), read_frame_async(&mut self.reader)).await {
                Ok(Ok(payload)) => Some(decode(&payload, DEFAULT_KEY).unwrap()),
                _ => None,
            }
        }
    }

    async fn start() -> (Arc<RelayServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(RelayServer::new(RelayConfig {
            bind_addr: addr,
            ..Default::default()
        }));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, addr)
    }

    async fn wait_for_count(server: &RelayServer, expected: usize) {
        for _ in 0..100 {
            if server.connection_count().await == expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("connection count never reached {}", expected);
    }

    fn bridge_event() -> PeerMessage {
        PeerMessage::GameEvent {
            event: GameEvent::new(3, 50, GameEventData::BridgeCreated {
                source_id: CellId(1),
                target_id: CellId(2),
                direction: BridgeDirection::OneWay,
                cost: 3,
            }),
        }
    }

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:5555".parse().unwrap());
        assert_eq!(config.key, b'X');
    }

    #[test]
    fn test_assign_role() {
        assert_eq!(assign_role(&[], Role::Enemy), Role::Enemy);
        assert_eq!(assign_role(&[Role::Player], Role::Player), Role::Enemy);
        assert_eq!(assign_role(&[Role::Enemy], Role::Enemy), Role::Player);
        assert_eq!(assign_role(&[Role::Player, Role::Enemy], Role::Player), Role::Observer);
        assert_eq!(assign_role(&[], Role::Observer), Role::Observer);
    }

    #[tokio::test]
    async fn test_roles_granted_in_order() {
        let (server, addr) = start().await;
        let (_a, role_a) = TestClient::connect(addr, Role::Player).await;
        let (_b, role_b) = TestClient::connect(addr, Role::Player).await;
        let (_c, role_c) = TestClient::connect(addr, Role::Enemy).await;
        assert_eq!((role_a, role_b, role_c), (Role::Player, Role::Enemy, Role::Observer));

        let mut roles: Vec<Role> = server.clients().await.iter().filter_map(|c| c.role).collect();
        roles.sort();
        assert_eq!(roles, vec![Role::Player, Role::Enemy, Role::Observer]);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_forwards_to_others_only() {
        let (server, addr) = start().await;
        let (mut a, _) = TestClient::connect(addr, Role::Player).await;
        let (mut b, _) = TestClient::connect(addr, Role::Enemy).await;
        let (mut c, _) = TestClient::connect(addr, Role::Observer).await;

        a.send(&bridge_event()).await;
        assert_eq!(b.recv().await, Some(bridge_event()));
        assert_eq!(c.recv().await, Some(bridge_event()));
        assert_eq!(a.recv().await, None);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_observer_events_are_dropped() {
        let (server, addr) = start().await;
        let (mut a, _) = TestClient::connect(addr, Role::Player).await;
        let (mut b, _) = TestClient::connect(addr, Role::Enemy).await;
        let (mut c, role) = TestClient::connect(addr, Role::Observer).await;
        assert_eq!(role, Role::Observer);

        c.send(&bridge_event()).await;
        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, None);

        // Still connected and still receiving.
        b.send(&bridge_event()).await;
        assert_eq!(c.recv().await, Some(bridge_event()));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_frees_role() {
        let (server, addr) = start().await;
        let (mut a, _) = TestClient::connect(addr, Role::Player).await;
        let (_b, _) = TestClient::connect(addr, Role::Enemy).await;

        a.send(&PeerMessage::Disconnect).await;
        wait_for_count(&server, 1).await;

        let (_c, role) = TestClient::connect(addr, Role::Player).await;
        assert_eq!(role, Role::Player);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_kick() {
        let (server, addr) = start().await;
        let (mut a, _) = TestClient::connect(addr, Role::Player).await;

        assert!(server.kick(a.local).await);
        assert_eq!(a.recv().await, Some(PeerMessage::Disconnect));
        assert_eq!(a.recv().await, None);
        wait_for_count(&server, 0).await;
        assert!(!server.kick(a.local).await);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (server, addr) = start().await;
        let (mut a, _) = TestClient::connect(addr, Role::Player).await;
        let (mut b, _) = TestClient::connect(addr, Role::Enemy).await;

        write_frame_async(&mut a.writer, b"not json at all").await.unwrap();
        a.send(&bridge_event()).await;
        assert_eq!(b.recv().await, Some(bridge_event()));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_says_goodbye() {
        let (server, addr) = start().await;
        let (mut a, _) = TestClient::connect(addr, Role::Player).await;

        server.shutdown();
        assert_eq!(a.recv().await, Some(PeerMessage::Disconnect));
        wait_for_count(&server, 0).await;
    }
}
