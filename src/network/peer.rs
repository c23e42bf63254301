//! Peer Link
//!
//! Blocking client side of the relay, usable from the simulation thread:
//!
//! - `connect()` does the TCP connect and the `CONNECT`/`CONNECT_ACK`
//!   handshake on the calling thread, both under the configured timeout.
//! - A background reader thread decodes frames into a bounded channel.
//! - `poll()` drains that channel without blocking; `send()` writes on the
//!   calling thread.

use std::io::{BufReader, BufWriter};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::network::framing::{decode, read_frame, recv_message, send_message, NetError, DEFAULT_KEY};
use crate::network::protocol::{PeerMessage, Role};

/// Lowest port a peer may use.
pub const MIN_PORT: u16 = 1024;

/// Peer link configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Relay host: dotted-quad IPv4 or `localhost`.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Limit for the TCP connect and for the handshake reply.
    pub connect_timeout: Duration,
    /// Inbound messages buffered before the reader thread blocks.
    pub queue_capacity: usize,
    /// Payload XOR key.
    pub key: u8,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            connect_timeout: Duration::from_secs(3),
            queue_capacity: 256,
            key: DEFAULT_KEY,
        }
    }
}

/// Check a host and port typed by a user and resolve them.
pub fn validate_address(host: &str, port: u16) -> Result<SocketAddr, NetError> {
    if port < MIN_PORT {
        return Err(NetError::InvalidAddress(format!("port {} is below {}", port, MIN_PORT)));
    }
    let ip = if host.eq_ignore_ascii_case("localhost") {
        Ipv4Addr::LOCALHOST
    } else {
        host.parse::<Ipv4Addr>()
            .map_err(|_| NetError::InvalidAddress(format!("'{}' is not an IPv4 address", host)))?
    };
    Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

/// A live connection to the relay.
pub struct PeerLink {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<PeerMessage>,
    connected: Arc<AtomicBool>,
    role: Role,
    key: u8,
    _reader_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("role", &self.role)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl PeerLink {
    /// Connect, request `role` and wait for the relay's answer.
    pub fn connect(config: &PeerConfig, role: Role) -> Result<Self, NetError> {
        let addr = validate_address(&config.host, config.port)?;
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout).map_err(timeout_or_io)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(config.connect_timeout))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        send_message(&mut writer, &PeerMessage::Connect { role }, config.key)?;
        let granted = match recv_message(&mut reader, config.key) {
            Ok(PeerMessage::ConnectAck { role }) => role,
            Ok(other) => return Err(NetError::Handshake(format!("unexpected {}", other.kind()))),
            Err(e) if e.is_timeout() => return Err(NetError::Timeout),
            Err(e) => return Err(e),
        };
        reader.get_ref().set_read_timeout(None)?;
        info!(%addr, requested = ?role, granted = ?granted, "Connected to relay");

        let connected = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::sync_channel(config.queue_capacity.max(1));
        let flag = connected.clone();
        let key = config.key;
        let reader_thread = thread::Builder::new()
            .name("peer-reader".to_string())
            .spawn(move || reader_loop(reader, tx, flag, key))?;

        Ok(Self {
            writer,
            inbox: rx,
            connected,
            role: granted,
            key: config.key,
            _reader_thread: Some(reader_thread),
        })
    }

    /// Role granted by the relay.
    pub fn role(&self) -> Role {
        self.role
    }

    /// False once the relay closed the stream or a send failed. Messages
    /// received before that are still returned by `poll`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send a message.
    pub fn send(&mut self, msg: &PeerMessage) -> Result<(), NetError> {
        if !self.is_connected() {
            return Err(NetError::Disconnected);
        }
        send_message(&mut self.writer, msg, self.key).map_err(|e| {
            self.connected.store(false, Ordering::Release);
            e
        })
    }

    /// Drain every queued inbound message (non-blocking).
    pub fn poll(&self) -> Vec<PeerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Say goodbye and close the socket. Idempotent.
    pub fn disconnect(&mut self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            let _ = send_message(&mut self.writer, &PeerMessage::Disconnect, self.key);
            info!("Disconnected from relay");
        }
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn timeout_or_io(e: std::io::Error) -> NetError {
    let err = NetError::Io(e);
    if err.is_timeout() {
        NetError::Timeout
    } else {
        err
    }
}

/// Reader thread: decode frames until EOF, `DISCONNECT` or a dropped inbox.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: SyncSender<PeerMessage>, connected: Arc<AtomicBool>, key: u8) {
    while let Ok(payload) = read_frame(&mut reader) {
        let msg = match decode(&payload, key) {
            Ok(m) => m,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                continue;
            }
        };
        if msg == PeerMessage::Disconnect {
            debug!("Relay said goodbye");
            break;
        }
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                debug!("Inbound queue full, waiting");
                if tx.send(msg).is_err() {
                    break;
                }
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    connected.store(false, Ordering::Release);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use crate::network::framing::write_frame;
    use crate::network::framing::encode;

    #[test]
    fn test_validate_address() {
        assert_eq!(validate_address("127.0.0.1", 5555).unwrap(), "127.0.0.1:5555".parse().unwrap());
        assert_eq!(validate_address("localhost", 65535).unwrap(), "127.0.0.1:65535".parse().unwrap());
        assert_eq!(validate_address("LOCALHOST", 1024).unwrap(), "127.0.0.1:1024".parse().unwrap());
        assert!(matches!(validate_address("127.0.0.1", 80), Err(NetError::InvalidAddress(_))));
        assert!(matches!(validate_address("256.1.1.1", 5555), Err(NetError::InvalidAddress(_))));
        assert!(matches!(validate_address("example.com", 5555), Err(NetError::InvalidAddress(_))));
        assert!(matches!(validate_address("::1", 5555), Err(NetError::InvalidAddress(_))));
    }

    #[test]
    fn test_default_config() {
        let config = PeerConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.queue_capacity, 256);
    }

    /// A fake relay that acks, sends `extra`, then holds the socket until
    /// the client hangs up.
    fn fake_relay(extra: Vec<PeerMessage>) -> (u16, thread::JoinHandle<Vec<PeerMessage>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut received = Vec::new();
            match recv_message(&mut reader, DEFAULT_KEY).unwrap() {
                PeerMessage::Connect { role } => {
                    send_message(&mut writer, &PeerMessage::ConnectAck { role }, DEFAULT_KEY).unwrap();
                }
                other => panic!("expected CONNECT, got {:?}", other),
            }
            for msg in &extra {
                send_message(&mut writer, msg, DEFAULT_KEY).unwrap();
            }
            while let Ok(msg) = recv_message(&mut reader, DEFAULT_KEY) {
                let done = msg == PeerMessage::Disconnect;
                received.push(msg);
                if done {
                    break;
                }
            }
            received
        });
        (port, handle)
    }

    fn config(port: u16) -> PeerConfig {
        PeerConfig {
            port,
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    fn poll_until(link: &PeerLink, n: usize) -> Vec<PeerMessage> {
        let mut got = Vec::new();
        for _ in 0..100 {
            got.extend(link.poll());
            if got.len() >= n {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        got
    }

    #[test]
    fn test_handshake_poll_and_send() {
        let ack = PeerMessage::ConnectAck { role: Role::Observer };
        let (port, relay) = fake_relay(vec![ack.clone()]);
        let mut link = PeerLink::connect(&config(port), Role::Enemy).unwrap();
        assert_eq!(link.role(), Role::Enemy);
        assert!(link.is_connected());

        assert_eq!(poll_until(&link, 1), vec![ack]);

        link.send(&PeerMessage::Connect { role: Role::Player }).unwrap();
        link.disconnect();
        assert!(!link.is_connected());
        assert!(matches!(link.send(&PeerMessage::Disconnect), Err(NetError::Disconnected)));

        let received = relay.join().unwrap();
        assert_eq!(received, vec![PeerMessage::Connect { role: Role::Player }, PeerMessage::Disconnect]);
    }

    #[test]
    fn test_relay_goodbye_marks_disconnected() {
        let (port, relay) = fake_relay(vec![PeerMessage::Disconnect]);
        let link = PeerLink::connect(&config(port), Role::Player).unwrap();
        for _ in 0..100 {
            if !link.is_connected() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!link.is_connected());
        drop(link);
        relay.join().unwrap();
    }

    #[test]
    fn test_connection_refused() {
        // Bind then drop to find a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        assert!(PeerLink::connect(&config(port), Role::Player).is_err());
    }

    #[test]
    fn test_silent_relay_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let holder = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(800));
            drop(stream);
        });
        let result = PeerLink::connect(&config(port), Role::Player);
        assert!(matches!(result, Err(NetError::Timeout)));
        holder.join().unwrap();
    }

    #[test]
    fn test_unexpected_handshake_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let payload = encode(&PeerMessage::Disconnect, DEFAULT_KEY).unwrap();
            write_frame(&mut stream, &payload).unwrap();
            thread::sleep(Duration::from_millis(100));
        });
        let result = PeerLink::connect(&config(port), Role::Player);
        assert!(matches!(result, Err(NetError::Handshake(_))));
        server.join().unwrap();
    }
}
