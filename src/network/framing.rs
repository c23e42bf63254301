//! Wire Framing
//!
//! Frame = 4-byte big-endian payload length, then the payload. The payload
//! is a JSON `PeerMessage` with every byte XOR-ed against a one-byte key.
//! The mask keeps casual sniffers from reading the stream; it is not
//! encryption.

use std::io::{self, Read, Write};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::network::protocol::PeerMessage;

/// Largest payload accepted in either direction.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default XOR key.
pub const DEFAULT_KEY: u8 = b'X';

/// Network errors.
#[derive(Debug, Error)]
pub enum NetError {
    /// Socket failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Payload was not a valid message.
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    /// Length prefix above `MAX_FRAME_SIZE`.
    #[error("frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    /// Connect or handshake took too long.
    #[error("timed out")]
    Timeout,

    /// The relay answered the handshake with something unexpected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Host or port rejected before connecting.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The link is closed.
    #[error("not connected")]
    Disconnected,
}

impl NetError {
    /// The socket hit its read or connect timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            NetError::Timeout => true,
            NetError::Io(e) => matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock),
            _ => false,
        }
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// XOR every byte with `key`. Applying it twice restores the input.
pub fn mask(data: &mut [u8], key: u8) {
    for byte in data.iter_mut() {
        *byte ^= key;
    }
}

/// Serialize and mask a message.
pub fn encode(msg: &PeerMessage, key: u8) -> Result<Vec<u8>, NetError> {
    let mut payload = serde_json::to_vec(msg)?;
    mask(&mut payload, key);
    Ok(payload)
}

/// Unmask and parse a payload.
pub fn decode(payload: &[u8], key: u8) -> Result<PeerMessage, NetError> {
    let mut plain = payload.to_vec();
    mask(&mut plain, key);
    Ok(serde_json::from_slice(&plain)?)
}

fn check_len(len: usize) -> Result<u32, NetError> {
    if len > MAX_FRAME_SIZE {
        return Err(NetError::FrameTooLarge(len));
    }
    Ok(len as u32)
}

// =============================================================================
// BLOCKING
// =============================================================================

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), NetError> {
    let len = check_len(payload.len())?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame. `UnexpectedEof` when the stream closes.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, NetError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    check_len(len)?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encode and write a message.
pub fn send_message<W: Write>(writer: &mut W, msg: &PeerMessage, key: u8) -> Result<(), NetError> {
    write_frame(writer, &encode(msg, key)?)
}

/// Read and decode a message.
pub fn recv_message<R: Read>(reader: &mut R, key: u8) -> Result<PeerMessage, NetError> {
    decode(&read_frame(reader)?, key)
}

// =============================================================================
// ASYNC
// =============================================================================

/// Async `write_frame`.
pub async fn write_frame_async<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), NetError> {
    let len = check_len(payload.len())?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Async `read_frame`.
pub async fn read_frame_async<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, NetError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    check_len(len)?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::network::protocol::Role;

    #[test]
    fn test_mask_is_reversible() {
        let mut data = b"{\"type\":\"DISCONNECT\"}".to_vec();
        mask(&mut data, DEFAULT_KEY);
        assert!(!data.starts_with(b"{"));
        mask(&mut data, DEFAULT_KEY);
        assert_eq!(data, b"{\"type\":\"DISCONNECT\"}");
    }

    #[test]
    fn test_frame_layout() {
        let msg = PeerMessage::Connect { role: Role::Player };
        let mut buf = Vec::new();
        send_message(&mut buf, &msg, DEFAULT_KEY).unwrap();

        let json = msg.to_json().unwrap();
        assert_eq!(&buf[..4], &(json.len() as u32).to_be_bytes());
        assert_eq!(buf[4], b'{' ^ DEFAULT_KEY);

        let mut cursor = Cursor::new(buf);
        assert_eq!(recv_message(&mut cursor, DEFAULT_KEY).unwrap(), msg);
    }

    #[test]
    fn test_sequence_of_frames() {
        let msgs = [
            PeerMessage::Connect { role: Role::Enemy },
            PeerMessage::ConnectAck { role: Role::Enemy },
            PeerMessage::Disconnect,
        ];
        let mut buf = Vec::new();
        for msg in &msgs {
            send_message(&mut buf, msg, 7).unwrap();
        }
        let mut cursor = Cursor::new(buf);
        for msg in &msgs {
            assert_eq!(&recv_message(&mut cursor, 7).unwrap(), msg);
        }
        assert!(matches!(
            recv_message(&mut cursor, 7),
            Err(NetError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn test_wrong_key_fails_to_decode() {
        let payload = encode(&PeerMessage::Disconnect, b'X').unwrap();
        assert!(matches!(decode(&payload, b'Y'), Err(NetError::Json(_))));
    }

    #[test]
    fn test_rejects_oversized_frames() {
        let big = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(write_frame(&mut Vec::new(), &big), Err(NetError::FrameTooLarge(_))));

        let prefix = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        let mut cursor = Cursor::new(prefix.to_vec());
        assert!(matches!(read_frame(&mut cursor), Err(NetError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn test_async_frames_match_blocking() {
        let payload = encode(&PeerMessage::Connect { role: Role::Observer }, DEFAULT_KEY).unwrap();
        let mut async_buf = Vec::new();
        write_frame_async(&mut async_buf, &payload).await.unwrap();
        let mut sync_buf = Vec::new();
        write_frame(&mut sync_buf, &payload).unwrap();
        assert_eq!(async_buf, sync_buf);

        let mut reader = &async_buf[..];
        assert_eq!(read_frame_async(&mut reader).await.unwrap(), payload);
    }
}
