use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ClientError;

/// Handshake constants.
pub const BT_PROTOCOL_STR: &str = "BitTorrent protocol";
pub const BT_PROTOCOL_LEN: u8 = 19;
pub const HANDSHAKE_LEN: usize = 68;

/// A peer-wire message. Frames are `length: u32 (big-endian, excluding
/// itself), id: u8, payload`; a zero length is a keep-alive with no id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { index: u32 },
    Bitfield(Bitfield),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::KeepAlive => "keep-alive",
            Message::Choke => "choke",
            Message::Unchoke => "unchoke",
            Message::Interested => "interested",
            Message::NotInterested => "not-interested",
            Message::Have { .. } => "have",
            Message::Bitfield(_) => "bitfield",
            Message::Request { .. } => "request",
            Message::Piece { .. } => "piece",
        }
    }

    /// Serializes the message into a complete wire frame.
    pub fn to_frame(&self) -> Vec<u8> {
        let (id, payload): (u8, Vec<u8>) = match self {
            Message::KeepAlive => return vec![0, 0, 0, 0],
            Message::Choke => (0, Vec::new()),
            Message::Unchoke => (1, Vec::new()),
            Message::Interested => (2, Vec::new()),
            Message::NotInterested => (3, Vec::new()),
            Message::Have { index } => (4, index.to_be_bytes().to_vec()),
            Message::Bitfield(bitfield) => (5, bitfield.0.clone()),
            Message::Request {
                index,
                begin,
                length,
            } => {
                let mut payload = Vec::with_capacity(12);
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(&length.to_be_bytes());
                (6, payload)
            }
            Message::Piece {
                index,
                begin,
                block,
            } => {
                let mut payload = Vec::with_capacity(8 + block.len());
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(block);
                (7, payload)
            }
        };

        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.extend_from_slice(&((payload.len() + 1) as u32).to_be_bytes());
        frame.push(id);
        frame.extend_from_slice(&payload);
        frame
    }
}

/// The packed piece bitmap from a bitfield message: bit `k` of byte `k / 8`,
/// most significant bit first, marks piece `k` as available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    pub fn new(bytes: Vec<u8>) -> Self {
        Bitfield(bytes)
    }

    pub fn has_piece(&self, index: u32) -> bool {
        let byte = (index / 8) as usize;
        let mask = 0x80u8 >> (index % 8);
        self.0.get(byte).map_or(false, |b| b & mask != 0)
    }
}

/// Writes one message frame. Any socket error or short write is `PeerIO`.
pub async fn send_message<S>(stream: &mut S, message: &Message) -> Result<(), ClientError>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&message.to_frame())
        .await
        .map_err(ClientError::PeerIo)?;
    stream.flush().await.map_err(ClientError::PeerIo)?;
    Ok(())
}

/// Reads one message frame; `read_exact` loops over short reads.
pub async fn read_message<S>(stream: &mut S) -> Result<Message, ClientError>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(ClientError::PeerIo)?;
    let length = u32::from_be_bytes(len_buf) as usize;

    if length == 0 {
        return Ok(Message::KeepAlive);
    }

    let mut msg_buf = vec![0u8; length];
    stream
        .read_exact(&mut msg_buf)
        .await
        .map_err(ClientError::PeerIo)?;

    let msg_id = msg_buf[0];
    let payload = &msg_buf[1..];
    match msg_id {
        0 => Ok(Message::Choke),
        1 => Ok(Message::Unchoke),
        2 => Ok(Message::Interested),
        3 => Ok(Message::NotInterested),
        4 => Ok(Message::Have {
            index: read_u32(payload, 0)?,
        }),
        5 => Ok(Message::Bitfield(Bitfield::new(payload.to_vec()))),
        6 => Ok(Message::Request {
            index: read_u32(payload, 0)?,
            begin: read_u32(payload, 4)?,
            length: read_u32(payload, 8)?,
        }),
        7 => {
            if payload.len() < 8 {
                return Err(ClientError::UnexpectedPeerMessage(format!(
                    "piece payload of {} bytes is too short",
                    payload.len()
                )));
            }
            Ok(Message::Piece {
                index: read_u32(payload, 0)?,
                begin: read_u32(payload, 4)?,
                block: payload[8..].to_vec(),
            })
        }
        id => Err(ClientError::UnexpectedPeerMessage(format!(
            "unknown message id {id}"
        ))),
    }
}

fn read_u32(payload: &[u8], offset: usize) -> Result<u32, ClientError> {
    let bytes: [u8; 4] = payload
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            ClientError::UnexpectedPeerMessage(format!(
                "payload truncated at offset {offset}"
            ))
        })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Sends the fixed 68-byte handshake.
pub async fn send_handshake<S>(
    stream: &mut S,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
) -> Result<(), ClientError>
where
    S: AsyncWrite + Unpin,
{
    let mut handshake = Vec::with_capacity(HANDSHAKE_LEN);
    handshake.push(BT_PROTOCOL_LEN);
    handshake.extend_from_slice(BT_PROTOCOL_STR.as_bytes());
    handshake.extend_from_slice(&[0u8; 8]); // reserved
    handshake.extend_from_slice(info_hash);
    handshake.extend_from_slice(peer_id);

    stream
        .write_all(&handshake)
        .await
        .map_err(|e| ClientError::HandshakeFailed(format!("send failed: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| ClientError::HandshakeFailed(format!("send failed: {e}")))?;
    Ok(())
}

/// Reads and validates the 68-byte handshake response. Returns the remote
/// peer's 20-byte id.
pub async fn receive_handshake<S>(
    stream: &mut S,
    expected_info_hash: &[u8; 20],
) -> Result<[u8; 20], ClientError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_LEN];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| ClientError::HandshakeFailed(format!("short read: {e}")))?;

    if buf[0] != BT_PROTOCOL_LEN {
        return Err(ClientError::HandshakeFailed(format!(
            "protocol string length {} instead of {BT_PROTOCOL_LEN}",
            buf[0]
        )));
    }
    let pstr_end = 1 + BT_PROTOCOL_LEN as usize;
    if &buf[1..pstr_end] != BT_PROTOCOL_STR.as_bytes() {
        return Err(ClientError::HandshakeFailed(
            "wrong protocol string".to_string(),
        ));
    }

    let info_hash_start = pstr_end + 8;
    let info_hash_end = info_hash_start + 20;
    if &buf[info_hash_start..info_hash_end] != expected_info_hash {
        return Err(ClientError::HandshakeFailed("info hash mismatch".to_string()));
    }

    let mut peer_id = [0u8; 20];
    peer_id.copy_from_slice(&buf[info_hash_end..]);
    Ok(peer_id)
}
