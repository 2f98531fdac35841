use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ClientError;
use crate::message::Message;
use crate::peer::PeerSession;
use crate::torrent::{sha1_digest, TorrentInfo};

/// Blocks are the request/response unit on the wire.
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// How many block requests may be outstanding at once.
const PIPELINE_DEPTH: usize = 4;

/// Downloads and verifies one piece over a ready session.
///
/// Requests are pipelined up to `PIPELINE_DEPTH`; responses are placed by
/// their `begin` offset, so arrival order does not matter. The assembled
/// piece is checked against its SHA-1 digest before being returned; the
/// caller owns writing it out.
pub async fn download_piece<S>(
    session: &mut PeerSession<S>,
    info: &TorrentInfo,
    index: u32,
) -> Result<Vec<u8>, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let piece_len = info.piece_len(index) as u32;
    if !session.has_piece(index) {
        warn!("peer did not advertise piece {index}, requesting anyway");
    }

    let block_count = ((piece_len + BLOCK_SIZE - 1) / BLOCK_SIZE) as usize;
    let mut piece = vec![0u8; piece_len as usize];
    let mut received = vec![false; block_count];
    let mut received_count = 0usize;
    let mut next_offset = 0u32;
    let mut in_flight = 0usize;

    while received_count < block_count {
        while in_flight < PIPELINE_DEPTH && next_offset < piece_len {
            let length = BLOCK_SIZE.min(piece_len - next_offset);
            session
                .send(&Message::Request {
                    index,
                    begin: next_offset,
                    length,
                })
                .await?;
            next_offset += length;
            in_flight += 1;
        }

        match session.recv().await? {
            Message::KeepAlive => continue,
            Message::Piece {
                index: got_index,
                begin,
                block,
            } => {
                if got_index != index {
                    return Err(ClientError::UnexpectedPeerMessage(format!(
                        "piece {got_index} delivered while downloading piece {index}"
                    )));
                }
                if begin % BLOCK_SIZE != 0 || begin >= piece_len {
                    return Err(ClientError::UnexpectedPeerMessage(format!(
                        "block offset {begin} outside piece of {piece_len} bytes"
                    )));
                }
                let expected_len = BLOCK_SIZE.min(piece_len - begin) as usize;
                if block.len() != expected_len {
                    return Err(ClientError::UnexpectedPeerMessage(format!(
                        "block at offset {begin} has {} bytes, expected {expected_len}",
                        block.len()
                    )));
                }
                let slot = (begin / BLOCK_SIZE) as usize;
                if received[slot] {
                    return Err(ClientError::UnexpectedPeerMessage(format!(
                        "block at offset {begin} delivered twice"
                    )));
                }

                piece[begin as usize..begin as usize + expected_len].copy_from_slice(&block);
                received[slot] = true;
                received_count += 1;
                in_flight -= 1;
            }
            other => {
                return Err(ClientError::UnexpectedPeerMessage(format!(
                    "expected piece, got {}",
                    other.name()
                )))
            }
        }
    }

    if &sha1_digest(&piece) != info.piece_hash(index) {
        return Err(ClientError::PieceHashMismatch { index });
    }
    debug!("piece {index} verified ({piece_len} bytes)");
    Ok(piece)
}
