use std::io::{Error as IoError, ErrorKind};
use std::net::SocketAddrV4;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ClientError;
use crate::message::{
    read_message, receive_handshake, send_handshake, send_message, Bitfield, Message,
};

/// One peer connection, from completed handshake until drop or error. Any
/// error invalidates the session; callers reconnect rather than resume.
///
/// Generic over the stream so the protocol sequence can be driven over an
/// in-memory pipe in tests.
pub struct PeerSession<S> {
    stream: S,
    pub remote_peer_id: [u8; 20],
    bitfield: Option<Bitfield>,
    read_timeout: Duration,
}

impl PeerSession<TcpStream> {
    /// Opens a TCP connection and performs the 68-byte handshake exchange.
    pub async fn connect(
        addr: SocketAddrV4,
        info_hash: &[u8; 20],
        peer_id: &[u8; 20],
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ClientError::PeerIo(IoError::new(ErrorKind::TimedOut, "connect timed out"))
            })?
            .map_err(ClientError::PeerIo)?;
        Self::handshake(stream, info_hash, peer_id, read_timeout).await
    }
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the handshake over an already-open stream.
    pub async fn handshake(
        mut stream: S,
        info_hash: &[u8; 20],
        peer_id: &[u8; 20],
        read_timeout: Duration,
    ) -> Result<Self, ClientError> {
        send_handshake(&mut stream, info_hash, peer_id).await?;
        let remote_peer_id = match timeout(read_timeout, receive_handshake(&mut stream, info_hash))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::HandshakeFailed(
                    "timed out waiting for handshake response".to_string(),
                ))
            }
        };
        debug!("handshake complete, remote peer id {}", hex::encode(remote_peer_id));

        Ok(PeerSession {
            stream,
            remote_peer_id,
            bitfield: None,
            read_timeout,
        })
    }

    /// Drives the session to the ready state: receive the bitfield, declare
    /// interest, wait for unchoke.
    ///
    /// The first real message after the handshake must be a bitfield.
    /// While waiting for the unchoke, keep-alives, chokes and haves are
    /// ignored; anything else is a protocol violation.
    pub async fn prepare(&mut self) -> Result<(), ClientError> {
        loop {
            match self.recv().await? {
                Message::KeepAlive => continue,
                Message::Bitfield(bitfield) => {
                    self.bitfield = Some(bitfield);
                    break;
                }
                other => {
                    return Err(ClientError::UnexpectedPeerMessage(format!(
                        "expected bitfield, got {}",
                        other.name()
                    )))
                }
            }
        }

        self.send(&Message::Interested).await?;

        loop {
            match self.recv().await? {
                Message::Unchoke => break,
                Message::KeepAlive | Message::Choke | Message::Have { .. } => continue,
                other => {
                    return Err(ClientError::UnexpectedPeerMessage(format!(
                        "expected unchoke, got {}",
                        other.name()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Reads one message, bounded by the configured read timeout.
    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        match timeout(self.read_timeout, read_message(&mut self.stream)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::PeerIo(IoError::new(
                ErrorKind::TimedOut,
                "peer read timed out",
            ))),
        }
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        send_message(&mut self.stream, message).await
    }

    /// Whether the peer advertised piece `index` in its bitfield.
    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.as_ref().map_or(false, |b| b.has_piece(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BT_PROTOCOL_LEN, BT_PROTOCOL_STR, HANDSHAKE_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    const INFO_HASH: [u8; 20] = [7u8; 20];
    const LOCAL_ID: [u8; 20] = [1u8; 20];
    const REMOTE_ID: [u8; 20] = [2u8; 20];

    async fn answer_handshake(server: &mut DuplexStream) {
        let mut buf = [0u8; HANDSHAKE_LEN];
        server.read_exact(&mut buf).await.unwrap();

        let mut reply = Vec::with_capacity(HANDSHAKE_LEN);
        reply.push(BT_PROTOCOL_LEN);
        reply.extend_from_slice(BT_PROTOCOL_STR.as_bytes());
        reply.extend_from_slice(&[0u8; 8]);
        reply.extend_from_slice(&INFO_HASH);
        reply.extend_from_slice(&REMOTE_ID);
        server.write_all(&reply).await.unwrap();
    }

    #[tokio::test]
    async fn prepare_reaches_ready() {
        let (client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            answer_handshake(&mut server).await;
            // bitfield, then wait for interested, then unchoke
            send_message(&mut server, &Message::Bitfield(Bitfield::new(vec![0xff])))
                .await
                .unwrap();
            let interested = read_message(&mut server).await.unwrap();
            assert_eq!(interested, Message::Interested);
            send_message(&mut server, &Message::Unchoke).await.unwrap();
        });

        let mut session =
            PeerSession::handshake(client, &INFO_HASH, &LOCAL_ID, Duration::from_secs(5))
                .await
                .unwrap();
        assert_eq!(session.remote_peer_id, REMOTE_ID);
        session.prepare().await.unwrap();
        assert!(session.has_piece(0));

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn keep_alive_choke_and_have_are_tolerated() {
        let (client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            answer_handshake(&mut server).await;
            send_message(&mut server, &Message::KeepAlive).await.unwrap();
            send_message(&mut server, &Message::Bitfield(Bitfield::new(vec![0x80])))
                .await
                .unwrap();
            let _ = read_message(&mut server).await.unwrap();
            send_message(&mut server, &Message::KeepAlive).await.unwrap();
            send_message(&mut server, &Message::Choke).await.unwrap();
            send_message(&mut server, &Message::Have { index: 0 }).await.unwrap();
            send_message(&mut server, &Message::Unchoke).await.unwrap();
        });

        let mut session =
            PeerSession::handshake(client, &INFO_HASH, &LOCAL_ID, Duration::from_secs(5))
                .await
                .unwrap();
        session.prepare().await.unwrap();

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn non_bitfield_first_message_fails() {
        let (client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            answer_handshake(&mut server).await;
            send_message(&mut server, &Message::Unchoke).await.unwrap();
        });

        let mut session =
            PeerSession::handshake(client, &INFO_HASH, &LOCAL_ID, Duration::from_secs(5))
                .await
                .unwrap();
        let result = session.prepare().await;
        assert!(matches!(result, Err(ClientError::UnexpectedPeerMessage(_))));

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn unexpected_message_while_awaiting_unchoke_fails() {
        let (client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            answer_handshake(&mut server).await;
            send_message(&mut server, &Message::Bitfield(Bitfield::new(vec![0x80])))
                .await
                .unwrap();
            let _ = read_message(&mut server).await.unwrap();
            send_message(
                &mut server,
                &Message::Piece {
                    index: 0,
                    begin: 0,
                    block: vec![0u8; 4],
                },
            )
            .await
            .unwrap();
        });

        let mut session =
            PeerSession::handshake(client, &INFO_HASH, &LOCAL_ID, Duration::from_secs(5))
                .await
                .unwrap();
        let result = session.prepare().await;
        assert!(matches!(result, Err(ClientError::UnexpectedPeerMessage(_))));

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn silent_peer_times_out_as_peer_io() {
        let (client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            answer_handshake(&mut server).await;
            // hold the stream open without sending anything
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(server);
        });

        let mut session =
            PeerSession::handshake(client, &INFO_HASH, &LOCAL_ID, Duration::from_millis(50))
                .await
                .unwrap();
        let result = session.recv().await;
        match result {
            Err(ClientError::PeerIo(e)) => assert_eq!(e.kind(), ErrorKind::TimedOut),
            other => panic!("expected timeout, got {other:?}"),
        }

        server_task.await.unwrap();
    }
}
