use thiserror::Error;

use crate::bencode::BencodeError;

/// Everything that can go wrong between the command line and a finished
/// download. Peer and file IO both originate as `std::io::Error`, so they
/// are mapped explicitly at each call site instead of via `From`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("malformed bencode: {0}")]
    MalformedBencode(#[from] BencodeError),

    #[error("invalid metainfo: {0}")]
    InvalidMetainfo(String),

    #[error("tracker failure: {0}")]
    TrackerFailure(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("peer i/o: {0}")]
    PeerIo(std::io::Error),

    #[error("unexpected peer message: {0}")]
    UnexpectedPeerMessage(String),

    #[error("piece {index} failed hash verification")]
    PieceHashMismatch { index: u32 },

    #[error("file i/o: {0}")]
    FileIo(std::io::Error),

    #[error("{0}")]
    Usage(String),
}

impl ClientError {
    /// Failures the orchestrator answers with a re-enqueue instead of an
    /// abort. Everything else propagates to the top-level handler.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::PeerIo(_)
                | ClientError::UnexpectedPeerMessage(_)
                | ClientError::PieceHashMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        assert!(ClientError::PeerIo(io).is_retryable());
        assert!(ClientError::PieceHashMismatch { index: 3 }.is_retryable());
        assert!(ClientError::UnexpectedPeerMessage("choke".into()).is_retryable());
    }

    #[test]
    fn non_retryable_kinds() {
        assert!(!ClientError::TrackerFailure("torrent not registered".into()).is_retryable());
        assert!(!ClientError::InvalidMetainfo("missing 'announce'".into()).is_retryable());
        assert!(!ClientError::Usage("expected -o option".into()).is_retryable());
    }
}
