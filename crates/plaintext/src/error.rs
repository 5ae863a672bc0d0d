use std::io;

use libp2p_identity::PeerId;
use thiserror::Error;

use crate::exchange::EnvelopeError;
use crate::frame::FrameError;

/// Terminal failure of a plaintext handshake.
///
/// Every variant ends the connection attempt: the upgrade future resolves with
/// it exactly once and the transport is closed. Nothing here is retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("invalid handshake frame: {0}")]
    InvalidFrame(#[from] FrameError),

    /// Neither the bare key record nor the exchange envelope could be parsed.
    #[error("malformed identity payload: {0}")]
    MalformedIdentity(#[source] EnvelopeError),

    /// The remote claimed an id that is not derived from its public key.
    #[error("remote peer id {claimed} is not derived from its public key ({derived})")]
    IdentityMismatch { claimed: String, derived: PeerId },

    #[error("expected remote peer {expected}, got {actual}")]
    UnexpectedPeer { expected: PeerId, actual: PeerId },

    #[error("connection closed before the handshake completed")]
    ConnectionClosed,

    /// Input was fed to a handshake that had already failed.
    #[error("handshake already failed")]
    HandshakeFailed,

    /// The local public key cannot be expressed in the configured encoding.
    #[error("failed to encode local identity: {0}")]
    LocalIdentity(#[source] EnvelopeError),

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            _ => Self::Io(err),
        }
    }
}

/// Non-fatal conditions surfaced alongside a successful handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SecurityWarning {
    /// No expected peer was pinned, so any self-consistent identity was accepted.
    SkippedPeerValidation,
}
