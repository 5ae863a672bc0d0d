//! Sans-IO state machine for one plaintext handshake.
//!
//! The engine never touches a socket. The caller sends [`Handshake::hello`]
//! as soon as the connection is up, then feeds every inbound chunk to
//! [`Handshake::on_inbound`] until it reports [`Progress::Verified`] or an
//! error. Relay installation is left to the caller, which receives the
//! leftover bytes as part of the verified outcome.

use core::mem;

use bytes::{Bytes, BytesMut};
use libp2p_identity::{PeerId, PublicKey};
use tracing::{debug, error, trace, warn};

use crate::config::Config;
use crate::error::{ProtocolError, SecurityWarning};
use crate::exchange::{decode_identity_payload, encode_identity_payload};
use crate::frame::{decode_frame, encode_frame, FrameDecode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingPeer,
    Verified,
    /// Terminal: an inbound message was rejected.
    Failed,
}

/// Identity of the remote, established by the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub peer_id: PeerId,
    pub public_key: PublicKey,
}

/// Successful outcome of the exchange.
#[derive(Debug)]
pub struct Verified {
    pub remote: RemoteIdentity,
    pub warning: Option<SecurityWarning>,
    /// Bytes received after the identity frame, not yet seen by anyone.
    pub leftover: Bytes,
}

#[derive(Debug)]
pub enum Progress {
    /// The frame is not complete yet.
    Pending,
    Verified(Verified),
    /// Data arriving after verification, returned untouched.
    Forward(Bytes),
}

#[derive(Debug)]
pub struct Handshake {
    config: Config,
    state: HandshakeState,
    buffer: BytesMut,
    remote: Option<PeerId>,
}

impl Handshake {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: HandshakeState::AwaitingPeer,
            buffer: BytesMut::new(),
            remote: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    #[must_use]
    pub const fn remote_peer(&self) -> Option<&PeerId> {
        self.remote.as_ref()
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Framed local identity, to be written before anything is read.
    pub fn hello(&self) -> Result<Bytes, ProtocolError> {
        let payload =
            encode_identity_payload(self.config.local_key(), self.config.settings().encoding)
                .map_err(ProtocolError::LocalIdentity)?;

        let frame = encode_frame(&payload);

        trace!(
            frame = %hex::encode(&frame),
            len = frame.len(),
            "Encoded local identity"
        );

        Ok(frame)
    }

    /// Feeds one inbound chunk.
    ///
    /// Any error is terminal: the engine moves to [`HandshakeState::Failed`]
    /// and rejects all further input with [`ProtocolError::HandshakeFailed`].
    pub fn on_inbound(&mut self, chunk: &[u8]) -> Result<Progress, ProtocolError> {
        match self.state {
            HandshakeState::AwaitingPeer => {}
            HandshakeState::Verified => {
                error!(
                    len = chunk.len(),
                    "Received data after the handshake was verified, forwarding as-is"
                );
                return Ok(Progress::Forward(Bytes::copy_from_slice(chunk)));
            }
            HandshakeState::Failed => {
                debug!(len = chunk.len(), "Dropping data for a failed handshake");
                return Err(ProtocolError::HandshakeFailed);
            }
        }

        self.receive(chunk).inspect_err(|_| {
            self.state = HandshakeState::Failed;
            self.buffer.clear();
        })
    }

    fn receive(&mut self, chunk: &[u8]) -> Result<Progress, ProtocolError> {
        self.buffer.extend_from_slice(chunk);

        let buffered = mem::take(&mut self.buffer);

        let decoded = decode_frame(&buffered, self.config.settings().max_frame_len)?;

        let FrameDecode::Complete { payload, leftover } = decoded else {
            trace!(buffered = buffered.len(), "Partial handshake frame, waiting for more data");
            self.buffer = buffered;
            return Ok(Progress::Pending);
        };

        trace!(payload = %hex::encode(payload), "Received remote identity");

        let leftover = Bytes::copy_from_slice(leftover);
        let (remote, warning) = self.verify(payload)?;

        debug!(
            remote = %remote.peer_id,
            leftover = leftover.len(),
            "Remote identity verified"
        );

        Ok(Progress::Verified(Verified {
            remote,
            warning,
            leftover,
        }))
    }

    fn verify(
        &mut self,
        payload: &[u8],
    ) -> Result<(RemoteIdentity, Option<SecurityWarning>), ProtocolError> {
        let claim = decode_identity_payload(payload).map_err(ProtocolError::MalformedIdentity)?;

        let peer_id = claim.public_key.to_peer_id();

        if peer_id.to_bytes() != claim.claimed_id {
            let claimed = PeerId::from_bytes(&claim.claimed_id)
                .map_or_else(|_| hex::encode(&claim.claimed_id), |id| id.to_base58());

            error!(%claimed, derived = %peer_id, "Remote peer id isn't derived from its public key");

            return Err(ProtocolError::IdentityMismatch {
                claimed,
                derived: peer_id,
            });
        }

        let warning = match self.config.expected_peer() {
            Some(expected) if *expected != peer_id => {
                error!(%expected, actual = %peer_id, "Remote peer id doesn't match the expected peer");

                return Err(ProtocolError::UnexpectedPeer {
                    expected: *expected,
                    actual: peer_id,
                });
            }
            Some(_) => None,
            None => {
                warn!(remote = %peer_id, "Skipping remote peer check, no expected peer was provided");
                Some(SecurityWarning::SkippedPeerValidation)
            }
        };

        self.state = HandshakeState::Verified;
        self.remote = Some(peer_id);

        Ok((
            RemoteIdentity {
                peer_id,
                public_key: claim.public_key,
            },
            warning,
        ))
    }
}

#[cfg(test)]
mod tests {
    use libp2p_identity::Keypair;

    use super::*;
    use crate::exchange::{ExchangeEnvelope, IdentityEncoding};
    use crate::frame::FrameError;

    fn engine(expected: Option<PeerId>) -> Handshake {
        let config = Config::from_keypair(&Keypair::generate_ed25519());
        Handshake::new(match expected {
            Some(peer_id) => config.with_expected_peer(peer_id),
            None => config,
        })
    }

    fn hello_of(key: &PublicKey, encoding: IdentityEncoding) -> Bytes {
        Handshake::new(Config::new(key.clone()).with_encoding(encoding))
            .hello()
            .unwrap()
    }

    fn expect_verified(progress: Progress) -> Verified {
        match progress {
            Progress::Verified(verified) => verified,
            other => panic!("expected a verified handshake, got {other:?}"),
        }
    }

    #[test]
    fn test_verifies_in_single_chunk() {
        let remote = Keypair::generate_ed25519().public();
        let mut handshake = engine(Some(remote.to_peer_id()));

        let verified = expect_verified(
            handshake
                .on_inbound(&hello_of(&remote, IdentityEncoding::KeyRecord))
                .unwrap(),
        );

        assert_eq!(verified.remote.peer_id, remote.to_peer_id());
        assert_eq!(verified.remote.public_key, remote);
        assert_eq!(verified.warning, None);
        assert!(verified.leftover.is_empty());
        assert_eq!(handshake.state(), HandshakeState::Verified);
        assert_eq!(handshake.remote_peer(), Some(&remote.to_peer_id()));
    }

    #[test]
    fn test_every_split_point_gives_same_outcome() {
        let remote = Keypair::generate_secp256k1().public();

        for encoding in [IdentityEncoding::KeyRecord, IdentityEncoding::Envelope] {
            let mut message = hello_of(&remote, encoding).to_vec();
            message.extend_from_slice(b"trailing");

            for split in 1..message.len() {
                let mut handshake = engine(Some(remote.to_peer_id()));

                let (head, tail) = message.split_at(split);

                let first = handshake.on_inbound(head).unwrap();
                let verified = match first {
                    Progress::Pending => {
                        assert_eq!(handshake.state(), HandshakeState::AwaitingPeer);
                        expect_verified(handshake.on_inbound(tail).unwrap())
                    }
                    Progress::Verified(mut verified) => {
                        // the frame ended inside `head`, the rest is plain data
                        let mut leftover = verified.leftover.to_vec();
                        leftover.extend_from_slice(tail);
                        verified.leftover = leftover.into();
                        verified
                    }
                    Progress::Forward(_) => panic!("nothing to forward at split {split}"),
                };

                assert_eq!(
                    verified.remote.peer_id,
                    remote.to_peer_id(),
                    "split at {split}"
                );
                assert_eq!(&verified.leftover[..], b"trailing", "split at {split}");
            }
        }
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let remote = Keypair::generate_ed25519().public();
        let message = hello_of(&remote, IdentityEncoding::Envelope);
        let mut handshake = engine(None);

        let (last, head) = message.split_last().unwrap();
        for byte in head {
            assert!(matches!(
                handshake.on_inbound(&[*byte]).unwrap(),
                Progress::Pending
            ));
        }

        let verified = expect_verified(handshake.on_inbound(&[*last]).unwrap());
        assert_eq!(verified.remote.peer_id, remote.to_peer_id());
    }

    #[test]
    fn test_mismatched_claim_is_rejected() {
        let key = Keypair::generate_ed25519().public();
        let impostor = Keypair::generate_ed25519().public();

        let mut envelope = ExchangeEnvelope::for_key(&key).unwrap();
        envelope.id = impostor.to_peer_id().to_bytes();

        let mut handshake = engine(None);
        let err = handshake
            .on_inbound(&encode_frame(&envelope.encode()))
            .unwrap_err();

        assert!(
            matches!(&err, ProtocolError::IdentityMismatch { claimed, derived }
                if *claimed == impostor.to_peer_id().to_base58() && *derived == key.to_peer_id()),
            "got {err:?}"
        );
        assert_eq!(handshake.state(), HandshakeState::Failed);
        assert_eq!(handshake.remote_peer(), None);
    }

    #[test]
    fn test_pinned_peer_mismatch() {
        let expected = Keypair::generate_ed25519().public().to_peer_id();
        let actual = Keypair::generate_ed25519().public();

        let mut handshake = engine(Some(expected));
        let err = handshake
            .on_inbound(&hello_of(&actual, IdentityEncoding::KeyRecord))
            .unwrap_err();

        assert!(
            matches!(err, ProtocolError::UnexpectedPeer { expected: e, actual: a }
                if e == expected && a == actual.to_peer_id()),
            "got {err:?}"
        );
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_unpinned_peer_succeeds_with_warning() {
        let remote = Keypair::generate_ed25519().public();
        let mut handshake = engine(None);

        let verified = expect_verified(
            handshake
                .on_inbound(&hello_of(&remote, IdentityEncoding::KeyRecord))
                .unwrap(),
        );

        assert_eq!(verified.warning, Some(SecurityWarning::SkippedPeerValidation));
    }

    #[test]
    fn test_malformed_payload() {
        let mut handshake = engine(None);

        let err = handshake
            .on_inbound(&encode_frame(b"\x0a\x05short"))
            .unwrap_err();

        assert!(matches!(err, ProtocolError::MalformedIdentity(_)), "got {err:?}");
    }

    #[test]
    fn test_invalid_frames() {
        let mut handshake = engine(None);
        let err = handshake.on_inbound(&[0x01, 0xff]).unwrap_err();
        assert!(
            matches!(err, ProtocolError::InvalidFrame(FrameError::TooShort(1))),
            "got {err:?}"
        );

        let mut handshake = engine(None);
        assert!(matches!(
            handshake.on_inbound(&[0x80; 5]).unwrap(),
            Progress::Pending
        ));
        let err = handshake.on_inbound(&[0x80; 5]).unwrap_err();
        assert!(
            matches!(err, ProtocolError::InvalidFrame(FrameError::MalformedVarint)),
            "got {err:?}"
        );
    }

    #[test]
    fn test_data_after_verification_is_forwarded() {
        let remote = Keypair::generate_ed25519().public();
        let mut handshake = engine(None);

        let mut message = hello_of(&remote, IdentityEncoding::KeyRecord).to_vec();
        message.extend_from_slice(b"extra");

        let verified = expect_verified(handshake.on_inbound(&message).unwrap());
        assert_eq!(&verified.leftover[..], b"extra");

        // a second identity frame must not be re-verified
        let again = hello_of(&remote, IdentityEncoding::KeyRecord);
        match handshake.on_inbound(&again).unwrap() {
            Progress::Forward(bytes) => assert_eq!(bytes, again),
            other => panic!("expected forwarded bytes, got {other:?}"),
        }
        assert_eq!(handshake.state(), HandshakeState::Verified);
    }

    #[test]
    fn test_rejected_peer_stays_failed() {
        let expected = Keypair::generate_ed25519().public();
        let intruder = Keypair::generate_ed25519().public();

        let mut handshake = engine(Some(expected.to_peer_id()));
        let err = handshake
            .on_inbound(&hello_of(&intruder, IdentityEncoding::KeyRecord))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedPeer { .. }), "got {err:?}");

        // the pinned peer showing up afterwards must not revive the handshake
        let err = handshake
            .on_inbound(&hello_of(&expected, IdentityEncoding::KeyRecord))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::HandshakeFailed), "got {err:?}");
        assert_eq!(handshake.state(), HandshakeState::Failed);
        assert_eq!(handshake.remote_peer(), None);
    }

    #[test]
    fn test_invalid_frame_stays_failed() {
        let remote = Keypair::generate_ed25519().public();
        let mut handshake = engine(None);

        let err = handshake.on_inbound(&[0x00, 0x00]).unwrap_err();
        assert!(
            matches!(err, ProtocolError::InvalidFrame(FrameError::TooShort(0))),
            "got {err:?}"
        );

        for chunk in [
            hello_of(&remote, IdentityEncoding::KeyRecord),
            Bytes::from_static(&[0x01, 0x02]),
        ] {
            let err = handshake.on_inbound(&chunk).unwrap_err();
            assert!(matches!(err, ProtocolError::HandshakeFailed), "got {err:?}");
        }

        assert_eq!(handshake.state(), HandshakeState::Failed);
    }
}
