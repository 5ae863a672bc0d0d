use libp2p_identity::{Keypair, PeerId, PublicKey};
use serde::{Deserialize, Serialize};

use crate::exchange::IdentityEncoding;
use crate::frame::DEFAULT_MAX_FRAME_LEN;

/// Tunables that can live in a config file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct HandshakeSettings {
    #[serde(default)]
    pub encoding: IdentityEncoding,

    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            encoding: IdentityEncoding::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl HandshakeSettings {
    #[must_use]
    pub const fn new(encoding: IdentityEncoding, max_frame_len: usize) -> Self {
        Self {
            encoding,
            max_frame_len,
        }
    }
}

const fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

/// Per-connection handshake configuration.
///
/// Only the public half of the local identity is needed: plaintext proves
/// nothing about key ownership, it merely announces the key.
#[derive(Clone, Debug)]
pub struct Config {
    local_key: PublicKey,
    expected_peer: Option<PeerId>,
    settings: HandshakeSettings,
}

impl Config {
    #[must_use]
    pub fn new(local_key: PublicKey) -> Self {
        Self {
            local_key,
            expected_peer: None,
            settings: HandshakeSettings::default(),
        }
    }

    #[must_use]
    pub fn from_keypair(keypair: &Keypair) -> Self {
        Self::new(keypair.public())
    }

    /// Pins the remote: the handshake fails unless the peer proves this id.
    #[must_use]
    pub fn with_expected_peer(mut self, peer_id: PeerId) -> Self {
        self.expected_peer = Some(peer_id);
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: IdentityEncoding) -> Self {
        self.settings.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: HandshakeSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn local_key(&self) -> &PublicKey {
        &self.local_key
    }

    #[must_use]
    pub fn local_peer_id(&self) -> PeerId {
        self.local_key.to_peer_id()
    }

    #[must_use]
    pub const fn expected_peer(&self) -> Option<&PeerId> {
        self.expected_peer.as_ref()
    }

    #[must_use]
    pub const fn settings(&self) -> &HandshakeSettings {
        &self.settings
    }
}
