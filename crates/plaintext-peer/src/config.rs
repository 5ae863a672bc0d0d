use std::fs::{read_to_string, write};
use std::net::SocketAddr;

use calimero_plaintext::HandshakeSettings;
use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    #[serde(with = "serde_identity")]
    pub identity: Keypair,

    pub listen: SocketAddr,

    #[serde(default)]
    pub handshake: HandshakeSettings,
}

impl ConfigFile {
    #[must_use]
    pub const fn new(identity: Keypair, listen: SocketAddr, handshake: HandshakeSettings) -> Self {
        Self {
            identity,
            listen,
            handshake,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content).map_err(Into::into)
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }
}

/// Keypair stored as bs58 protobuf next to the peer id it must derive.
mod serde_identity {
    use libp2p_identity::{Keypair, PeerId};
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize, Serialize)]
    struct Encoded {
        peer_id: PeerId,
        keypair: String,
    }

    pub fn serialize<S>(key: &Keypair, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let keypair = key.to_protobuf_encoding().map_err(ser::Error::custom)?;

        Encoded {
            peer_id: key.public().to_peer_id(),
            keypair: bs58::encode(keypair).into_string(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Keypair, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Encoded { peer_id, keypair } = Encoded::deserialize(deserializer)?;

        let decoded = bs58::decode(keypair)
            .into_vec()
            .map_err(de::Error::custom)?;
        let keypair = Keypair::from_protobuf_encoding(&decoded).map_err(de::Error::custom)?;

        if keypair.public().to_peer_id() != peer_id {
            return Err(de::Error::custom(
                "peer_id does not belong to the configured keypair",
            ));
        }

        Ok(keypair)
    }
}
