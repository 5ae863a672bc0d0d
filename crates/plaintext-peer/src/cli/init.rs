use core::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::fs::create_dir_all;

use calimero_plaintext::HandshakeSettings;
use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use tracing::{info, warn};

use super::encoding::EncodingArg;
use crate::cli::RootArgs;
use crate::config::ConfigFile;
use crate::defaults;

/// Initialize a new peer identity
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Host to listen on
    #[arg(long, value_name = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, value_name = "PORT", default_value_t = defaults::DEFAULT_PORT)]
    pub port: u16,

    /// Identity encoding announced during the handshake
    #[arg(long, value_enum)]
    pub encoding: Option<EncodingArg>,

    /// Overwrite an existing configuration
    #[arg(long, short)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let path = &root_args.home;

        if ConfigFile::exists(path) {
            if !self.force {
                bail!("Peer is already initialized in {:?}", path);
            }

            warn!("Overriding config.toml file in {:?}", path);
        }

        create_dir_all(path).wrap_err_with(|| format!("failed to create directory {path:?}"))?;

        let identity = Keypair::generate_ed25519();
        let peer_id = identity.public().to_peer_id();

        let mut handshake = HandshakeSettings::default();
        if let Some(encoding) = self.encoding {
            handshake.encoding = encoding.into();
        }

        let config = ConfigFile::new(
            identity,
            SocketAddr::new(self.host, self.port),
            handshake,
        );

        config.save(path)?;

        info!(%peer_id, "Initialized a peer in {:?}", path);

        Ok(())
    }
}
