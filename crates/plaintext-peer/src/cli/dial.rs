use core::net::SocketAddr;
use std::io;

use calimero_plaintext::{upgrade, Role};
use clap::Parser;
use eyre::{eyre, Result as EyreResult, WrapErr};
use libp2p_identity::PeerId;
use tokio::io::{copy, split, stdin, stdout, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio::try_join;
use tokio_util::compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tracing::{info, warn};

use super::HandshakeArgs;
use crate::cli::RootArgs;

/// Dial a listener, secure the connection and pipe stdin/stdout through it
#[derive(Debug, Parser)]
pub struct DialCommand {
    /// Address of the remote listener
    #[arg(value_name = "ADDR")]
    pub addr: SocketAddr,

    /// Fail unless the remote proves this peer id
    #[arg(long, value_name = "PEER_ID")]
    pub peer: Option<PeerId>,

    #[command(flatten)]
    pub handshake: HandshakeArgs,
}

impl DialCommand {
    pub async fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let file = root_args.load_config()?;

        let mut config = self.handshake.config(&file);
        if let Some(peer) = self.peer {
            config = config.with_expected_peer(peer);
        }

        let socket = TcpStream::connect(self.addr)
            .await
            .wrap_err_with(|| format!("failed to connect to {}", self.addr))?;

        let limit = self.handshake.timeout();

        let (secured, stream) = timeout(limit, upgrade(socket.compat(), config, Role::Dialer))
            .await
            .map_err(|_| eyre!("handshake with {} timed out after {limit:?}", self.addr))??;

        if secured.warning.is_some() {
            warn!("Remote peer was not pinned, pass --peer to verify it");
        }

        info!(
            remote = %secured.remote.peer_id,
            protocol = secured.protocol,
            "Connection secured"
        );

        let (mut reader, mut writer) = split(stream.compat());

        let outbound = async {
            let sent = copy(&mut stdin(), &mut writer).await?;
            writer.shutdown().await?;
            Ok::<_, io::Error>(sent)
        };

        let inbound = async {
            let mut out = stdout();
            let received = copy(&mut reader, &mut out).await?;
            out.flush().await?;
            Ok::<_, io::Error>(received)
        };

        let (sent, received) = try_join!(outbound, inbound)?;

        info!(sent, received, "Connection closed");

        Ok(())
    }
}
