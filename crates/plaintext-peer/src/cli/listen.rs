use core::net::SocketAddr;
use core::time::Duration;

use calimero_plaintext::{upgrade, Config, Role};
use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use tokio::io::{copy, split};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::time::timeout;
use tokio_util::compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

use super::HandshakeArgs;
use crate::cli::RootArgs;

/// Accept connections, secure them and echo whatever the remote sends
#[derive(Debug, Parser)]
pub struct ListenCommand {
    /// Override the listen address configured in config.toml
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    #[command(flatten)]
    pub handshake: HandshakeArgs,
}

impl ListenCommand {
    pub async fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let file = root_args.load_config()?;
        let addr = self.listen.unwrap_or(file.listen);
        let config = self.handshake.config(&file);
        let limit = self.handshake.timeout();

        let listener = TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("failed to listen on {addr}"))?;

        info!(
            peer_id = %config.local_peer_id(),
            addr = %listener.local_addr()?,
            "Listening for plaintext connections"
        );

        loop {
            let (socket, remote_addr) = listener.accept().await?;

            debug!(%remote_addr, "Accepted connection");

            drop(spawn(serve(socket, remote_addr, config.clone(), limit)));
        }
    }
}

async fn serve(socket: TcpStream, remote_addr: SocketAddr, config: Config, limit: Duration) {
    let handshake = upgrade(socket.compat(), config, Role::Listener);

    let (secured, stream) = match timeout(limit, handshake).await {
        Ok(Ok(secured)) => secured,
        Ok(Err(err)) => {
            warn!(%remote_addr, %err, "Handshake failed");
            return;
        }
        Err(_) => {
            warn!(%remote_addr, ?limit, "Handshake timed out");
            return;
        }
    };

    info!(
        %remote_addr,
        remote = %secured.remote.peer_id,
        pinned = secured.warning.is_none(),
        "Connection secured, echoing"
    );

    let (mut reader, mut writer) = split(stream.compat());

    match copy(&mut reader, &mut writer).await {
        Ok(echoed) => info!(%remote_addr, echoed, "Connection closed"),
        Err(err) => warn!(%remote_addr, %err, "Connection failed"),
    }
}
