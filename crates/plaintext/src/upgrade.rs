use core::fmt::{self, Display, Formatter};
use core::iter;

use futures_util::future::BoxFuture;
use futures_util::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use futures_util::FutureExt;
use libp2p::core::upgrade::{InboundConnectionUpgrade, OutboundConnectionUpgrade, UpgradeInfo};
use libp2p_identity::PeerId;
use tracing::{debug, debug_span, error, Instrument};

use crate::config::Config;
use crate::error::{ProtocolError, SecurityWarning};
use crate::handshake::{Handshake, Progress, RemoteIdentity, Verified};
use crate::relay::PlaintextStream;
use crate::PROTOCOL_NAME;

const READ_CHUNK: usize = 4096;

/// Which end of the connection we are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Dialer,
    Listener,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dialer => f.write_str("dialer"),
            Self::Listener => f.write_str("listener"),
        }
    }
}

/// What the host learns once the connection is secured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Secured {
    pub protocol: &'static str,
    pub remote: RemoteIdentity,
    pub warning: Option<SecurityWarning>,
}

/// Runs the plaintext handshake over `socket`.
///
/// Both sides send their identity immediately and then read the peer's. The
/// returned stream replays anything the peer sent after its identity frame,
/// so the caller must read from it, not from the underlying socket.
///
/// No timeout is applied; wrap the future in one.
pub async fn upgrade<S>(
    socket: S,
    config: Config,
    role: Role,
) -> Result<(Secured, PlaintextStream<S>), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let span = debug_span!("plaintext", %role, local = %config.local_peer_id());

    run(socket, config).instrument(span).await
}

async fn run<S>(
    mut socket: S,
    config: Config,
) -> Result<(Secured, PlaintextStream<S>), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = Handshake::new(config);

    match exchange(&mut socket, &mut handshake).await {
        Ok(verified) => {
            let secured = Secured {
                protocol: PROTOCOL_NAME,
                remote: verified.remote,
                warning: verified.warning,
            };

            debug!(remote = %secured.remote.peer_id, "Channel secured");

            Ok((secured, PlaintextStream::new(socket, verified.leftover)))
        }
        Err(err) => {
            error!(%err, "Plaintext handshake failed, closing connection");

            if let Err(close_err) = socket.close().await {
                debug!(%close_err, "Failed to close connection");
            }

            Err(err)
        }
    }
}

async fn exchange<S>(
    socket: &mut S,
    handshake: &mut Handshake,
) -> Result<Verified, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = handshake.hello()?;

    debug!(len = hello.len(), "Sending local identity to remote peer");

    socket.write_all(&hello).await?;
    socket.flush().await?;

    let mut chunk = vec![0; READ_CHUNK];

    loop {
        let read = socket.read(&mut chunk).await?;

        if read == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        if let Progress::Verified(verified) = handshake.on_inbound(&chunk[..read])? {
            return Ok(verified);
        }
    }
}

impl UpgradeInfo for Config {
    type Info = &'static str;
    type InfoIter = iter::Once<Self::Info>;

    fn protocol_info(&self) -> Self::InfoIter {
        iter::once(PROTOCOL_NAME)
    }
}

impl<C> InboundConnectionUpgrade<C> for Config
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Output = (PeerId, PlaintextStream<C>);
    type Error = ProtocolError;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_inbound(self, socket: C, _: Self::Info) -> Self::Future {
        upgrade(socket, self, Role::Listener)
            .map(|res| res.map(|(secured, stream)| (secured.remote.peer_id, stream)))
            .boxed()
    }
}

impl<C> OutboundConnectionUpgrade<C> for Config
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Output = (PeerId, PlaintextStream<C>);
    type Error = ProtocolError;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_outbound(self, socket: C, _: Self::Info) -> Self::Future {
        upgrade(socket, self, Role::Dialer)
            .map(|res| res.map(|(secured, stream)| (secured.remote.peer_id, stream)))
            .boxed()
    }
}
