//! Plaintext/2.0.0 security upgrade.
//!
//! Exchanges peer identities over a fresh connection and then passes bytes
//! through untouched. There is **no** encryption: the only guarantee is that
//! the remote announced a peer id that matches the public key it sent and,
//! if one was pinned, that it is the peer we expected. Use it for testing and
//! interop, never to protect traffic.
//!
//! # Modules
//!
//! - [`frame`]: uvarint length-prefixed framing of the handshake message
//! - [`exchange`]: identity payload encodings (bare key record and envelope)
//! - [`handshake`]: sans-IO handshake state machine
//! - [`relay`]: passthrough stream installed after the handshake
//! - [`upgrade`]: async driver and libp2p connection-upgrade glue
//!
//! # Example
//!
//! ```rust,ignore
//! use calimero_plaintext::{upgrade, Config, Role};
//!
//! let config = Config::from_keypair(&keypair).with_expected_peer(remote);
//! let (secured, stream) = upgrade(socket, config, Role::Dialer).await?;
//!
//! if secured.warning.is_some() {
//!     // remote was not pinned
//! }
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod frame;
pub mod handshake;
pub mod relay;
pub mod upgrade;

pub use config::{Config, HandshakeSettings};
pub use error::{ProtocolError, SecurityWarning};
pub use exchange::IdentityEncoding;
pub use handshake::{Handshake, HandshakeState, RemoteIdentity};
pub use relay::PlaintextStream;
pub use upgrade::{upgrade, Role, Secured};

/// Protocol id negotiated by multistream-select.
pub const PROTOCOL_NAME: &str = "/plaintext/2.0.0";
