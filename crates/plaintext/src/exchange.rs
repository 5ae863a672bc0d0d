//! Identity payload carried inside the handshake frame.
//!
//! Peers in the wild send one of two shapes:
//!
//! 1. a bare protobuf `PublicKey` record (`Type` + `Data`), from which the
//!    peer id is derived, or
//! 2. an `Exchange` envelope `{ id, pubkey }` that states the peer id
//!    explicitly next to the key.
//!
//! [`decode_identity_payload`] always tries the bare record first and only
//! then falls back to the envelope. Several implementations depend on that
//! order, so keep it.

use libp2p_identity::{DecodingError, PublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{decode_uvarint, encode_uvarint};

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

const EXCHANGE_ID: u64 = 1;
const EXCHANGE_PUBKEY: u64 = 2;
const PUBKEY_TYPE: u64 = 1;
const PUBKEY_DATA: u64 = 2;

/// How the local identity is written to the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityEncoding {
    /// Bare marshaled public key.
    #[default]
    KeyRecord,
    /// Full `Exchange` envelope, for peers that refuse anything else.
    Envelope,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ed25519,
    Secp256k1,
}

impl KeyType {
    const fn tag(self) -> u64 {
        match self {
            Self::Rsa => 0,
            Self::Ed25519 => 1,
            Self::Secp256k1 => 2,
        }
    }

    const fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(Self::Rsa),
            1 => Some(Self::Ed25519),
            2 => Some(Self::Secp256k1),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    #[error("truncated protobuf message")]
    Truncated,

    #[error("unsupported protobuf wire type {0}")]
    WireType(u64),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unsupported key type {0}")]
    KeyType(u64),

    #[error("invalid public key")]
    Key(#[from] DecodingError),
}

/// `Exchange` message: an explicit peer id next to a typed public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeEnvelope {
    pub id: Vec<u8>,
    pub key_type: KeyType,
    pub key_data: Vec<u8>,
}

/// Identity as stated by the remote, before any verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityClaim {
    pub public_key: PublicKey,
    /// Raw peer id bytes the remote claims to own.
    pub claimed_id: Vec<u8>,
    pub encoding: IdentityEncoding,
}

impl ExchangeEnvelope {
    pub fn for_key(key: &PublicKey) -> Result<Self, EnvelopeError> {
        let record = key.encode_protobuf();
        let (key_type, key_data) = decode_key_record(&record)?;

        Ok(Self {
            id: key.to_peer_id().to_bytes(),
            key_type,
            key_data: key_data.to_vec(),
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let pubkey = encode_key_record(self.key_type, &self.key_data);

        let mut out = Vec::with_capacity(self.id.len() + pubkey.len() + 8);
        put_len_field(&mut out, EXCHANGE_ID, &self.id);
        put_len_field(&mut out, EXCHANGE_PUBKEY, &pubkey);
        out
    }

    pub fn decode(src: &[u8]) -> Result<Self, EnvelopeError> {
        let mut id = None;
        let mut pubkey = None;

        for field in Fields::new(src) {
            match field? {
                (EXCHANGE_ID, Value::Len(bytes)) => id = Some(bytes),
                (EXCHANGE_PUBKEY, Value::Len(bytes)) => pubkey = Some(bytes),
                _ => {}
            }
        }

        let id = id.ok_or(EnvelopeError::MissingField("id"))?;
        let pubkey = pubkey.ok_or(EnvelopeError::MissingField("pubkey"))?;
        let (key_type, key_data) = decode_key_record(pubkey)?;

        Ok(Self {
            id: id.to_vec(),
            key_type,
            key_data: key_data.to_vec(),
        })
    }

    pub fn public_key(&self) -> Result<PublicKey, EnvelopeError> {
        let record = encode_key_record(self.key_type, &self.key_data);

        Ok(PublicKey::try_decode_protobuf(&record)?)
    }
}

pub fn encode_identity_payload(
    key: &PublicKey,
    encoding: IdentityEncoding,
) -> Result<Vec<u8>, EnvelopeError> {
    match encoding {
        IdentityEncoding::KeyRecord => Ok(key.encode_protobuf()),
        IdentityEncoding::Envelope => ExchangeEnvelope::for_key(key).map(|env| env.encode()),
    }
}

/// Decodes a handshake payload, preferring the bare key record.
///
/// When both forms fail the envelope error is returned, since the envelope is
/// the documented shape and its error is the more useful one.
pub fn decode_identity_payload(payload: &[u8]) -> Result<IdentityClaim, EnvelopeError> {
    if let Ok(public_key) = PublicKey::try_decode_protobuf(payload) {
        return Ok(IdentityClaim {
            claimed_id: public_key.to_peer_id().to_bytes(),
            public_key,
            encoding: IdentityEncoding::KeyRecord,
        });
    }

    let envelope = ExchangeEnvelope::decode(payload)?;

    Ok(IdentityClaim {
        public_key: envelope.public_key()?,
        claimed_id: envelope.id,
        encoding: IdentityEncoding::Envelope,
    })
}

fn encode_key_record(key_type: KeyType, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    encode_uvarint(PUBKEY_TYPE << 3 | WIRE_VARINT, &mut out);
    encode_uvarint(key_type.tag(), &mut out);
    put_len_field(&mut out, PUBKEY_DATA, data);
    out
}

fn decode_key_record(src: &[u8]) -> Result<(KeyType, &[u8]), EnvelopeError> {
    let mut key_type = None;
    let mut data = None;

    for field in Fields::new(src) {
        match field? {
            (PUBKEY_TYPE, Value::Varint(tag)) => {
                key_type = Some(KeyType::from_tag(tag).ok_or(EnvelopeError::KeyType(tag))?);
            }
            (PUBKEY_DATA, Value::Len(bytes)) => data = Some(bytes),
            _ => {}
        }
    }

    Ok((
        key_type.ok_or(EnvelopeError::MissingField("Type"))?,
        data.ok_or(EnvelopeError::MissingField("Data"))?,
    ))
}

fn put_len_field(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    encode_uvarint(field << 3 | WIRE_LEN, out);
    encode_uvarint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

#[derive(Clone, Copy, Debug)]
enum Value<'a> {
    Varint(u64),
    Len(&'a [u8]),
    Fixed,
}

/// Iterator over the top-level fields of a protobuf message.
#[derive(Debug)]
struct Fields<'a> {
    src: &'a [u8],
}

impl<'a> Fields<'a> {
    const fn new(src: &'a [u8]) -> Self {
        Self { src }
    }

    fn varint(&mut self) -> Result<u64, EnvelopeError> {
        let Ok(Some((value, read))) = decode_uvarint(self.src) else {
            return Err(EnvelopeError::Truncated);
        };
        self.src = &self.src[read..];
        Ok(value)
    }

    fn take(&mut self, len: u64) -> Result<&'a [u8], EnvelopeError> {
        let len = usize::try_from(len).map_err(|_| EnvelopeError::Truncated)?;
        if self.src.len() < len {
            return Err(EnvelopeError::Truncated);
        }
        let (head, tail) = self.src.split_at(len);
        self.src = tail;
        Ok(head)
    }

    fn field(&mut self) -> Result<(u64, Value<'a>), EnvelopeError> {
        let key = self.varint()?;
        let value = match key & 0x07 {
            WIRE_VARINT => Value::Varint(self.varint()?),
            WIRE_LEN => {
                let len = self.varint()?;
                Value::Len(self.take(len)?)
            }
            WIRE_FIXED64 => {
                let _ = self.take(8)?;
                Value::Fixed
            }
            WIRE_FIXED32 => {
                let _ = self.take(4)?;
                Value::Fixed
            }
            other => return Err(EnvelopeError::WireType(other)),
        };

        Ok((key >> 3, value))
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<(u64, Value<'a>), EnvelopeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.src.is_empty() {
            return None;
        }

        let field = self.field();
        if field.is_err() {
            self.src = &[];
        }
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use libp2p_identity::Keypair;

    use super::*;

    #[test]
    fn test_key_record_round_trip() {
        for keypair in [Keypair::generate_ed25519(), Keypair::generate_secp256k1()] {
            let key = keypair.public();
            let payload = encode_identity_payload(&key, IdentityEncoding::KeyRecord).unwrap();

            let claim = decode_identity_payload(&payload).unwrap();

            assert_eq!(claim.public_key, key);
            assert_eq!(claim.claimed_id, key.to_peer_id().to_bytes());
            assert_eq!(claim.encoding, IdentityEncoding::KeyRecord);
        }
    }

    #[test]
    fn test_envelope_round_trip() {
        for keypair in [Keypair::generate_ed25519(), Keypair::generate_secp256k1()] {
            let key = keypair.public();
            let payload = encode_identity_payload(&key, IdentityEncoding::Envelope).unwrap();

            let claim = decode_identity_payload(&payload).unwrap();

            assert_eq!(claim.public_key, key);
            assert_eq!(claim.claimed_id, key.to_peer_id().to_bytes());
            assert_eq!(claim.encoding, IdentityEncoding::Envelope);
        }
    }

    #[test]
    fn test_envelope_wire_layout() {
        let key = Keypair::generate_ed25519().public();
        let envelope = ExchangeEnvelope::for_key(&key).unwrap();

        assert_eq!(envelope.key_type, KeyType::Ed25519);
        assert_eq!(envelope.key_data.len(), 32);

        let bytes = envelope.encode();
        // field 1 (id) comes first, then field 2 (pubkey)
        assert_eq!(bytes[0], 0x0a);
        assert_eq!(usize::from(bytes[1]), envelope.id.len());
        assert_eq!(bytes[2 + envelope.id.len()], 0x12);

        // the nested pubkey is byte-for-byte the marshaled key record
        let nested = &bytes[4 + envelope.id.len()..];
        assert_eq!(nested, key.encode_protobuf().as_slice());

        assert_eq!(ExchangeEnvelope::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_envelope_skips_unknown_fields() {
        let key = Keypair::generate_ed25519().public();
        let mut bytes = ExchangeEnvelope::for_key(&key).unwrap().encode();

        // field 7, varint 150
        bytes.extend_from_slice(&[0x38, 0x96, 0x01]);
        // field 9, length-delimited
        bytes.extend_from_slice(&[0x4a, 0x02, 0xde, 0xad]);

        let claim = decode_identity_payload(&bytes).unwrap();
        assert_eq!(claim.public_key, key);
    }

    #[test]
    fn test_envelope_preserves_claimed_id() {
        let key = Keypair::generate_ed25519().public();
        let other = Keypair::generate_ed25519().public();

        let mut envelope = ExchangeEnvelope::for_key(&key).unwrap();
        envelope.id = other.to_peer_id().to_bytes();

        let claim = decode_identity_payload(&envelope.encode()).unwrap();

        assert_eq!(claim.public_key, key);
        assert_eq!(claim.claimed_id, other.to_peer_id().to_bytes());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            decode_identity_payload(b"definitely not a key"),
            Err(EnvelopeError::Truncated | EnvelopeError::WireType(_))
        ));

        let key = Keypair::generate_ed25519().public();
        let envelope = ExchangeEnvelope::for_key(&key).unwrap().encode();
        assert!(matches!(
            decode_identity_payload(&envelope[..envelope.len() - 3]),
            Err(EnvelopeError::Truncated)
        ));

        let mut missing_key = Vec::new();
        put_len_field(&mut missing_key, EXCHANGE_ID, &key.to_peer_id().to_bytes());
        assert!(matches!(
            decode_identity_payload(&missing_key),
            Err(EnvelopeError::MissingField("pubkey"))
        ));
    }

    #[test]
    fn test_rejects_unknown_key_type() {
        let key = Keypair::generate_ed25519().public();

        let mut record = Vec::new();
        encode_uvarint(PUBKEY_TYPE << 3 | WIRE_VARINT, &mut record);
        encode_uvarint(3, &mut record);
        put_len_field(&mut record, PUBKEY_DATA, &[4; 65]);

        let mut envelope = Vec::new();
        put_len_field(&mut envelope, EXCHANGE_ID, &key.to_peer_id().to_bytes());
        put_len_field(&mut envelope, EXCHANGE_PUBKEY, &record);

        assert!(matches!(
            decode_identity_payload(&envelope),
            Err(EnvelopeError::KeyType(3))
        ));
    }
}
