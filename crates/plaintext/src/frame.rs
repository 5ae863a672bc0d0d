//! Length-prefixed framing for the identity exchange.
//!
//! Only the handshake message is framed: `uvarint(len) ++ payload`. Once both
//! sides are verified the stream carries raw application bytes, so nothing in
//! here is used past the handshake.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Longest accepted encoding of a 64-bit unsigned varint.
pub const MAX_UVARINT_LEN: usize = 10;

/// Default upper bound on a declared handshake payload length.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    #[error("length prefix is not a valid uvarint")]
    MalformedVarint,

    #[error("declared length {0} is too short for an identity payload")]
    TooShort(u64),

    #[error("declared length {declared} exceeds the maximum of {max} bytes")]
    TooLong { declared: u64, max: usize },
}

/// Result of inspecting the reassembly buffer for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDecode<'a> {
    /// More bytes are needed; nothing was consumed.
    Incomplete,
    Complete {
        payload: &'a [u8],
        /// Bytes that followed the frame in the same buffer. They belong to
        /// the next protocol layer and must be forwarded, not discarded.
        leftover: &'a [u8],
    },
}

/// Appends `value` as little-endian base-128 groups.
pub fn encode_uvarint(mut value: u64, dst: &mut impl BufMut) {
    loop {
        #[expect(clippy::cast_possible_truncation, reason = "masked to 7 bits")]
        let group = (value & 0x7f) as u8;
        value >>= 7;

        if value == 0 {
            dst.put_u8(group);
            return;
        }

        dst.put_u8(group | 0x80);
    }
}

/// Parses a uvarint from the start of `src`.
///
/// Returns `Ok(None)` while the encoding could still be completed by more
/// input, and `(value, bytes_read)` once a terminating group is seen.
pub fn decode_uvarint(src: &[u8]) -> Result<Option<(u64, usize)>, FrameError> {
    let mut value = 0_u64;

    for (index, byte) in src.iter().copied().take(MAX_UVARINT_LEN).enumerate() {
        // the 10th group only has room for the 64th bit
        if index == MAX_UVARINT_LEN - 1 && byte > 1 {
            return Err(FrameError::MalformedVarint);
        }

        value |= u64::from(byte & 0x7f) << (7 * index);

        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
    }

    Ok(None)
}

#[must_use]
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(MAX_UVARINT_LEN + payload.len());

    encode_uvarint(payload.len() as u64, &mut frame);
    frame.put_slice(payload);

    frame.freeze()
}

/// Extracts one frame from the front of `src` without consuming anything.
pub fn decode_frame(src: &[u8], max_len: usize) -> Result<FrameDecode<'_>, FrameError> {
    let Some((declared, prefix_len)) = decode_uvarint(src)? else {
        return Ok(FrameDecode::Incomplete);
    };

    if declared <= 1 {
        return Err(FrameError::TooShort(declared));
    }

    let len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= max_len)
        .ok_or(FrameError::TooLong {
            declared,
            max: max_len,
        })?;

    let Some(body) = src.get(prefix_len..) else {
        return Ok(FrameDecode::Incomplete);
    };

    if body.len() < len {
        return Ok(FrameDecode::Incomplete);
    }

    let (payload, leftover) = body.split_at(len);

    Ok(FrameDecode::Complete { payload, leftover })
}
