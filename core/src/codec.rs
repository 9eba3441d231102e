//! Wire-exact AORP framing and next-hop wrapping.
//!
//! Pure functions, no I/O. The bit layout here is pinned by the wire format
//! and is never delegated to `bincode` — every offset below is load-bearing.

use rand::RngCore;

use crate::error::CodecError;

pub const MAGIC_AORP: u8 = 0xAA;
pub const MAGIC_HANDSHAKE: u8 = 0xBB;
pub const MAGIC_COVER: u8 = 0xFF;

/// Padding granularity for AORP frames.
pub const PADDING_BOUNDARY: usize = 512;

/// Fixed header width ahead of the payload: magic(1) + flags(1) + dest(16) + len(2).
const HEADER_LEN: usize = 20;

/// Bit 0 of the flags byte: this frame traveled through at least one
/// intermediate hop before reaching its destination.
const FLAG_HAS_NEXT_HOP: u8 = 0b0000_0001;

/// Width of the `next-hop` field prepended ahead of onward ciphertext for
/// routing layers above the innermost.
pub const NEXT_HOP_LEN: usize = 32;

/// A parsed inner AORP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AorpFrame {
    pub destination: [u8; 16],
    pub payload: Vec<u8>,
    pub has_next: bool,
}

/// Builds the inner AORP frame: header + payload + random padding to the
/// next 512-byte boundary.
///
/// `destination_id` is right-padded with zeros to 16 bytes if shorter.
pub fn build_aorp(
    payload: &[u8],
    destination_id: &[u8],
    has_next: bool,
) -> Result<Vec<u8>, CodecError> {
    if payload.len() > u16::MAX as usize {
        return Err(CodecError::PayloadTooLarge);
    }
    if destination_id.len() > 16 {
        return Err(CodecError::DestinationTooLong);
    }

    let mut dest = [0u8; 16];
    dest[..destination_id.len()].copy_from_slice(destination_id);

    let flags = if has_next { FLAG_HAS_NEXT_HOP } else { 0 };

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(MAGIC_AORP);
    frame.push(flags);
    frame.extend_from_slice(&dest);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);

    let total_len = next_boundary(frame.len());
    let pad_len = total_len - frame.len();
    let mut padding = vec![0u8; pad_len];
    rand::rngs::OsRng.fill_bytes(&mut padding);
    frame.extend_from_slice(&padding);

    Ok(frame)
}

/// Smallest multiple of [`PADDING_BOUNDARY`] that is `>= len` and always at
/// least one full boundary (property test invariant 2: every AORP frame is
/// `>= 512` bytes).
fn next_boundary(len: usize) -> usize {
    let boundary = len.div_ceil(PADDING_BOUNDARY).max(1);
    boundary * PADDING_BOUNDARY
}

/// Validates and parses an inner AORP frame.
pub fn parse_aorp(bytes: &[u8]) -> Result<AorpFrame, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::MalformedFrame);
    }
    if bytes[0] != MAGIC_AORP {
        return Err(CodecError::UnexpectedMagic(bytes[0]));
    }

    let flags = bytes[1];
    let mut destination = [0u8; 16];
    destination.copy_from_slice(&bytes[2..18]);
    let payload_len = u16::from_be_bytes([bytes[18], bytes[19]]) as usize;

    if payload_len > bytes.len() - HEADER_LEN {
        return Err(CodecError::LengthMismatch);
    }

    let payload = bytes[HEADER_LEN..HEADER_LEN + payload_len].to_vec();

    Ok(AorpFrame {
        destination,
        payload,
        has_next: flags & FLAG_HAS_NEXT_HOP != 0,
    })
}

/// Strips the leading 32-byte next-hop field from a peeled onion-layer
/// cleartext, trimming trailing NULs from the id.
pub fn strip_next_hop(bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CodecError> {
    if bytes.len() < NEXT_HOP_LEN {
        return Err(CodecError::MalformedFrame);
    }
    let raw = &bytes[..NEXT_HOP_LEN];
    let trimmed_len = raw.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
    let next_hop = raw[..trimmed_len].to_vec();
    let inner = bytes[NEXT_HOP_LEN..].to_vec();
    Ok((next_hop, inner))
}

/// Prepends the fixed 32-byte next-hop field ahead of `inner`, right-padding
/// `next_id` with zeros.
pub fn wrap_next_hop(next_id: &[u8], inner: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NEXT_HOP_LEN + inner.len());
    let mut field = [0u8; NEXT_HOP_LEN];
    let take = next_id.len().min(NEXT_HOP_LEN);
    field[..take].copy_from_slice(&next_id[..take]);
    out.extend_from_slice(&field);
    out.extend_from_slice(inner);
    out
}

/// Builds a `0xFF` cover frame of the given size, filled with random bytes.
pub fn build_cover_frame(size: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + size);
    frame.push(MAGIC_COVER);
    let mut body = vec![0u8; size];
    rand::rngs::OsRng.fill_bytes(&mut body);
    frame.extend_from_slice(&body);
    frame
}

/// Builds a `0xBB` handshake frame carrying the sender's raw static public key.
pub fn build_handshake_frame(static_public_key: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + static_public_key.len());
    frame.push(MAGIC_HANDSHAKE);
    frame.extend_from_slice(static_public_key);
    frame
}
