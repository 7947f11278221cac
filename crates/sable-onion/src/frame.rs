//! Layer framing.
//!
//! Every onion layer, once decrypted, is the concatenation
//!
//! ```text
//! [len: u32 little-endian][blob: len bytes][metadata: UTF-8 JSON, remainder]
//! ```
//!
//! The length is little-endian on every host; the metadata occupies the
//! whole remainder of the plaintext and carries no trailing length.

use crate::{OnionError, Result};

/// Size of the length prefix.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Assemble a layer: length prefix, blob, then the serialized metadata.
pub fn encode_frame(blob: &[u8], metadata: &serde_json::Value) -> Vec<u8> {
    let meta = metadata.to_string();
    let mut out = Vec::with_capacity(LEN_PREFIX_SIZE + blob.len() + meta.len());
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(blob);
    out.extend_from_slice(meta.as_bytes());
    out
}

/// Split a layer into its blob and parsed metadata.
pub fn parse_frame(data: &[u8]) -> Result<(&[u8], serde_json::Value)> {
    if data.len() < LEN_PREFIX_SIZE {
        return Err(OnionError::MalformedFrame(format!(
            "{} bytes is too short for a length prefix",
            data.len()
        )));
    }
    let mut len_bytes = [0u8; LEN_PREFIX_SIZE];
    len_bytes.copy_from_slice(&data[..LEN_PREFIX_SIZE]);
    let len = u32::from_le_bytes(len_bytes) as usize;

    let remainder = &data[LEN_PREFIX_SIZE..];
    if len > remainder.len() {
        return Err(OnionError::MalformedFrame(format!(
            "blob length {len} overruns the {}-byte frame",
            data.len()
        )));
    }

    let blob = &remainder[..len];
    let metadata = serde_json::from_slice(&remainder[len..])
        .map_err(|e| OnionError::MalformedFrame(format!("metadata is not valid JSON: {e}")))?;
    Ok((blob, metadata))
}
