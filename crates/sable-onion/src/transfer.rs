//! The inter-node forwarding payload.
//!
//! When one master node forwards an onion request to the next hop it
//! sends a bencoded dict rather than JSON:
//!
//! ```text
//! { "d": <blob>, "ek": <raw 32-byte ephemeral pubkey>,
//!   "et": <scheme token>, "nh": <hop number>, ... }
//! ```
//!
//! Unknown keys are carried through intact so client metadata survives
//! the trip; `encode` and `decode` are inverse over valid inputs.

use std::collections::BTreeMap;
use std::str::FromStr;

use sable_crypto::channel::EncryptType;
use sable_crypto::keys::X25519Pubkey;

use crate::bencode::{self, Value};
use crate::{OnionError, Result};

const KEY_DATA: &[u8] = b"d";
const KEY_EPHEMERAL: &[u8] = b"ek";
const KEY_ENC_TYPE: &[u8] = b"et";
const KEY_HOP_NO: &[u8] = b"nh";

/// One hop-to-hop transfer of an onion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnionTransfer {
    /// The still-encrypted onion blob for the receiving node.
    pub data: Vec<u8>,
    /// Ephemeral key the receiving node decrypts against.
    pub ephemeral_key: X25519Pubkey,
    /// Scheme the blob is encrypted under.
    pub enc_type: EncryptType,
    /// Hop number, incremented at each hop.
    pub hop_no: u8,
    /// Pass-through client metadata (byte-string values only).
    pub extra: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl OnionTransfer {
    /// Serialize to the bencoded wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut entries = BTreeMap::new();
        entries.insert(KEY_DATA.to_vec(), Value::Bytes(self.data.clone()));
        entries.insert(
            KEY_EPHEMERAL.to_vec(),
            Value::Bytes(self.ephemeral_key.to_bytes().to_vec()),
        );
        entries.insert(
            KEY_ENC_TYPE.to_vec(),
            Value::Bytes(self.enc_type.as_str().as_bytes().to_vec()),
        );
        entries.insert(KEY_HOP_NO.to_vec(), Value::Int(i64::from(self.hop_no)));
        for (key, value) in &self.extra {
            entries
                .entry(key.clone())
                .or_insert_with(|| Value::Bytes(value.clone()));
        }
        bencode::encode(&Value::Dict(entries))
    }

    /// Parse the bencoded wire form.
    pub fn decode(input: &[u8]) -> Result<Self> {
        let Value::Dict(mut entries) = bencode::decode(input)? else {
            return Err(OnionError::MalformedBencode(
                "transfer is not a dict".into(),
            ));
        };

        let data = take_bytes(&mut entries, KEY_DATA, "d")?;
        let ek = take_bytes(&mut entries, KEY_EPHEMERAL, "ek")?;
        let ephemeral_key = X25519Pubkey::from_bytes(&ek)
            .map_err(|e| OnionError::InvalidKey(format!("ephemeral key: {e}")))?;

        let et = take_bytes(&mut entries, KEY_ENC_TYPE, "et")?;
        let et = std::str::from_utf8(&et)
            .map_err(|_| OnionError::MalformedBencode("non-UTF-8 enc_type".into()))?
            .to_owned();
        let enc_type = EncryptType::from_str(&et)
            .map_err(|_| OnionError::MalformedBencode(format!("unknown enc_type {et:?}")))?;

        let hop_no = match entries.remove(KEY_HOP_NO) {
            None => 0,
            Some(Value::Int(n)) if (0..=i64::from(u8::MAX)).contains(&n) => n as u8,
            Some(other) => {
                return Err(OnionError::MalformedBencode(format!(
                    "hop number {other:?} out of range"
                )))
            }
        };

        let mut extra = BTreeMap::new();
        for (key, value) in entries {
            let Value::Bytes(bytes) = value else {
                return Err(OnionError::MalformedBencode(format!(
                    "extra key {:?} is not a byte string",
                    String::from_utf8_lossy(&key)
                )));
            };
            extra.insert(key, bytes);
        }

        Ok(Self {
            data,
            ephemeral_key,
            enc_type,
            hop_no,
            extra,
        })
    }
}

fn take_bytes(
    entries: &mut BTreeMap<Vec<u8>, Value>,
    key: &[u8],
    name: &'static str,
) -> Result<Vec<u8>> {
    match entries.remove(key) {
        Some(Value::Bytes(bytes)) => Ok(bytes),
        Some(_) => Err(OnionError::MalformedBencode(format!(
            "field {name:?} is not a byte string"
        ))),
        None => Err(OnionError::MissingField(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OnionTransfer {
        OnionTransfer {
            data: b"opaque encrypted blob".to_vec(),
            ephemeral_key: X25519Pubkey::from_bytes(&[9u8; 32]).expect("valid"),
            enc_type: EncryptType::XChaCha20,
            hop_no: 3,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let transfer = sample();
        let decoded = OnionTransfer::decode(&transfer.encode()).expect("decode");
        assert_eq!(decoded, transfer);
    }

    #[test]
    fn test_roundtrip_with_extra_keys() {
        let mut transfer = sample();
        transfer
            .extra
            .insert(b"headers".to_vec(), b"[]".to_vec());
        transfer
            .extra
            .insert(b"target".to_vec(), b"/beldex/lsrpc".to_vec());

        let wire = transfer.encode();
        let decoded = OnionTransfer::decode(&wire).expect("decode");
        assert_eq!(decoded, transfer);
        // Byte-for-byte inverse.
        assert_eq!(decoded.encode(), wire);
    }

    #[test]
    fn test_extra_keys_cannot_shadow_required_fields() {
        let mut transfer = sample();
        transfer.extra.insert(b"ek".to_vec(), b"junk".to_vec());
        let decoded = OnionTransfer::decode(&transfer.encode()).expect("decode");
        assert_eq!(decoded.ephemeral_key, transfer.ephemeral_key);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let transfer = sample();
        for field in ["d", "ek", "et"] {
            let Value::Dict(mut entries) =
                bencode::decode(&transfer.encode()).expect("decode")
            else {
                panic!("expected dict");
            };
            entries.remove(field.as_bytes());
            let wire = bencode::encode(&Value::Dict(entries));
            assert!(
                matches!(OnionTransfer::decode(&wire), Err(OnionError::MissingField(f)) if f == field),
                "missing {field} not reported"
            );
        }
    }

    #[test]
    fn test_absent_hop_number_defaults_to_zero() {
        let transfer = sample();
        let Value::Dict(mut entries) = bencode::decode(&transfer.encode()).expect("decode")
        else {
            panic!("expected dict");
        };
        entries.remove(&b"nh"[..]);
        let wire = bencode::encode(&Value::Dict(entries));
        assert_eq!(OnionTransfer::decode(&wire).expect("decode").hop_no, 0);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            OnionTransfer::decode(b"not bencode"),
            Err(OnionError::MalformedBencode(_))
        ));
        assert!(matches!(
            OnionTransfer::decode(b"i42e"),
            Err(OnionError::MalformedBencode(_))
        ));
    }

    #[test]
    fn test_bad_ephemeral_key_rejected() {
        let wire = bencode::encode(&Value::Dict(
            [
                (b"d".to_vec(), Value::Bytes(vec![])),
                (b"ek".to_vec(), Value::Bytes(vec![1, 2, 3])),
                (
                    b"et".to_vec(),
                    Value::Bytes(b"aes-gcm".to_vec()),
                ),
            ]
            .into_iter()
            .collect(),
        ));
        assert!(matches!(
            OnionTransfer::decode(&wire),
            Err(OnionError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_hop_number_range_checked() {
        let wire = bencode::encode(&Value::Dict(
            [
                (b"d".to_vec(), Value::Bytes(vec![])),
                (b"ek".to_vec(), Value::Bytes(vec![0u8; 32])),
                (b"et".to_vec(), Value::Bytes(b"aes-gcm".to_vec())),
                (b"nh".to_vec(), Value::Int(-1)),
            ]
            .into_iter()
            .collect(),
        ));
        assert!(OnionTransfer::decode(&wire).is_err());
    }
}
