//! Master-node key material.
//!
//! A master node carries three distinct 32-byte key families:
//!
//! - **legacy** — the primary registration key; an Ed25519-curve scalar
//!   whose public key is derived *without* clamping
//! - **Ed25519** — the signing key, also the identity used to address a
//!   node (`<base32z>.mnode`)
//! - **X25519** — the key-agreement key used by channel encryption
//!
//! The six newtypes are deliberately non-interchangeable. Every public key
//! parses from raw bytes, hex, base64, or base32z (detected by length,
//! then character set) and formats as lowercase hex.

use std::fmt;

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use data_encoding::Encoding;
use data_encoding_macro::new_encoding;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// Size of every key in this module, in bytes.
pub const KEY_SIZE: usize = 32;

/// The z-base-32 encoding used for `.mnode` addresses.
pub const BASE32Z: Encoding = new_encoding! {
    symbols: "ybndrfg8ejkmcpqxot1uwisza345h769",
};

fn bytes_from_hex(hex: &str) -> Result<[u8; KEY_SIZE]> {
    if hex.len() != 2 * KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: 2 * KEY_SIZE,
            actual: hex.len(),
        });
    }
    let decoded =
        hex::decode(hex).map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}

fn bytes_from_slice(input: &[u8]) -> Result<[u8; KEY_SIZE]> {
    if input.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: input.len(),
        });
    }
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(input);
    Ok(bytes)
}

/// Auto-detect the encoding of `input` by length, then validate the
/// character set: 32 raw bytes, 64 hex chars, 43- or 44-char base64 (the
/// 44-char form must be `=`-padded), or 52-char base32z.
fn parse_any_bytes(input: &[u8]) -> Option<[u8; KEY_SIZE]> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
    use base64::Engine;

    match input.len() {
        KEY_SIZE => bytes_from_slice(input).ok(),
        64 => {
            let text = std::str::from_utf8(input).ok()?;
            bytes_from_hex(text).ok()
        }
        43 => {
            let text = std::str::from_utf8(input).ok()?;
            let decoded = STANDARD_NO_PAD.decode(text).ok()?;
            bytes_from_slice(&decoded).ok()
        }
        44 => {
            let text = std::str::from_utf8(input).ok()?;
            if !text.ends_with('=') {
                return None;
            }
            let decoded = STANDARD.decode(text).ok()?;
            bytes_from_slice(&decoded).ok()
        }
        52 => {
            let text = std::str::from_utf8(input).ok()?;
            let decoded = BASE32Z.decode(text.as_bytes()).ok()?;
            bytes_from_slice(&decoded).ok()
        }
        _ => None,
    }
}

macro_rules! pubkey_newtype {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name([u8; KEY_SIZE]);

        impl $name {
            /// Construct from exactly 32 raw bytes.
            pub fn from_bytes(input: &[u8]) -> Result<Self> {
                bytes_from_slice(input).map(Self)
            }

            /// Construct from 64 lowercase or uppercase hex characters.
            pub fn from_hex(hex: &str) -> Result<Self> {
                bytes_from_hex(hex).map(Self)
            }

            /// Parse raw bytes, hex, base64, or base32z, detected by
            /// length then character set. Unrecognized input logs a
            /// warning and yields the all-zero key; callers that care
            /// check [`Self::is_zero`].
            pub fn parse_any(input: &[u8]) -> Self {
                match parse_any_bytes(input) {
                    Some(bytes) => Self(bytes),
                    None => {
                        tracing::warn!(
                            len = input.len(),
                            key_type = stringify!($name),
                            "invalid public key: not raw bytes, hex, base64, or base32z"
                        );
                        Self([0u8; KEY_SIZE])
                    }
                }
            }

            /// The raw key bytes.
            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }

            /// The raw key bytes, by value.
            pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
                self.0
            }

            /// Lowercase hex, 64 characters.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// True for the all-zero sentinel produced by a failed
            /// [`Self::parse_any`].
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; KEY_SIZE]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        // Debug keeps the first 8 hex chars so peer identities never land
        // in logs in full.
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({}…)"), &self.to_hex()[..8])
            }
        }
    };
}

macro_rules! seckey_newtype {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Zeroize)]
        #[zeroize(drop)]
        pub struct $name([u8; KEY_SIZE]);

        impl $name {
            /// Construct from exactly 32 raw bytes.
            pub fn from_bytes(input: &[u8]) -> Result<Self> {
                bytes_from_slice(input).map(Self)
            }

            /// Construct from 64 hex characters.
            pub fn from_hex(hex: &str) -> Result<Self> {
                bytes_from_hex(hex).map(Self)
            }

            /// The raw secret bytes.
            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(…)"))
            }
        }
    };
}

pubkey_newtype! {
    /// The primary (registration) public key of a master node.
    LegacyPubkey
}
pubkey_newtype! {
    /// A master node's Ed25519 signing/identity public key.
    Ed25519Pubkey
}
pubkey_newtype! {
    /// A master node's X25519 key-agreement public key.
    X25519Pubkey
}

seckey_newtype! {
    /// The secret half of a [`LegacyPubkey`].
    LegacySeckey
}
seckey_newtype! {
    /// The secret half of an [`Ed25519Pubkey`].
    Ed25519Seckey
}
seckey_newtype! {
    /// The secret half of an [`X25519Pubkey`].
    X25519Seckey
}

impl Ed25519Pubkey {
    /// The node address form: `<base32z>.mnode`.
    pub fn mnode_address(&self) -> String {
        let mut addr = BASE32Z.encode(&self.0);
        addr.push_str(".mnode");
        addr
    }
}

impl LegacySeckey {
    /// Derive the public key: scalar · Ed25519 basepoint, **without**
    /// clamping (the legacy registration keys predate the X25519 key
    /// hierarchy and were never clamped).
    pub fn pubkey(&self) -> LegacyPubkey {
        let scalar = Scalar::from_bytes_mod_order(self.0);
        let point = EdwardsPoint::mul_base(&scalar);
        LegacyPubkey(point.compress().to_bytes())
    }
}

impl Ed25519Seckey {
    /// Derive the public key via the standard Ed25519 signing-key path.
    pub fn pubkey(&self) -> Ed25519Pubkey {
        let signing = ed25519_dalek::SigningKey::from_bytes(&self.0);
        Ed25519Pubkey(signing.verifying_key().to_bytes())
    }
}

impl X25519Seckey {
    /// Generate a fresh random secret. Used for the per-layer ephemeral
    /// keys of onion requests.
    pub fn generate() -> Self {
        let secret = x25519_dalek::StaticSecret::random_from_rng(rand::rngs::OsRng);
        Self(secret.to_bytes())
    }

    /// Derive the public key: clamped scalar · Curve25519 basepoint.
    pub fn pubkey(&self) -> X25519Pubkey {
        let secret = x25519_dalek::StaticSecret::from(self.0);
        X25519Pubkey(x25519_dalek::PublicKey::from(&secret).to_bytes())
    }
}
