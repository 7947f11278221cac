//! User public keys.
//!
//! A user is identified by a network-id byte plus a 32-byte public key.
//! On mainnet the textual form is always the 66-hex-char prefixed form;
//! testnet additionally accepts the historical short forms without the
//! network byte, which load with network id 5.

use sable_crypto::keys::KEY_SIZE;

use crate::Network;

/// Size of the prefixed raw form: network byte plus identity.
pub const USER_PUBKEY_SIZE_BYTES: usize = 1 + KEY_SIZE;
/// Size of the prefixed hex form.
pub const USER_PUBKEY_SIZE_HEX: usize = 2 * USER_PUBKEY_SIZE_BYTES;

/// Network id assigned to user keys loaded from the testnet short forms.
const TESTNET_SHORT_FORM_NETID: u8 = 5;
/// Network id of the invalid sentinel.
const INVALID_NETID: u8 = 0xFF;

fn is_hex(input: &[u8]) -> bool {
    !input.is_empty() && input.iter().all(u8::is_ascii_hexdigit)
}

/// A user public key: `(network id, 32-byte identity)`.
///
/// Immutable once loaded. Unparseable input yields the invalid sentinel
/// (`network = 0xFF`, empty identity), which all accessors render empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserPubkey {
    network: u8,
    pubkey: Vec<u8>,
}

impl UserPubkey {
    /// Classify and load `input`, which may be text or raw bytes:
    ///
    /// - 66 hex chars: network byte followed by the identity
    /// - 33 raw bytes: same layout
    /// - testnet only, 64 hex chars or 32 raw bytes: identity alone,
    ///   network id 5
    /// - anything else: the invalid sentinel
    pub fn load(input: &[u8], network: Network) -> Self {
        if input.len() == USER_PUBKEY_SIZE_HEX && is_hex(input) {
            let decoded = hex::decode(input).expect("validated hex");
            Self {
                network: decoded[0],
                pubkey: decoded[1..].to_vec(),
            }
        } else if input.len() == USER_PUBKEY_SIZE_BYTES {
            Self {
                network: input[0],
                pubkey: input[1..].to_vec(),
            }
        } else if !network.is_mainnet() && input.len() == USER_PUBKEY_SIZE_HEX - 2 && is_hex(input)
        {
            Self {
                network: TESTNET_SHORT_FORM_NETID,
                pubkey: hex::decode(input).expect("validated hex"),
            }
        } else if !network.is_mainnet() && input.len() == USER_PUBKEY_SIZE_BYTES - 1 {
            Self {
                network: TESTNET_SHORT_FORM_NETID,
                pubkey: input.to_vec(),
            }
        } else {
            Self {
                network: INVALID_NETID,
                pubkey: Vec::new(),
            }
        }
    }

    /// Whether the key loaded successfully.
    pub fn is_valid(&self) -> bool {
        !self.pubkey.is_empty()
    }

    /// The network-id byte.
    pub fn network(&self) -> u8 {
        self.network
    }

    /// The 32-byte identity as lowercase hex, without the network prefix.
    pub fn hex(&self) -> String {
        hex::encode(&self.pubkey)
    }

    /// The prefixed hex form. The network byte is omitted only for
    /// network id 0 on testnet (the historical short form).
    pub fn prefixed_hex(&self, network: Network) -> String {
        if self.pubkey.is_empty() {
            return String::new();
        }
        let mut out = String::with_capacity(USER_PUBKEY_SIZE_HEX);
        if !(self.network == 0 && !network.is_mainnet()) {
            out.push_str(&hex::encode([self.network]));
        }
        out.push_str(&hex::encode(&self.pubkey));
        out
    }

    /// The prefixed raw form: network byte plus identity, unconditionally.
    pub fn prefixed_raw(&self) -> Vec<u8> {
        if self.pubkey.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(USER_PUBKEY_SIZE_BYTES);
        out.push(self.network);
        out.extend_from_slice(&self.pubkey);
        out
    }
}
