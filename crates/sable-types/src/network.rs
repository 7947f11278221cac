//! Peer descriptors.

use sable_crypto::keys::{Ed25519Pubkey, LegacyPubkey, X25519Pubkey};

/// What the swarm lookup oracle knows about one master node: enough to
/// encrypt to it and to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// The peer's X25519 key-agreement key.
    pub x25519: X25519Pubkey,
    /// Transport address, `host:port`.
    pub address: String,
}

/// A full peer record as published in the master-node list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// The primary (registration) pubkey the node is known by.
    pub legacy: LegacyPubkey,
    /// Signing/identity key; onion routing addresses hops by this key.
    pub ed25519: Ed25519Pubkey,
    /// Key-agreement key.
    pub x25519: X25519Pubkey,
    /// Transport address, `host:port`.
    pub address: String,
}

impl PeerRecord {
    /// The subset the onion dispatcher consumes.
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            x25519: self.x25519,
            address: self.address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_projects_to_info() {
        let record = PeerRecord {
            legacy: LegacyPubkey::from_bytes(&[1u8; 32]).expect("valid"),
            ed25519: Ed25519Pubkey::from_bytes(&[2u8; 32]).expect("valid"),
            x25519: X25519Pubkey::from_bytes(&[3u8; 32]).expect("valid"),
            address: "10.0.0.1:22021".to_string(),
        };
        let info = record.info();
        assert_eq!(info.x25519, record.x25519);
        assert_eq!(info.address, record.address);
    }
}
