//! # sable-types
//!
//! Shared identity and network types for the sable master-node network.
//!
//! - [`identity`] — user public keys with their network-prefix encodings
//! - [`network`] — peer descriptors returned by the swarm lookup oracle

pub mod identity;
pub mod network;

/// Which network the process participates in.
///
/// This is configuration fixed at startup and passed explicitly into the
/// parsers that need it; there is no process-wide mutable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Mainnet)
    }
}
