//! Peer table and outbound clients.
//!
//! The swarm membership oracle proper lives in the node's registration
//! layer; this daemon consumes a static table loaded from configuration
//! and answers lookups from memory.

use std::collections::HashMap;

use async_trait::async_trait;
use sable_crypto::keys::Ed25519Pubkey;
use sable_onion::transfer::OnionTransfer;
use sable_onion::{OnionError, Result};
use sable_types::network::{PeerInfo, PeerRecord};

use crate::dispatch::{PeerLookup, PeerSender, ProxyClient};

/// In-memory peer table keyed by Ed25519 identity.
pub struct StaticPeerLookup {
    peers: HashMap<Ed25519Pubkey, PeerInfo>,
}

impl StaticPeerLookup {
    pub fn new(records: impl IntoIterator<Item = PeerRecord>) -> Self {
        Self {
            peers: records
                .into_iter()
                .map(|record| (record.ed25519, record.info()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl PeerLookup for StaticPeerLookup {
    fn lookup(&self, ed25519: &Ed25519Pubkey) -> Option<PeerInfo> {
        self.peers.get(ed25519).cloned()
    }
}

/// Forwards transfer dicts to the next hop's transfer ingress over HTTP.
///
/// Stands in for the message-queue transport, which carries the same
/// bencoded payload as the `mn.onion_req_v2` command.
pub struct HttpPeerSender {
    client: reqwest::Client,
}

impl HttpPeerSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpPeerSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerSender for HttpPeerSender {
    async fn send_transfer(&self, peer: &PeerInfo, transfer: OnionTransfer) -> Result<Vec<u8>> {
        let url = format!("http://{}/onion_transfer/v2", peer.address);
        let response = self
            .client
            .post(&url)
            .body(transfer.encode())
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(address = %peer.address, error = %e, "next hop unreachable");
                OnionError::UpstreamTimeout
            })?;
        let body = response
            .bytes()
            .await
            .map_err(|_| OnionError::UpstreamTimeout)?;
        Ok(body.to_vec())
    }
}

/// Outbound HTTP(S) client for proxy terminals.
pub struct ReqwestProxyClient {
    client: reqwest::Client,
}

impl ReqwestProxyClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestProxyClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxyClient for ReqwestProxyClient {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let response = self.client.post(url).body(body).send().await.map_err(|e| {
            tracing::debug!(url, error = %e, "proxy target unreachable");
            OnionError::UpstreamTimeout
        })?;
        let body = response
            .bytes()
            .await
            .map_err(|_| OnionError::UpstreamTimeout)?;
        Ok(body.to_vec())
    }
}
