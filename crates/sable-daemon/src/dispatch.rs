//! The request dispatcher.
//!
//! Order of operations for every inbound request: rate limit, peel one
//! layer, then act on the classification: relay to the next master node,
//! hand the request to the local handler, or make the outbound proxy
//! call. Terminal responses are encrypted once against the requester's
//! ephemeral key; forwarded and proxied responses pass through opaquely.
//!
//! All awaits run under a 30-second deadline. A hop that times out is
//! reported as [`OnionError::UpstreamTimeout`] to the previous hop; the
//! already-sent blob is not rolled back, peers tolerate orphans.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sable_crypto::channel::ChannelEncryption;
use sable_crypto::keys::{Ed25519Pubkey, LegacyPubkey};
use sable_onion::peel::{peel, peel_layer, HopAction, PeeledOnion, ReplyKey};
use sable_onion::transfer::OnionTransfer;
use sable_onion::{OnionError, Result};
use sable_ratelimit::RateLimiter;
use sable_types::network::PeerInfo;

/// Wall-clock deadline for one request, measured from entry.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Who sent the request: a client over HTTPS, keyed by IPv4 address, or
/// another master node, keyed by its legacy pubkey.
#[derive(Debug, Clone)]
pub enum ClientSource {
    Ip(Ipv4Addr),
    Peer(LegacyPubkey),
}

/// The swarm lookup oracle: resolves a hop's Ed25519 identity to its
/// X25519 key and transport address. Implementations answer from cache
/// and never block.
pub trait PeerLookup: Send + Sync {
    fn lookup(&self, ed25519: &Ed25519Pubkey) -> Option<PeerInfo>;
}

/// Delivers a transfer dict to the next hop and returns its opaque reply.
#[async_trait]
pub trait PeerSender: Send + Sync {
    async fn send_transfer(&self, peer: &PeerInfo, transfer: OnionTransfer) -> Result<Vec<u8>>;
}

/// Handles a terminal client request on this node.
#[async_trait]
pub trait LocalHandler: Send + Sync {
    async fn handle(&self, request: &[u8]) -> Result<Vec<u8>>;
}

/// Makes the outbound HTTP(S) request of a proxy terminal.
#[async_trait]
pub trait ProxyClient: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// Routes peeled onion requests to their destinations.
pub struct Dispatcher {
    channel: ChannelEncryption,
    limiter: Arc<RateLimiter>,
    peers: Arc<dyn PeerLookup>,
    sender: Arc<dyn PeerSender>,
    local: Arc<dyn LocalHandler>,
    proxy: Arc<dyn ProxyClient>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(
        channel: ChannelEncryption,
        limiter: Arc<RateLimiter>,
        peers: Arc<dyn PeerLookup>,
        sender: Arc<dyn PeerSender>,
        local: Arc<dyn LocalHandler>,
        proxy: Arc<dyn ProxyClient>,
    ) -> Self {
        Self {
            channel,
            limiter,
            peers,
            sender,
            local,
            proxy,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Override the per-request deadline (tests use short ones).
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Entry-point for `POST /onion_req/v2`: the outer frame from a
    /// client, hop number zero.
    pub async fn handle_onion_request(
        &self,
        frame: &[u8],
        source: ClientSource,
    ) -> Result<Vec<u8>> {
        self.admit(&source)?;
        let peeled = peel(&self.channel, frame, 0)?;
        self.run(peeled, Default::default()).await
    }

    /// Entry-point for the inter-node transfer command: a bencoded dict
    /// from the previous hop.
    pub async fn handle_transfer(&self, wire: &[u8], source: ClientSource) -> Result<Vec<u8>> {
        self.admit(&source)?;
        let transfer = OnionTransfer::decode(wire)?;
        let peeled = peel_layer(
            &self.channel,
            &transfer.data,
            transfer.ephemeral_key,
            transfer.enc_type,
            transfer.hop_no,
        )?;
        self.run(peeled, transfer.extra).await
    }

    /// The rate limiter is the sole backpressure mechanism and runs
    /// before any onion processing.
    fn admit(&self, source: &ClientSource) -> Result<()> {
        let now = Instant::now();
        let limited = match source {
            ClientSource::Ip(ip) => self.limiter.should_rate_limit_client(u32::from(*ip), now),
            ClientSource::Peer(peer) => self.limiter.should_rate_limit(peer, now),
        };
        if limited {
            return Err(OnionError::RateLimited);
        }
        Ok(())
    }

    async fn run(
        &self,
        peeled: PeeledOnion,
        extra: std::collections::BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let reply = peeled.reply;
        match peeled.action {
            HopAction::Forward {
                destination,
                ephemeral_key,
                enc_type,
                hop_no,
                blob,
            } => {
                let peer = self
                    .peers
                    .lookup(&destination)
                    .ok_or_else(|| OnionError::PeerUnknown(format!("{destination:?}")))?;
                let transfer = OnionTransfer {
                    data: blob,
                    ephemeral_key,
                    enc_type,
                    hop_no,
                    extra,
                };
                tracing::debug!(next = ?destination, hop_no, "forwarding onion request");
                self.bounded(self.sender.send_transfer(&peer, transfer)).await
            }
            HopAction::TerminalLocal { request } => {
                let response = self.bounded(self.local.handle(&request)).await?;
                self.encrypt_reply(&reply, &response)
            }
            HopAction::TerminalProxy {
                host,
                target,
                port,
                protocol,
                payload,
            } => {
                let scheme = protocol.as_deref().unwrap_or("https");
                let url = match port {
                    Some(port) => format!("{scheme}://{host}:{port}{target}"),
                    None => format!("{scheme}://{host}{target}"),
                };
                tracing::debug!(url, "proxying onion request");
                self.bounded(self.proxy.post(&url, payload)).await
            }
        }
    }

    /// Exit-node response encryption: one layer against the requester's
    /// ephemeral key, same scheme the request arrived under.
    fn encrypt_reply(&self, reply: &ReplyKey, response: &[u8]) -> Result<Vec<u8>> {
        Ok(self
            .channel
            .encrypt(reply.enc_type, response, &reply.ephemeral)?)
    }

    async fn bounded<F>(&self, fut: F) -> Result<Vec<u8>>
    where
        F: std::future::Future<Output = Result<Vec<u8>>>,
    {
        tokio::time::timeout(self.deadline, fut)
            .await
            .map_err(|_| OnionError::UpstreamTimeout)?
    }
}
