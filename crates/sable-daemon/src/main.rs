//! sabled: the sable storage-server daemon.
//!
//! Wires the onion core together: channel encryption keyed by this
//! node's X25519 key, the rate limiter, the peer table, and the HTTP
//! ingress, then serves until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use sable_crypto::channel::ChannelEncryption;
use sable_crypto::keys::{Ed25519Pubkey, LegacyPubkey, X25519Pubkey, X25519Seckey};
use sable_daemon::config::DaemonConfig;
use sable_daemon::dispatch::Dispatcher;
use sable_daemon::http::{router, AppState};
use sable_daemon::local::InfoResponder;
use sable_daemon::peers::{HttpPeerSender, ReqwestProxyClient, StaticPeerLookup};
use sable_ratelimit::RateLimiter;
use sable_types::network::PeerRecord;
use tracing::info;

/// How often idle rate-limiter buckets are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sable.toml"));
    let config = DaemonConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    info!(network = ?config.network.network, "sable daemon starting");

    // Invalid key material at startup is fatal by design.
    let seckey = X25519Seckey::from_hex(&config.keys.x25519_seckey)
        .context("keys.x25519_seckey is not a valid X25519 secret key")?;
    let pubkey = seckey.pubkey();
    info!(x25519 = %pubkey, "node key loaded");

    let peers = load_peer_table(&config)?;
    info!(peers = peers.len(), "peer table loaded");

    let limiter = Arc::new(RateLimiter::with_limits(
        config.limits.token_rate,
        config.limits.bucket_size,
        config.limits.max_clients,
    ));

    let dispatcher = Dispatcher::new(
        ChannelEncryption::new(seckey, pubkey, true),
        limiter.clone(),
        Arc::new(peers),
        Arc::new(HttpPeerSender::new()),
        Arc::new(InfoResponder::new()),
        Arc::new(ReqwestProxyClient::new()),
    );
    let state = Arc::new(AppState { dispatcher });

    // Sweep refilled buckets so idle identities do not accumulate.
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            limiter.prune(Instant::now());
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.network.listen)
        .await
        .with_context(|| format!("binding {}", config.network.listen))?;
    info!(listen = %config.network.listen, "onion ingress ready");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received, shutting down");
        })
        .await
        .context("ingress server failed")?;

    info!("sable daemon stopped");
    Ok(())
}

fn load_peer_table(config: &DaemonConfig) -> anyhow::Result<StaticPeerLookup> {
    let mut records = Vec::with_capacity(config.network.peers.len());
    for entry in &config.network.peers {
        let record = PeerRecord {
            legacy: LegacyPubkey::from_hex(&entry.legacy)
                .with_context(|| format!("peer {} legacy key", entry.address))?,
            ed25519: Ed25519Pubkey::from_hex(&entry.ed25519)
                .with_context(|| format!("peer {} ed25519 key", entry.address))?,
            x25519: X25519Pubkey::from_hex(&entry.x25519)
                .with_context(|| format!("peer {} x25519 key", entry.address))?,
            address: entry.address.clone(),
        };
        records.push(record);
    }
    Ok(StaticPeerLookup::new(records))
}
