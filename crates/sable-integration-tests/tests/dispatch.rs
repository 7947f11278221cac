//! Integration test: a simulated mesh of dispatching master nodes.
//!
//! Each node gets a full dispatcher; the peer-sender delivers transfer
//! dicts to the next node's dispatcher in process, so a client request
//! travels entry → relay → exit and the exit's reply rides all the way
//! back, exactly as it would across real transports.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sable_crypto::channel::{ChannelEncryption, EncryptType};
use sable_crypto::keys::{Ed25519Pubkey, LegacyPubkey, X25519Pubkey, X25519Seckey};
use sable_daemon::dispatch::{
    ClientSource, Dispatcher, LocalHandler, PeerLookup, PeerSender, ProxyClient,
};
use sable_onion::build::{build_request, PathHop};
use sable_onion::transfer::OnionTransfer;
use sable_onion::{OnionError, Result};
use sable_ratelimit::RateLimiter;
use sable_types::network::PeerInfo;
use serde_json::json;

/// Routes transfers to the target node's dispatcher by address.
#[derive(Default)]
struct MeshSender {
    nodes: Mutex<HashMap<String, Arc<Dispatcher>>>,
}

impl MeshSender {
    fn register(&self, address: &str, dispatcher: Arc<Dispatcher>) {
        self.nodes
            .lock()
            .expect("mesh lock")
            .insert(address.to_owned(), dispatcher);
    }
}

#[async_trait]
impl PeerSender for MeshSender {
    async fn send_transfer(&self, peer: &PeerInfo, transfer: OnionTransfer) -> Result<Vec<u8>> {
        let next = self
            .nodes
            .lock()
            .expect("mesh lock")
            .get(&peer.address)
            .cloned()
            .ok_or(OnionError::UpstreamTimeout)?;
        let sender = LegacyPubkey::from_bytes(&[0xEE; 32]).expect("valid");
        next.handle_transfer(&transfer.encode(), ClientSource::Peer(sender))
            .await
    }
}

struct Table(HashMap<Ed25519Pubkey, PeerInfo>);

impl PeerLookup for Table {
    fn lookup(&self, ed25519: &Ed25519Pubkey) -> Option<PeerInfo> {
        self.0.get(ed25519).cloned()
    }
}

struct EchoHandler;

#[async_trait]
impl LocalHandler for EchoHandler {
    async fn handle(&self, request: &[u8]) -> Result<Vec<u8>> {
        let mut reply = b"handled:".to_vec();
        reply.extend_from_slice(request);
        Ok(reply)
    }
}

#[derive(Default)]
struct CapturingProxy {
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl ProxyClient for CapturingProxy {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        self.calls
            .lock()
            .expect("proxy lock")
            .push((url.to_owned(), body));
        Ok(b"proxy response".to_vec())
    }
}

struct Mesh {
    dispatchers: Vec<Arc<Dispatcher>>,
    hops: Vec<PathHop>,
    proxy: Arc<CapturingProxy>,
}

/// Build `len` interconnected nodes, each knowing every other node.
fn make_mesh(len: usize) -> Mesh {
    let keys: Vec<X25519Seckey> = (0..len).map(|_| X25519Seckey::generate()).collect();
    let hops: Vec<PathHop> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let mut ed = [0u8; 32];
            ed[0] = i as u8 + 1;
            PathHop {
                ed25519: Ed25519Pubkey::from_bytes(&ed).expect("valid"),
                x25519: key.pubkey(),
            }
        })
        .collect();

    let table: HashMap<Ed25519Pubkey, PeerInfo> = hops
        .iter()
        .enumerate()
        .map(|(i, hop)| {
            (
                hop.ed25519,
                PeerInfo {
                    x25519: hop.x25519,
                    address: format!("node-{i}"),
                },
            )
        })
        .collect();

    let mesh_sender = Arc::new(MeshSender::default());
    let proxy = Arc::new(CapturingProxy::default());
    let mut dispatchers = Vec::with_capacity(len);
    for (i, key) in keys.into_iter().enumerate() {
        let pubkey = key.pubkey();
        let dispatcher = Arc::new(Dispatcher::new(
            ChannelEncryption::new(key, pubkey, true),
            Arc::new(RateLimiter::new()),
            Arc::new(Table(table.clone())),
            mesh_sender.clone(),
            Arc::new(EchoHandler),
            proxy.clone(),
        ));
        mesh_sender.register(&format!("node-{i}"), dispatcher.clone());
        dispatchers.push(dispatcher);
    }

    Mesh {
        dispatchers,
        hops,
        proxy,
    }
}

fn client() -> ClientSource {
    ClientSource::Ip(Ipv4Addr::new(10, 0, 0, 1))
}

#[tokio::test]
async fn three_hop_request_through_the_mesh() {
    let mesh = make_mesh(3);
    let payload = br#"{"method":"ping"}"#;
    let request = build_request(
        &mesh.hops,
        payload,
        &json!({"headers": []}),
        Some(EncryptType::AesGcm),
    )
    .expect("build");

    let reply = mesh.dispatchers[0]
        .handle_onion_request(&request.blob, client())
        .await
        .expect("dispatch");

    // The exit encrypted once; relays passed the reply through opaquely.
    assert_eq!(
        request.decrypt_response(&reply),
        br#"handled:{"method":"ping"}"#
    );
}

#[tokio::test]
async fn mixed_scheme_request_through_the_mesh() {
    let mesh = make_mesh(4);
    let request = build_request(
        &mesh.hops,
        b"mixed scheme payload",
        &json!({"headers": []}),
        None,
    )
    .expect("build");

    let reply = mesh.dispatchers[0]
        .handle_onion_request(&request.blob, client())
        .await
        .expect("dispatch");
    assert_eq!(
        request.decrypt_response(&reply),
        b"handled:mixed scheme payload"
    );
}

#[tokio::test]
async fn proxy_exit_through_the_mesh() {
    let mesh = make_mesh(2);
    let request = build_request(
        &mesh.hops,
        b"post body",
        &json!({"host": "example.com", "target": "/beldex/lsrpc"}),
        Some(EncryptType::XChaCha20),
    )
    .expect("build");

    let reply = mesh.dispatchers[0]
        .handle_onion_request(&request.blob, client())
        .await
        .expect("dispatch");
    // Proxy responses come back untouched.
    assert_eq!(reply, b"proxy response");

    let calls = mesh.proxy.calls.lock().expect("proxy lock");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "https://example.com/beldex/lsrpc");
    assert_eq!(calls[0].1, b"post body");
}

#[tokio::test]
async fn hop_limit_drops_without_outbound_traffic() {
    let mesh = make_mesh(2);
    let transfer = OnionTransfer {
        data: b"never decrypted".to_vec(),
        ephemeral_key: X25519Pubkey::from_bytes(&[3u8; 32]).expect("valid"),
        enc_type: EncryptType::AesGcm,
        hop_no: 16,
        extra: Default::default(),
    };

    let result = mesh.dispatchers[0]
        .handle_transfer(
            &transfer.encode(),
            ClientSource::Peer(LegacyPubkey::from_bytes(&[0xAA; 32]).expect("valid")),
        )
        .await;
    assert!(matches!(result, Err(OnionError::HopLimitExceeded(16))));
    assert!(mesh.proxy.calls.lock().expect("proxy lock").is_empty());
}

#[tokio::test]
async fn burst_hits_rate_limit_before_the_codec() {
    // One node with a bucket that never refills, emulating a 100 ms burst
    // faster than any refill tick.
    let seckey = X25519Seckey::generate();
    let pubkey = seckey.pubkey();
    let hop = PathHop {
        ed25519: Ed25519Pubkey::from_bytes(&[1u8; 32]).expect("valid"),
        x25519: pubkey,
    };
    let dispatcher = Dispatcher::new(
        ChannelEncryption::new(seckey, pubkey, true),
        Arc::new(RateLimiter::with_limits(
            0.0,
            sable_ratelimit::BUCKET_SIZE,
            sable_ratelimit::MAX_CLIENTS,
        )),
        Arc::new(Table(HashMap::new())),
        Arc::new(MeshSender::default()),
        Arc::new(EchoHandler),
        Arc::new(CapturingProxy::default()),
    );

    let request = build_request(
        &[hop],
        br#"{"method":"ping"}"#,
        &json!({"headers": []}),
        Some(EncryptType::XChaCha20),
    )
    .expect("build");

    let ip = ClientSource::Ip(Ipv4Addr::new(10, 0, 0, 1));
    for i in 0..sable_ratelimit::BUCKET_SIZE as usize {
        dispatcher
            .handle_onion_request(&request.blob, ip.clone())
            .await
            .unwrap_or_else(|e| panic!("request {i} rejected: {e}"));
    }

    // The 601st request never reaches the codec: garbage that would fail
    // frame parsing still reports only the rate limit.
    let result = dispatcher.handle_onion_request(b"garbage", ip).await;
    assert!(matches!(result, Err(OnionError::RateLimited)));

    // A different client is unaffected.
    let other = ClientSource::Ip(Ipv4Addr::new(10, 0, 0, 2));
    assert!(dispatcher
        .handle_onion_request(&request.blob, other)
        .await
        .is_ok());
}
