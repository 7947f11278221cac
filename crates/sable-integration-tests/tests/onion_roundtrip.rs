//! Integration test: onion request build and peel, no network I/O.
//!
//! Builds requests through chains of 1 to 8 simulated master nodes and
//! walks each hop the way the daemon would: peel the clear-wrapped outer
//! frame at the entry, then peel each forwarded layer against the
//! ephemeral key and scheme named by the previous hop, until the exit
//! classifies the terminal. Also exercises the single-encrypted response
//! path in both its direct and base64 encodings.

use sable_crypto::channel::{ChannelEncryption, EncryptType};
use sable_crypto::keys::{Ed25519Pubkey, X25519Seckey};
use sable_onion::build::{build_request, PathHop};
use sable_onion::peel::{peel, peel_layer, HopAction, PeeledOnion, ReplyKey};
use serde_json::json;

/// A simulated master node: its channel-encryption state and the public
/// half other nodes see.
struct TestNode {
    channel: ChannelEncryption,
    hop: PathHop,
}

fn make_node(tag: u8) -> TestNode {
    let seckey = X25519Seckey::generate();
    let pubkey = seckey.pubkey();
    let mut ed = [0u8; 32];
    ed[0] = tag;
    ed[31] = tag;
    TestNode {
        channel: ChannelEncryption::new(seckey, pubkey, true),
        hop: PathHop {
            ed25519: Ed25519Pubkey::from_bytes(&ed).expect("valid key bytes"),
            x25519: pubkey,
        },
    }
}

fn make_chain(len: usize) -> Vec<TestNode> {
    (0..len).map(|i| make_node(i as u8 + 1)).collect()
}

/// Walk a built request through the whole chain, asserting the forward
/// metadata at every hop, and return the exit node's peel result.
fn walk_chain(nodes: &[TestNode], blob: &[u8]) -> PeeledOnion {
    let mut peeled = peel(&nodes[0].channel, blob, 0).expect("peel at entry");

    for (position, node) in nodes.iter().enumerate().skip(1) {
        let (destination, ephemeral_key, enc_type, hop_no, blob) = match peeled.action {
            HopAction::Forward {
                destination,
                ephemeral_key,
                enc_type,
                hop_no,
                blob,
            } => (destination, ephemeral_key, enc_type, hop_no, blob),
            other => panic!("node {position} expected a forward, got {other:?}"),
        };
        assert_eq!(destination, node.hop.ed25519, "wrong next hop at {position}");
        assert_eq!(hop_no, position as u8, "wrong hop number at {position}");

        peeled = peel_layer(&node.channel, &blob, ephemeral_key, enc_type, hop_no)
            .expect("peel at relay");
    }
    peeled
}

#[test]
fn single_hop_local_terminal() {
    let nodes = make_chain(1);
    let payload = br#"{"method":"ping"}"#;
    let request = build_request(
        &[nodes[0].hop.clone()],
        payload,
        &json!({"headers": []}),
        Some(EncryptType::XChaCha20),
    )
    .expect("build");

    let peeled = walk_chain(&nodes, &request.blob);
    assert_eq!(peeled.reply.enc_type, EncryptType::XChaCha20);
    match peeled.action {
        HopAction::TerminalLocal { request } => assert_eq!(request, payload),
        other => panic!("expected TerminalLocal, got {other:?}"),
    }
}

#[test]
fn three_hop_forward_chain() {
    let nodes = make_chain(3);
    let hops: Vec<_> = nodes.iter().map(|n| n.hop.clone()).collect();
    let payload = br#"{"method":"get_mnodes_for_pubkey"}"#;
    let request = build_request(
        &hops,
        payload,
        &json!({"headers": []}),
        Some(EncryptType::AesGcm),
    )
    .expect("build");

    let peeled = walk_chain(&nodes, &request.blob);
    match peeled.action {
        HopAction::TerminalLocal { request } => assert_eq!(request, payload),
        other => panic!("expected TerminalLocal, got {other:?}"),
    }
}

#[test]
fn chains_of_every_length_and_scheme() {
    for scheme in [
        Some(EncryptType::AesCbc),
        Some(EncryptType::AesGcm),
        Some(EncryptType::XChaCha20),
        None, // independent random scheme per hop
    ] {
        for len in 1..=8 {
            let nodes = make_chain(len);
            let hops: Vec<_> = nodes.iter().map(|n| n.hop.clone()).collect();
            let payload = format!("payload through {len} hops").into_bytes();
            let request = build_request(&hops, &payload, &json!({"headers": []}), scheme)
                .expect("build");

            let peeled = walk_chain(&nodes, &request.blob);
            match peeled.action {
                HopAction::TerminalLocal { request } => {
                    assert_eq!(request, payload, "len {len}, scheme {scheme:?}")
                }
                other => panic!("len {len}: expected TerminalLocal, got {other:?}"),
            }
        }
    }
}

#[test]
fn proxy_exit_classification() {
    let nodes = make_chain(2);
    let hops: Vec<_> = nodes.iter().map(|n| n.hop.clone()).collect();
    let request = build_request(
        &hops,
        b"",
        &json!({"host": "example.com", "target": "/beldex/lsrpc"}),
        Some(EncryptType::XChaCha20),
    )
    .expect("build");

    let peeled = walk_chain(&nodes, &request.blob);
    match peeled.action {
        HopAction::TerminalProxy { host, target, .. } => {
            assert_eq!(host, "example.com");
            assert_eq!(target, "/beldex/lsrpc");
        }
        other => panic!("expected TerminalProxy, got {other:?}"),
    }
}

#[test]
fn response_path_single_encryption() {
    let nodes = make_chain(3);
    let hops: Vec<_> = nodes.iter().map(|n| n.hop.clone()).collect();
    let request = build_request(
        &hops,
        b"request body",
        &json!({"headers": []}),
        Some(EncryptType::XChaCha20),
    )
    .expect("build");

    let peeled = walk_chain(&nodes, &request.blob);
    let ReplyKey {
        ephemeral,
        enc_type,
    } = peeled.reply;

    // The exit node encrypts once against the requester's ephemeral key;
    // intermediate nodes would pass these bytes through untouched.
    let exit = &nodes[2];
    let response = exit
        .channel
        .encrypt(enc_type, b"handler reply", &ephemeral)
        .expect("encrypt response");

    assert_eq!(request.decrypt_response(&response), b"handler reply");

    // The same response base64-encoded is also recovered.
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&response);
    assert_eq!(request.decrypt_response(encoded.as_bytes()), b"handler reply");
}

#[test]
fn tampered_layer_fails_to_peel() {
    let nodes = make_chain(2);
    let hops: Vec<_> = nodes.iter().map(|n| n.hop.clone()).collect();
    let request = build_request(
        &hops,
        b"payload",
        &json!({"headers": []}),
        Some(EncryptType::XChaCha20),
    )
    .expect("build");

    // Flip one ciphertext byte inside the outer frame's blob.
    let mut mangled = request.blob.clone();
    mangled[10] ^= 0x80;
    assert!(peel(&nodes[0].channel, &mangled, 0).is_err());
}
