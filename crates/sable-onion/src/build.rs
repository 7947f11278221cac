//! Client-side onion request construction.
//!
//! A request is wrapped innermost-first: the terminal payload and control
//! block are encrypted for the exit node, then each earlier hop adds a
//! layer whose routing metadata names the next hop's Ed25519 key, the
//! ephemeral key to decrypt the wrapped blob with, and the scheme it was
//! encrypted under. The data sent to the entry node gets one final
//! *unencrypted* wrapper carrying the entry layer's ephemeral key and
//! scheme in the clear.
//!
//! Each layer uses a freshly generated ephemeral X25519 keypair. Only the
//! innermost one is retained, because the exit node encrypts the response
//! once against it; every intermediate node passes the response through
//! opaquely.

use rand::Rng;
use sable_crypto::channel::{ChannelEncryption, EncryptType};
use sable_crypto::keys::{Ed25519Pubkey, X25519Pubkey};
use serde_json::json;

use crate::frame::encode_frame;
use crate::{OnionError, Result};

/// One hop of an onion path: the node's identity key and its
/// key-agreement key.
#[derive(Debug, Clone)]
pub struct PathHop {
    pub ed25519: Ed25519Pubkey,
    pub x25519: X25519Pubkey,
}

/// A fully built onion request, plus what the client must remember to
/// read the reply.
pub struct OnionRequest {
    /// The outer blob to POST to the entry node.
    pub blob: Vec<u8>,
    /// The innermost ephemeral keypair, kept for response decryption.
    channel: ChannelEncryption,
    /// The exit node's X25519 key the response key is derived against.
    exit_key: X25519Pubkey,
    /// Scheme of the innermost layer; the response uses the same one.
    enc_type: EncryptType,
}

impl OnionRequest {
    /// Scheme the exit node will encrypt the response under.
    pub fn response_enc_type(&self) -> EncryptType {
        self.enc_type
    }

    /// Recover the response body.
    ///
    /// Nothing in the response states its encoding, so try in order:
    /// decrypt directly, base64-decode then decrypt, and finally take the
    /// body as plaintext.
    pub fn decrypt_response(&self, body: &[u8]) -> Vec<u8> {
        if let Ok(plain) = self.channel.decrypt(self.enc_type, body, &self.exit_key) {
            return plain;
        }
        if let Some(decoded) = decode_base64_body(body) {
            if let Ok(plain) = self.channel.decrypt(self.enc_type, &decoded, &self.exit_key) {
                return plain;
            }
        }
        body.to_vec()
    }
}

fn decode_base64_body(body: &[u8]) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
    use base64::Engine;

    let text = std::str::from_utf8(body).ok()?.trim_end_matches('\n');
    if text.ends_with('=') {
        STANDARD.decode(text).ok()
    } else {
        STANDARD_NO_PAD.decode(text).ok()
    }
}

fn random_enc_type() -> EncryptType {
    match rand::rngs::OsRng.gen_range(0..3) {
        0 => EncryptType::AesCbc,
        1 => EncryptType::AesGcm,
        _ => EncryptType::XChaCha20,
    }
}

/// Build an onion request through `hops` (entry first, exit last).
///
/// `enc_type` fixes the scheme for every layer; `None` draws an
/// independent random scheme per hop from the OS CSPRNG.
pub fn build_request(
    hops: &[PathHop],
    payload: &[u8],
    control: &serde_json::Value,
    enc_type: Option<EncryptType>,
) -> Result<OnionRequest> {
    let Some(exit) = hops.last() else {
        return Err(OnionError::MalformedFrame("onion path is empty".into()));
    };

    // Innermost layer: the terminal payload and control block, encrypted
    // for the exit node. This layer's keypair is the one the exit node
    // derives the response key against, so keep a copy.
    let mut scheme = enc_type.unwrap_or_else(random_enc_type);
    let mut channel = ChannelEncryption::ephemeral();
    let inner = encode_frame(payload, control);
    let mut blob = channel.encrypt(scheme, &inner, &exit.x25519)?;

    let response_channel = channel.clone();
    let response_scheme = scheme;

    // Wrap for each earlier hop, exit side inward: layer i tells hop i to
    // pass the blob to hop i+1, to be decrypted with the ephemeral key and
    // scheme of the layer just built.
    for i in (0..hops.len() - 1).rev() {
        let routing = json!({
            "destination": hops[i + 1].ed25519.to_hex(),
            "ephemeral_key": channel.pubkey().to_hex(),
            "enc_type": scheme.as_str(),
        });
        let framed = encode_frame(&blob, &routing);

        scheme = enc_type.unwrap_or_else(random_enc_type);
        channel = ChannelEncryption::ephemeral();
        blob = channel.encrypt(scheme, &framed, &hops[i].x25519)?;
    }

    // The entry node needs the outermost ephemeral key and scheme in the
    // clear to decrypt at all.
    let outer = json!({
        "ephemeral_key": channel.pubkey().to_hex(),
        "enc_type": scheme.as_str(),
    });
    let blob = encode_frame(&blob, &outer);

    Ok(OnionRequest {
        blob,
        channel: response_channel,
        exit_key: exit.x25519,
        enc_type: response_scheme,
    })
}
