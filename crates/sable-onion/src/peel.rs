//! Server-side layer removal and hop classification.
//!
//! A node receives either the outer frame (entry, over HTTPS) or a
//! transfer dict (later hops, over the node mesh). Both paths converge on
//! [`peel_layer`]: decrypt one layer against the node's X25519 key, parse
//! the plaintext as another frame, and classify its metadata into one of
//! the three hop intents.

use std::str::FromStr;

use sable_crypto::channel::{ChannelEncryption, EncryptType};
use sable_crypto::keys::{Ed25519Pubkey, X25519Pubkey};

use crate::frame::parse_frame;
use crate::{OnionError, Result, MAX_HOPS, PROXY_PATH_PREFIXES, PROXY_PATH_SUFFIX};

/// Key material a terminal hop needs to encrypt the response: the
/// ephemeral key and scheme this layer arrived under.
#[derive(Debug, Clone)]
pub struct ReplyKey {
    pub ephemeral: X25519Pubkey,
    pub enc_type: EncryptType,
}

/// What one peeled layer asks this node to do.
#[derive(Debug, Clone)]
pub enum HopAction {
    /// Relay the still-encrypted blob to the next master node.
    Forward {
        /// The next hop, addressed by its Ed25519 identity key.
        destination: Ed25519Pubkey,
        /// Ephemeral key the next hop decrypts the blob against.
        ephemeral_key: X25519Pubkey,
        /// Scheme the blob is encrypted under.
        enc_type: EncryptType,
        /// Hop number to send onward (already incremented).
        hop_no: u8,
        /// The opaque blob for the next hop.
        blob: Vec<u8>,
    },
    /// This node is the exit; the blob is a JSON client request for the
    /// local handler.
    TerminalLocal {
        /// Raw request bytes (conventionally JSON).
        request: Vec<u8>,
    },
    /// This node is the exit; make an outbound HTTP(S) request.
    TerminalProxy {
        host: String,
        target: String,
        port: Option<u16>,
        /// `http` or `https`; absent means `https`.
        protocol: Option<String>,
        /// Body to post (typically empty).
        payload: Vec<u8>,
    },
}

/// The result of peeling one layer.
#[derive(Debug, Clone)]
pub struct PeeledOnion {
    /// How to encrypt a terminal response back to the requester.
    pub reply: ReplyKey,
    /// The classified hop intent.
    pub action: HopAction,
}

/// Peel the outer frame as received by the entry node: the wrapper JSON
/// carries the ephemeral key and scheme in the clear.
pub fn peel(channel: &ChannelEncryption, data: &[u8], hop_no: u8) -> Result<PeeledOnion> {
    check_hop_limit(hop_no)?;
    let (blob, meta) = parse_frame(data)?;
    let ephemeral = required_key(&meta, "ephemeral_key")?;
    let enc_type = optional_enc_type(&meta)?;
    peel_layer(channel, blob, ephemeral, enc_type, hop_no)
}

/// Peel one already-unwrapped layer: decrypt `blob` against `ephemeral`
/// under `enc_type`, then classify the plaintext.
pub fn peel_layer(
    channel: &ChannelEncryption,
    blob: &[u8],
    ephemeral: X25519Pubkey,
    enc_type: EncryptType,
    hop_no: u8,
) -> Result<PeeledOnion> {
    check_hop_limit(hop_no)?;

    let plain = channel.decrypt(enc_type, blob, &ephemeral)?;
    let (inner, meta) = parse_frame(&plain)?;
    let action = classify(inner, &meta, hop_no)?;

    Ok(PeeledOnion {
        reply: ReplyKey {
            ephemeral,
            enc_type,
        },
        action,
    })
}

fn check_hop_limit(hop_no: u8) -> Result<()> {
    if hop_no > MAX_HOPS {
        tracing::debug!(hop_no, "dropping onion request past the hop limit");
        return Err(OnionError::HopLimitExceeded(hop_no));
    }
    Ok(())
}

fn classify(inner: &[u8], meta: &serde_json::Value, hop_no: u8) -> Result<HopAction> {
    if meta.get("destination").is_some() && meta.get("ephemeral_key").is_some() {
        let destination = required_ed25519(meta, "destination")?;
        let ephemeral_key = required_key(meta, "ephemeral_key")?;
        let enc_type = optional_enc_type(meta)?;
        return Ok(HopAction::Forward {
            destination,
            ephemeral_key,
            enc_type,
            hop_no: hop_no + 1,
            blob: inner.to_vec(),
        });
    }

    // Any value under "headers" marks a request terminating here;
    // clients conventionally send an empty array.
    if meta.get("headers").is_some() {
        return Ok(HopAction::TerminalLocal {
            request: inner.to_vec(),
        });
    }

    if let (Some(host), Some(target)) = (meta.get("host"), meta.get("target")) {
        let host = host.as_str().ok_or(OnionError::UnknownHop)?.to_owned();
        let target = target.as_str().ok_or(OnionError::UnknownHop)?.to_owned();
        if !valid_proxy_target(&target) {
            tracing::debug!(path = %target, "rejecting proxy request for unlisted target");
            return Err(OnionError::UnknownHop);
        }
        let port = match meta.get("port") {
            None => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or(OnionError::UnknownHop)?,
            ),
        };
        let protocol = match meta.get("protocol") {
            None => None,
            Some(value) => Some(value.as_str().ok_or(OnionError::UnknownHop)?.to_owned()),
        };
        return Ok(HopAction::TerminalProxy {
            host,
            target,
            port,
            protocol,
            payload: inner.to_vec(),
        });
    }

    Err(OnionError::UnknownHop)
}

/// A proxy target must begin with one of the allowed path prefixes and
/// end with the `/lsrpc` suffix.
fn valid_proxy_target(target: &str) -> bool {
    PROXY_PATH_PREFIXES.iter().any(|p| target.starts_with(p))
        && target.ends_with(PROXY_PATH_SUFFIX)
}

fn required_key(meta: &serde_json::Value, field: &str) -> Result<X25519Pubkey> {
    let hex = meta
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| OnionError::MalformedFrame(format!("metadata lacks {field:?}")))?;
    X25519Pubkey::from_hex(hex).map_err(|e| OnionError::InvalidKey(format!("{field}: {e}")))
}

fn required_ed25519(meta: &serde_json::Value, field: &str) -> Result<Ed25519Pubkey> {
    let hex = meta
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| OnionError::MalformedFrame(format!("metadata lacks {field:?}")))?;
    Ed25519Pubkey::from_hex(hex).map_err(|e| OnionError::InvalidKey(format!("{field}: {e}")))
}

fn optional_enc_type(meta: &serde_json::Value) -> Result<EncryptType> {
    match meta.get("enc_type") {
        // Older clients omit the field; aes-gcm is the historical default.
        None => Ok(EncryptType::AesGcm),
        Some(value) => {
            let token = value.as_str().ok_or_else(|| {
                OnionError::MalformedFrame("enc_type is not a string".into())
            })?;
            EncryptType::from_str(token)
                .map_err(|_| OnionError::MalformedFrame(format!("unknown enc_type {token:?}")))
        }
    }
}
