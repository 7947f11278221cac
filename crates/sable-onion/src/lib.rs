//! # sable-onion
//!
//! The onion request codec: building and peeling the multi-hop encrypted
//! envelopes that carry client requests across the master-node network.
//!
//! - [`frame`] — the `[length][blob][JSON metadata]` layer framing
//! - [`build`] — client-side construction of an N-hop request, and
//!   decryption of the single-encrypted response
//! - [`peel`] — server-side removal of one layer and classification of
//!   the resulting hop intent
//! - [`transfer`] — the bencoded dict exchanged between master nodes when
//!   forwarding
//! - [`bencode`] — the minimal bencode codec backing [`transfer`]
//!
//! Peeling and building are synchronous, pure-CPU operations over
//! in-memory buffers; all I/O belongs to the surrounding dispatcher.

pub mod bencode;
pub mod build;
pub mod frame;
pub mod peel;
pub mod transfer;

/// Highest hop number a node will still process. A request carrying a
/// larger hop number is dropped without forwarding.
pub const MAX_HOPS: u8 = 15;

/// Accepted path prefixes for proxy-terminal targets.
pub const PROXY_PATH_PREFIXES: &[&str] = &["/beldex/", "/session/"];
/// Required path suffix for proxy-terminal targets.
pub const PROXY_PATH_SUFFIX: &str = "/lsrpc";

/// Error types for the onion codec and the components that feed it.
#[derive(Debug, thiserror::Error)]
pub enum OnionError {
    /// Length overrun, truncated metadata, or invalid metadata JSON.
    #[error("malformed onion frame: {0}")]
    MalformedFrame(String),

    /// The inter-node transfer dict was not parseable bencode.
    #[error("malformed bencoded transfer: {0}")]
    MalformedBencode(String),

    /// A required transfer field was absent.
    #[error("transfer dict is missing field {0:?}")]
    MissingField(&'static str),

    /// Layer decryption failed: authentication failure, key mismatch, or
    /// scheme mismatch.
    #[error("layer decryption failed: {0}")]
    Decrypt(#[from] sable_crypto::CryptoError),

    /// Peeled metadata matches none of the known hop shapes.
    #[error("peeled metadata matches no known hop shape")]
    UnknownHop,

    /// The next hop's Ed25519 key could not be resolved to a peer.
    #[error("next hop {0} is not a known peer")]
    PeerUnknown(String),

    /// The hop number exceeds [`MAX_HOPS`].
    #[error("hop number {0} exceeds the {MAX_HOPS}-hop limit")]
    HopLimitExceeded(u8),

    /// Key material embedded in a layer failed to parse.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Admission was rejected by the rate limiter.
    #[error("rate limited")]
    RateLimited,

    /// The forwarded hop or proxy target did not respond in time.
    #[error("upstream did not respond within the deadline")]
    UpstreamTimeout,
}

pub type Result<T> = std::result::Result<T, OnionError>;
