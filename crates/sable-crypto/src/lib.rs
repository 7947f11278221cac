//! # sable-crypto
//!
//! Cryptographic primitives for the sable master-node network.
//!
//! - [`keys`] — the three master-node key families (legacy, Ed25519,
//!   X25519) with their textual encodings
//! - [`channel`] — channel encryption against a remote X25519 key under
//!   one of the three supported symmetric schemes

pub mod channel;
pub mod keys;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key material had the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Key material was not valid in the stated encoding.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptFailed,

    /// Decryption failed: authentication tag mismatch, bad padding, or a
    /// ciphertext too short to contain its nonce.
    #[error("decryption failed")]
    DecryptFailed,

    /// Unrecognized encryption-scheme token.
    #[error("unknown encryption type {0:?}")]
    UnknownEncryptType(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
