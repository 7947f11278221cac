//! Channel encryption between a node and a remote X25519 key.
//!
//! Every onion layer (and the final response on the return path) is a
//! single channel-encrypted blob under one of three interchangeable
//! schemes, negotiated per layer by the `enc_type` metadata token:
//!
//! | Scheme | Token | Framing |
//! |---|---|---|
//! | XChaCha20-Poly1305 | `xchacha20` | 24-byte nonce ‖ ciphertext ‖ 16-byte tag |
//! | AES-256-GCM | `aes-gcm` | 12-byte nonce ‖ ciphertext ‖ 16-byte tag |
//! | AES-256-CBC | `aes-cbc` | 16-byte IV ‖ PKCS#7 ciphertext |
//!
//! AES-CBC carries no authentication tag; it must never be the outermost
//! layer of anything that is not already integrity-protected.
//!
//! ## Key derivation
//!
//! `key = SHA-512(x25519(local_sk, peer_pk) || sender_pk || receiver_pk)[..32]`
//!
//! The sender (the party calling [`ChannelEncryption::encrypt`]) always
//! contributes its public key first, so both ends of a message derive the
//! same bytes from opposite perspectives.

use std::fmt;
use std::str::FromStr;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::XChaCha20Poly1305;
use rand::RngCore;
use sha2::{Digest, Sha512};

use crate::keys::{X25519Pubkey, X25519Seckey, KEY_SIZE};
use crate::{CryptoError, Result};

/// Nonce size for AES-GCM.
pub const AES_GCM_NONCE_SIZE: usize = 12;
/// Nonce size for XChaCha20-Poly1305.
pub const XCHACHA20_NONCE_SIZE: usize = 24;
/// IV size for AES-CBC.
pub const AES_CBC_IV_SIZE: usize = 16;
/// Poly1305/GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// The symmetric scheme of one onion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptType {
    /// AES-256-CBC with PKCS#7 padding. Unauthenticated.
    AesCbc,
    /// AES-256-GCM. The default when metadata carries no `enc_type`.
    AesGcm,
    /// XChaCha20-Poly1305. The current client default.
    XChaCha20,
}

impl EncryptType {
    /// The canonical lowercase wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptType::AesCbc => "aes-cbc",
            EncryptType::AesGcm => "aes-gcm",
            EncryptType::XChaCha20 => "xchacha20",
        }
    }

    /// Whether the scheme carries an authentication tag.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, EncryptType::AesCbc)
    }
}

impl fmt::Display for EncryptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptType {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aes-cbc" => Ok(EncryptType::AesCbc),
            "aes-gcm" => Ok(EncryptType::AesGcm),
            "xchacha20" => Ok(EncryptType::XChaCha20),
            other => Err(CryptoError::UnknownEncryptType(other.to_string())),
        }
    }
}

/// A node's channel-encryption state: its X25519 keypair plus the
/// server-side marker.
///
/// `server_side` is carried for key-direction decisions in future schemes
/// but nothing branches on it today; the derivation in the module docs is
/// computable by both parties without it.
#[derive(Clone)]
pub struct ChannelEncryption {
    seckey: X25519Seckey,
    pubkey: X25519Pubkey,
    #[allow(dead_code)]
    server_side: bool,
}

impl ChannelEncryption {
    pub fn new(seckey: X25519Seckey, pubkey: X25519Pubkey, server_side: bool) -> Self {
        Self {
            seckey,
            pubkey,
            server_side,
        }
    }

    /// Generate a fresh ephemeral keypair, e.g. for one onion layer.
    pub fn ephemeral() -> Self {
        let seckey = X25519Seckey::generate();
        let pubkey = seckey.pubkey();
        Self::new(seckey, pubkey, false)
    }

    /// The local public key.
    pub fn pubkey(&self) -> &X25519Pubkey {
        &self.pubkey
    }

    /// Derive the 32-byte symmetric key shared with `peer`.
    ///
    /// `local_is_sender` selects which public key is hashed first; the
    /// encrypting party's key always leads.
    fn shared_key(&self, peer: &X25519Pubkey, local_is_sender: bool) -> [u8; KEY_SIZE] {
        let secret = x25519_dalek::StaticSecret::from(*self.seckey.as_bytes());
        let their_pk = x25519_dalek::PublicKey::from(*peer.as_bytes());
        let dh = secret.diffie_hellman(&their_pk);

        let mut hasher = Sha512::new();
        hasher.update(dh.as_bytes());
        if local_is_sender {
            hasher.update(self.pubkey.as_bytes());
            hasher.update(peer.as_bytes());
        } else {
            hasher.update(peer.as_bytes());
            hasher.update(self.pubkey.as_bytes());
        }
        let digest = hasher.finalize();

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest[..KEY_SIZE]);
        key
    }

    /// Encrypt `plaintext` for `peer` under `scheme`.
    pub fn encrypt(
        &self,
        scheme: EncryptType,
        plaintext: &[u8],
        peer: &X25519Pubkey,
    ) -> Result<Vec<u8>> {
        let key = self.shared_key(peer, true);
        match scheme {
            EncryptType::AesCbc => encrypt_cbc(&key, plaintext),
            EncryptType::AesGcm => encrypt_gcm(&key, plaintext),
            EncryptType::XChaCha20 => encrypt_xchacha20(&key, plaintext),
        }
    }

    /// Decrypt `ciphertext` received from `peer` under `scheme`.
    pub fn decrypt(
        &self,
        scheme: EncryptType,
        ciphertext: &[u8],
        peer: &X25519Pubkey,
    ) -> Result<Vec<u8>> {
        let key = self.shared_key(peer, false);
        match scheme {
            EncryptType::AesCbc => decrypt_cbc(&key, ciphertext),
            EncryptType::AesGcm => decrypt_gcm(&key, ciphertext),
            EncryptType::XChaCha20 => decrypt_xchacha20(&key, ciphertext),
        }
    }
}

fn encrypt_gcm(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptFailed)?;
    let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_gcm(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < AES_GCM_NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
    cipher
        .decrypt(
            aes_gcm::Nonce::from_slice(&data[..AES_GCM_NONCE_SIZE]),
            &data[AES_GCM_NONCE_SIZE..],
        )
        .map_err(|_| CryptoError::DecryptFailed)
}

fn encrypt_xchacha20(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::EncryptFailed)?;
    let mut nonce = [0u8; XCHACHA20_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(chacha20poly1305::XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_xchacha20(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < XCHACHA20_NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptFailed);
    }
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
    cipher
        .decrypt(
            chacha20poly1305::XNonce::from_slice(&data[..XCHACHA20_NONCE_SIZE]),
            &data[XCHACHA20_NONCE_SIZE..],
        )
        .map_err(|_| CryptoError::DecryptFailed)
}

fn encrypt_cbc(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; AES_CBC_IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv)
        .map_err(|_| CryptoError::EncryptFailed)?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(iv.len() + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_cbc(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    // IV plus at least one whole cipher block.
    if data.len() < AES_CBC_IV_SIZE * 2 || (data.len() - AES_CBC_IV_SIZE) % 16 != 0 {
        return Err(CryptoError::DecryptFailed);
    }
    let cipher = Aes256CbcDec::new_from_slices(key, &data[..AES_CBC_IV_SIZE])
        .map_err(|_| CryptoError::DecryptFailed)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&data[AES_CBC_IV_SIZE..])
        .map_err(|_| CryptoError::DecryptFailed)
}
