//! Whole-file AEAD sealing with XChaCha20-Poly1305
//!
//! Sealed format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```
//!
//! The overhead is a fixed 40 bytes, so sealed size leaks nothing beyond
//! plaintext length.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroize;

use crate::{NONCE_SIZE, TAG_SIZE};

/// Minimum number of bytes a key file must contain (32).
///
/// Only the byte length is checked; any sufficiently long blob is accepted as
/// key material.
pub const MIN_KEY_FILE_BYTES: usize = 32;

/// Fixed sealing overhead: nonce plus authentication tag.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

const CIPHER_KEY_SIZE: usize = 32;

/// A 256-bit cipher key derived from the raw key-file blob via HKDF-SHA256.
///
/// Zeroized on drop to prevent key material lingering in memory.
pub struct MasterKey {
    cipher_key: [u8; CIPHER_KEY_SIZE],
}

impl MasterKey {
    /// Derive the cipher key from raw key-file bytes.
    ///
    /// The blob may be any length of at least [`MIN_KEY_FILE_BYTES`]; HKDF
    /// condenses it to a 256-bit cipher key.
    pub fn from_key_bytes(raw: &[u8]) -> anyhow::Result<Self> {
        if raw.len() < MIN_KEY_FILE_BYTES {
            anyhow::bail!(
                "key file too short: {} bytes (minimum {})",
                raw.len(),
                MIN_KEY_FILE_BYTES
            );
        }

        let hkdf = hkdf::Hkdf::<sha2::Sha256>::new(None, raw);
        let mut cipher_key = [0u8; CIPHER_KEY_SIZE];
        hkdf.expand(b"cmr-file-aead", &mut cipher_key)
            .map_err(|e| anyhow::anyhow!("HKDF expand for file AEAD: {e}"))?;

        Ok(Self { cipher_key })
    }

    /// Read a key file and derive the cipher key, zeroizing the raw blob.
    pub fn from_key_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut raw = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("reading key file {}: {e}", path.display()))?;
        let key = Self::from_key_bytes(&raw);
        raw.zeroize();
        key
    }

    fn as_bytes(&self) -> &[u8; CIPHER_KEY_SIZE] {
        &self.cipher_key
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("cipher_key", &"[REDACTED]")
            .finish()
    }
}

/// Seal a plaintext under the master key.
///
/// Returns `[24-byte nonce][ciphertext][16-byte tag]`.
pub fn seal(key: &MasterKey, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("sealing failed: {e}"))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed blob under the master key.
///
/// Authentication failure is an ordinary `Err`, not a panic; callers treat it
/// as a per-file recoverable condition.
pub fn open(key: &MasterKey, sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
    if sealed.len() < SEAL_OVERHEAD {
        anyhow::bail!(
            "sealed data too short: {} bytes (minimum {})",
            sealed.len(),
            SEAL_OVERHEAD
        );
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow::anyhow!("authentication failed: wrong key or corrupted data"))
}
