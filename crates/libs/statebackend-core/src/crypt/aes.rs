//! AES-GCM at-rest encryption provider (component C2).
//!
//! Preserved for compatibility with state blobs written by the original
//! implementation: the key is derived from the configured passphrase via
//! plain MD5, not a password-hardening KDF (PBKDF2/scrypt/argon2). This is
//! intentionally weak and must not be treated as a model for new secrets
//! handling; it exists so that a passphrase chosen before this rewrite
//! keeps decrypting the same ciphertext after it.

use crate::crypt::EncryptionProvider;
use crate::error::{CoreError, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use md5::{Digest, Md5};
use rand::RngCore;

const NONCE_LEN: usize = 12;

/// AES-128-GCM provider keyed by `md5(passphrase)`. Ciphertext on the wire
/// is `nonce || sealed`, with nonce always `NONCE_LEN` bytes.
pub struct AesProvider {
    passphrase: Option<String>,
}

impl AesProvider {
    pub fn new(passphrase: Option<String>) -> Self {
        Self { passphrase }
    }

    fn cipher(&self) -> Option<Aes128Gcm> {
        let passphrase = self.passphrase.as_ref()?;
        let digest = Md5::digest(passphrase.as_bytes());
        let key = Key::<Aes128Gcm>::from_slice(&digest);
        Some(Aes128Gcm::new(key))
    }
}

impl EncryptionProvider for AesProvider {
    fn name(&self) -> &'static str {
        "aes"
    }

    /// No passphrase configured means this provider is a no-op: data is
    /// passed through unchanged so a backend can be run without encryption
    /// at all.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(cipher) = self.cipher() else {
            return Ok(plaintext.to_vec());
        };

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
            .map_err(|e| CoreError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Graceful degradation: if no passphrase is configured, or the
    /// ciphertext fails to authenticate (wrong passphrase, or the blob was
    /// never encrypted to begin with), the input is returned unchanged
    /// rather than erroring. Only a malformed/short blob under an active
    /// passphrase is treated as a hard error.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let Some(cipher) = self.cipher() else {
            return Ok(ciphertext.to_vec());
        };

        if ciphertext.len() < NONCE_LEN {
            return Ok(ciphertext.to_vec());
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        match cipher.decrypt(nonce, Payload { msg: sealed, aad: &[] }) {
            Ok(plaintext) => Ok(plaintext),
            Err(_) => Ok(ciphertext.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_matching_passphrase() {
        let provider = AesProvider::new(Some("correct horse battery staple".to_string()));
        let sealed = provider.encrypt(b"hello state").expect("encrypt");
        assert_ne!(sealed, b"hello state");
        let opened = provider.decrypt(&sealed).expect("decrypt");
        assert_eq!(opened, b"hello state");
    }

    #[test]
    fn wrong_passphrase_degrades_to_identity() {
        let sealed = AesProvider::new(Some("passphrase-a".to_string()))
            .encrypt(b"hello state")
            .expect("encrypt");
        let opened = AesProvider::new(Some("passphrase-b".to_string()))
            .decrypt(&sealed)
            .expect("decrypt");
        assert_eq!(opened, sealed);
    }

    #[test]
    fn no_passphrase_is_identity() {
        let provider = AesProvider::new(None);
        assert_eq!(provider.encrypt(b"plain").expect("encrypt"), b"plain");
        assert_eq!(provider.decrypt(b"plain").expect("decrypt"), b"plain");
    }
}
