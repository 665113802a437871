//! Pluggable at-rest encryption capability (component C2).

pub mod aes;
pub mod envelope;

use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// A named encrypt/decrypt strategy for state documents.
pub trait EncryptionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Name-keyed lookup of available encryption providers, mirroring the
/// original's provider registry. Backends pick a provider by name at
/// connect time and fall back to an identity provider when none is
/// configured.
pub struct EncryptionRegistry {
    providers: HashMap<String, Arc<dyn EncryptionProvider>>,
}

impl EncryptionRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn EncryptionProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EncryptionProvider>> {
        self.providers.get(name).cloned()
    }

    /// Builds the registry with the two providers the original ships:
    /// `aes` (passphrase-keyed, see [`aes::AesProvider`]) and `sops`
    /// (detection-only stub, see [`envelope::SopsProvider`]).
    pub fn with_defaults(aes_passphrase: Option<String>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(aes::AesProvider::new(aes_passphrase)));
        registry.register(Arc::new(envelope::SopsProvider::new()));
        registry
    }
}

impl Default for EncryptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity provider used when a request names no encryption provider.
pub struct IdentityProvider;

impl EncryptionProvider for IdentityProvider {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}
