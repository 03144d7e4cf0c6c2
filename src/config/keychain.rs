//! Keychain Integration
//!
//! Reads passwords, private keys and passphrases from the system keychain
//! via the `keyring` crate. Entry accounts:
//!
//! - `password.<identity>`
//! - `key.<key_id>`
//! - `key.<key_id>.passphrase`

use keyring::Entry;
use zeroize::Zeroizing;

use super::secrets::{KeyMaterial, SecretLookup};

/// Service name for keychain entries
const SERVICE_NAME: &str = "com.pocketshell.ssh";

/// Keychain errors
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Secret not found for ID: {0}")]
    NotFound(String),
}

/// Keychain manager for SSH credentials
pub struct Keychain {
    service: String,
}

impl Keychain {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Custom service name (for testing)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    // Explicit OS user prefix keeps the keychain identity stable on macOS
    fn entry(&self, id: &str) -> Result<Entry, KeychainError> {
        let username = whoami::username();
        Ok(Entry::new(&self.service, &format!("{}@{}", username, id))?)
    }

    pub fn store(&self, id: &str, secret: &str) -> Result<(), KeychainError> {
        tracing::debug!("Keychain store: service={}, id={}", self.service, id);
        self.entry(id)?.set_password(secret)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Zeroizing<String>, KeychainError> {
        match self.entry(id)?.get_password() {
            Ok(secret) => Ok(Zeroizing::new(secret)),
            Err(keyring::Error::NoEntry) => Err(KeychainError::NotFound(id.to_string())),
            Err(e) => Err(KeychainError::Keyring(e)),
        }
    }

    pub fn delete(&self, id: &str) -> Result<(), KeychainError> {
        match self.entry(id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeychainError::Keyring(e)),
        }
    }

    /// `get` that folds "not found" into `None` and logs other failures
    fn lookup(&self, id: &str) -> Option<Zeroizing<String>> {
        match self.get(id) {
            Ok(secret) => Some(secret),
            Err(KeychainError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!("Keychain lookup failed for {}: {}", id, e);
                None
            }
        }
    }
}

impl Default for Keychain {
    fn default() -> Self {
        Self::new()
    }
}

pub fn password_entry_id(identity: &str) -> String {
    format!("password.{}", identity)
}

pub fn key_entry_id(key_id: &str) -> String {
    format!("key.{}", key_id)
}

pub fn passphrase_entry_id(key_id: &str) -> String {
    format!("key.{}.passphrase", key_id)
}

/// [`SecretLookup`] over the system keychain
#[derive(Default)]
pub struct KeychainSecretStore {
    keychain: Keychain,
}

impl KeychainSecretStore {
    pub fn new(keychain: Keychain) -> Self {
        Self { keychain }
    }
}

impl SecretLookup for KeychainSecretStore {
    fn password(&self, identity: &str) -> Option<Zeroizing<String>> {
        self.keychain.lookup(&password_entry_id(identity))
    }

    fn private_key(&self, key_id: &str) -> Option<KeyMaterial> {
        let private_key = self.keychain.lookup(&key_entry_id(key_id))?;
        let passphrase = self.keychain.lookup(&passphrase_entry_id(key_id));
        Some(KeyMaterial {
            private_key,
            passphrase,
        })
    }
}
