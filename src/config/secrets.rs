//! Secret lookup seam
//!
//! The session core reads credentials through [`SecretLookup`] and never
//! writes them. [`MemorySecretStore`] serves tests and embedders that keep
//! secrets elsewhere; the OS keychain adapter lives in `keychain`.

use std::collections::HashMap;

use parking_lot::RwLock;
use zeroize::Zeroizing;

/// Private key material with its optional passphrase
#[derive(Clone)]
pub struct KeyMaterial {
    pub private_key: Zeroizing<String>,
    pub passphrase: Option<Zeroizing<String>>,
}

impl KeyMaterial {
    pub fn new(private_key: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            private_key: Zeroizing::new(private_key.into()),
            passphrase: passphrase.map(Zeroizing::new),
        }
    }
}

/// Read access to stored credentials
pub trait SecretLookup: Send + Sync {
    /// Stored password for an identity (the profile's username)
    fn password(&self, identity: &str) -> Option<Zeroizing<String>>;

    /// Stored private key for a key reference
    fn private_key(&self, key_id: &str) -> Option<KeyMaterial>;
}

/// In-memory secret store
#[derive(Default)]
pub struct MemorySecretStore {
    passwords: RwLock<HashMap<String, Zeroizing<String>>>,
    keys: RwLock<HashMap<String, KeyMaterial>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(self, identity: impl Into<String>, password: impl Into<String>) -> Self {
        self.set_password(identity, password);
        self
    }

    pub fn with_key(self, key_id: impl Into<String>, material: KeyMaterial) -> Self {
        self.keys.write().insert(key_id.into(), material);
        self
    }

    pub fn set_password(&self, identity: impl Into<String>, password: impl Into<String>) {
        self.passwords
            .write()
            .insert(identity.into(), Zeroizing::new(password.into()));
    }

    pub fn remove_key(&self, key_id: &str) {
        self.keys.write().remove(key_id);
    }
}

impl SecretLookup for MemorySecretStore {
    fn password(&self, identity: &str) -> Option<Zeroizing<String>> {
        self.passwords.read().get(identity).cloned()
    }

    fn private_key(&self, key_id: &str) -> Option<KeyMaterial> {
        self.keys.read().get(key_id).cloned()
    }
}
