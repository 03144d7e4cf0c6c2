//! Configuration Module
//!
//! User settings on disk, connection profile value types, and read-only
//! credential lookup (system keychain or in-memory).

pub mod keychain;
pub mod profile;
pub mod secrets;
pub mod settings;
pub mod storage;

pub use keychain::{Keychain, KeychainError, KeychainSecretStore};
pub use profile::{AuthDescriptor, ConnectionProfile, ProfilePreferences, ProtocolKind};
pub use secrets::{KeyMaterial, MemorySecretStore, SecretLookup};
pub use settings::{Settings, SETTINGS_VERSION};
pub use storage::{config_dir, settings_file, SettingsStorage, StorageError};
