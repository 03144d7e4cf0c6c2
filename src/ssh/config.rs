//! SSH Configuration

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTarget {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Handshake timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pinned `SHA256:...` host key fingerprint.
    /// - None: accept any host key and log its fingerprint
    /// - Some: reject the handshake on mismatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_fingerprint: Option<String>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            timeout_secs: default_timeout(),
            host_key_fingerprint: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_host_key_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.host_key_fingerprint = fingerprint;
        self
    }

    /// `host:port` for logging and address resolution
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credential strategy for a single connection attempt.
///
/// Built per attempt by the auth resolver and dropped once the attempt
/// completes; secret material is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Password authentication (may be empty for servers that accept it)
    Password { password: Zeroizing<String> },

    /// Public key authentication with in-memory key material
    PublicKey {
        /// OpenSSH or PEM encoded private key
        private_key: Zeroizing<String>,
        /// Optional passphrase for encrypted keys
        passphrase: Option<Zeroizing<String>>,
    },
}

impl AuthStrategy {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn public_key(private_key: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::PublicKey {
            private_key: Zeroizing::new(private_key.into()),
            passphrase: passphrase.map(Zeroizing::new),
        }
    }

    /// Short label for logs; never includes secret material
    pub fn kind(&self) -> &'static str {
        match self {
            AuthStrategy::Password { .. } => "password",
            AuthStrategy::PublicKey { .. } => "publickey",
        }
    }
}

impl fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStrategy::Password { .. } => f.debug_struct("Password").finish_non_exhaustive(),
            AuthStrategy::PublicKey { passphrase, .. } => f
                .debug_struct("PublicKey")
                .field("has_passphrase", &passphrase.is_some())
                .finish_non_exhaustive(),
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}
