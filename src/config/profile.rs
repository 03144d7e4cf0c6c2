//! Connection profile value types
//!
//! Profiles are owned and persisted by the server-management layer; the
//! session core only reads them.

use serde::{Deserialize, Serialize};

/// Which kind of remote endpoint a profile points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Interactive shell over SSH
    #[default]
    Ssh,
    /// Web endpoint (token auth); not reachable through the shell channel
    Web,
}

/// How a profile authenticates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthDescriptor {
    /// No credentials
    None,
    /// Bearer token (web endpoints only)
    Token,
    /// Username with a password kept in the credential store
    BasicAuth { username: String },
    /// Username with a private key kept in the key store
    SshKey { key_id: String, username: String },
}

impl AuthDescriptor {
    pub fn basic_auth(username: impl Into<String>) -> Self {
        Self::BasicAuth {
            username: username.into(),
        }
    }

    pub fn ssh_key(key_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self::SshKey {
            key_id: key_id.into(),
            username: username.into(),
        }
    }

    /// Username carried by the descriptor, if any
    pub fn username(&self) -> Option<&str> {
        match self {
            AuthDescriptor::BasicAuth { username } | AuthDescriptor::SshKey { username, .. } => {
                Some(username)
            }
            AuthDescriptor::None | AuthDescriptor::Token => None,
        }
    }
}

/// Per-profile presentation preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePreferences {
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Gate connection attempts behind biometrics (enforced by the caller)
    #[serde(default)]
    pub require_biometrics: bool,
}

impl Default for ProfilePreferences {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            require_biometrics: false,
        }
    }
}

/// A stored server profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: ProtocolKind,
    pub auth: AuthDescriptor,
    #[serde(default)]
    pub preferences: ProfilePreferences,
    /// Pinned `SHA256:...` host key fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_fingerprint: Option<String>,
}

impl ConnectionProfile {
    /// New SSH profile with a generated id
    pub fn ssh(host: impl Into<String>, port: u16, auth: AuthDescriptor) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: None,
            host: host.into(),
            port,
            protocol: ProtocolKind::Ssh,
            auth,
            preferences: ProfilePreferences::default(),
            host_key_fingerprint: None,
        }
    }

    /// Display name (or `user@host` when unnamed)
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| match self.auth.username() {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        })
    }
}

fn default_port() -> u16 {
    22
}

fn default_font_size() -> f32 {
    14.0
}
