//! Authentication Resolution
//!
//! Turns a profile's [`AuthDescriptor`] plus the credential store into a
//! concrete [`AuthStrategy`] for one connection attempt:
//!
//! - `basic_auth`: stored password for the username
//! - `ssh_key`: stored private key, falling back to the username's
//!   password when the key is missing
//! - `none`: empty password
//! - `token`: rejected, tokens only apply to web endpoints
//!
//! Nothing here touches the network and nothing is cached; the returned
//! strategy is dropped (and its secrets wiped) once the attempt is over.

use tracing::{debug, info};

use super::error::ConfigError;
use crate::config::{AuthDescriptor, ConnectionProfile, ProtocolKind, SecretLookup};
use crate::ssh::{looks_like_private_key, AuthStrategy};

/// Resolve the credentials to present for `profile`
pub fn resolve(
    profile: &ConnectionProfile,
    secrets: &dyn SecretLookup,
) -> Result<AuthStrategy, ConfigError> {
    if profile.protocol != ProtocolKind::Ssh {
        return Err(ConfigError::UnsupportedAuthForTransport(format!(
            "{:?} profile",
            profile.protocol
        )));
    }

    match &profile.auth {
        AuthDescriptor::BasicAuth { username } => password_for(username, secrets),
        AuthDescriptor::SshKey { key_id, username } => match secrets.private_key(key_id) {
            Some(material) => {
                if !looks_like_private_key(&material.private_key) {
                    return Err(ConfigError::InvalidKeyFormat(format!(
                        "key {} is not a PEM or OpenSSH private key",
                        key_id
                    )));
                }
                debug!("Using stored key {} for {}", key_id, username);
                Ok(AuthStrategy::PublicKey {
                    private_key: material.private_key,
                    passphrase: material.passphrase,
                })
            }
            None => {
                info!(
                    "Key {} not found, falling back to password for {}",
                    key_id, username
                );
                password_for(username, secrets).map_err(|_| {
                    ConfigError::CredentialMissing(format!("key {} or password for {}", key_id, username))
                })
            }
        },
        AuthDescriptor::None => Ok(AuthStrategy::password("")),
        AuthDescriptor::Token => Err(ConfigError::UnsupportedAuthForTransport("Token".into())),
    }
}

/// Username to authenticate as; the local user when the profile has none
pub fn username_for(profile: &ConnectionProfile) -> String {
    profile
        .auth
        .username()
        .map(str::to_string)
        .unwrap_or_else(whoami::username)
}

fn password_for(username: &str, secrets: &dyn SecretLookup) -> Result<AuthStrategy, ConfigError> {
    secrets
        .password(username)
        .map(|password| AuthStrategy::Password { password })
        .ok_or_else(|| ConfigError::CredentialMissing(format!("password for {}", username)))
}
