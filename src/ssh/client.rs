//! SSH Client implementation using russh

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::client::{self, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::config::{AuthStrategy, SshTarget};
use super::error::SshError;
use super::handle_owner::spawn_handle_owner_task;
use super::keys::decode_private_key;
use super::session::spawn_shell_channel;
use super::transport::{PtyChannel, Transport, TransportConnection};

/// [`Transport`] backed by russh
#[derive(Debug, Clone, Default)]
pub struct RusshTransport;

impl RusshTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn handshake(&self, target: &SshTarget) -> Result<Box<dyn TransportConnection>, SshError> {
        let addr = target.addr();

        info!("Connecting to SSH server at {}", addr);

        let socket_addr = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| SshError::ConnectionFailed(format!("DNS resolution failed: {}", e)))?
            .next()
            .ok_or_else(|| SshError::ConnectionFailed(format!("No address found for {}", addr)))?;

        // Transport-level keepalive only detects dead links; the background
        // keep-alive byte is sent by the lifecycle controller.
        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(
            target.host.clone(),
            target.port,
            target.host_key_fingerprint.clone(),
        );

        let handle = tokio::time::timeout(
            Duration::from_secs(target.timeout_secs),
            client::connect(Arc::new(ssh_config), socket_addr, handler),
        )
        .await
        .map_err(|_| SshError::Timeout("Connection timed out".to_string()))?
        .map_err(|e| match e {
            SshError::HostKeyMismatch { .. } => e,
            other => SshError::ConnectionFailed(other.to_string()),
        })?;

        debug!("SSH handshake completed with {}", addr);

        Ok(Box::new(RusshConnection { handle, addr }))
    }
}

/// A russh connection that finished key exchange
struct RusshConnection {
    handle: Handle<ClientHandler>,
    addr: String,
}

#[async_trait]
impl TransportConnection for RusshConnection {
    async fn authenticate(&mut self, username: &str, strategy: &AuthStrategy) -> Result<(), SshError> {
        debug!("Authenticating {}@{} via {}", username, self.addr, strategy.kind());

        let authenticated = match strategy {
            AuthStrategy::Password { password } => self
                .handle
                .authenticate_password(username, password.as_str())
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
            AuthStrategy::PublicKey {
                private_key,
                passphrase,
            } => {
                let key = decode_private_key(private_key, passphrase.as_ref().map(|p| p.as_str()))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

                self.handle
                    .authenticate_publickey(username, key_with_hash)
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}@{}", username, self.addr);
        Ok(())
    }

    async fn open_pty(
        self: Box<Self>,
        term: &str,
        cols: u32,
        rows: u32,
    ) -> Result<PtyChannel, SshError> {
        let session_id = uuid::Uuid::new_v4().to_string();

        // From here on the Handle is owned by its task; dropping the
        // controller on any error below tears the connection down.
        let controller = spawn_handle_owner_task(self.handle, session_id.clone());

        let channel = controller.open_session_channel().await?;

        debug!("Channel opened, requesting {}x{} PTY", cols, rows);

        channel
            .request_pty(false, term, cols, rows, 0, 0, &[])
            .await
            .map_err(|e| SshError::ChannelError(format!("PTY request failed: {}", e)))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::ChannelError(format!("Shell request failed: {}", e)))?;

        info!("Interactive shell started for session {}", session_id);

        Ok(spawn_shell_channel(channel, controller, session_id))
    }
}

/// Compute the `SHA256:<base64>` fingerprint of a host key
pub fn fingerprint(key: &PublicKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.public_key_bytes());
    let hash = hasher.finalize();
    format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
}

/// Client handler for russh callbacks
pub struct ClientHandler {
    host: String,
    port: u16,
    /// Expected fingerprint, if the profile pins one
    pinned: Option<String>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, pinned: Option<String>) -> Self {
        Self { host, port, pinned }
    }

    fn verify(&self, actual: String) -> Result<bool, SshError> {
        match &self.pinned {
            Some(expected) if *expected == actual => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            Some(expected) => {
                warn!(
                    "HOST KEY MISMATCH for {}:{}! Expected {}, got {}",
                    self.host, self.port, expected, actual
                );
                Err(SshError::HostKeyMismatch {
                    host: format!("{}:{}", self.host, self.port),
                    expected: expected.clone(),
                    actual,
                })
            }
            None => {
                info!(
                    "Accepting host key for {}:{} (fingerprint: {})",
                    self.host, self.port, actual
                );
                Ok(true)
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        self.verify(fingerprint(server_public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unresolvable_host_is_connection_failure() {
        let target = SshTarget::new("host.invalid", 22, "alice").with_timeout(5);
        let err = match RusshTransport::new().handshake(&target).await {
            Ok(_) => panic!("handshake to an unresolvable host succeeded"),
            Err(e) => e,
        };
        assert!(matches!(err, SshError::ConnectionFailed(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unpinned_host_accepts_any_key() {
        let handler = ClientHandler::new("10.0.0.5".into(), 22, None);
        assert!(handler.verify("SHA256:abc".into()).unwrap());
    }

    #[test]
    fn test_pinned_host_checks_fingerprint() {
        let handler = ClientHandler::new("10.0.0.5".into(), 22, Some("SHA256:abc".into()));
        assert!(handler.verify("SHA256:abc".into()).unwrap());

        let err = handler.verify("SHA256:xyz".into()).unwrap_err();
        assert!(matches!(err, SshError::HostKeyMismatch { .. }));
        assert!(!err.is_retryable());
    }
}
