//! Session error taxonomy

use thiserror::Error;

use super::events::ErrorCategory;
use super::state::ConnectionState;
use crate::ssh::SshError;

/// Problems only the user can fix; never retried automatically
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("No stored credential for {0}")]
    CredentialMissing(String),

    #[error("{0} authentication is not supported over SSH")]
    UnsupportedAuthForTransport(String),

    #[error("Invalid private key: {0}")]
    InvalidKeyFormat(String),
}

/// Outcome of a failed connection attempt
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(SshError),

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("No connection profile to reconnect")]
    NoProfile,
}

impl From<SshError> for SessionError {
    fn from(err: SshError) -> Self {
        match err {
            // Key material that decodes badly is a configuration problem
            SshError::KeyError(msg) => SessionError::Config(ConfigError::InvalidKeyFormat(msg)),
            other => SessionError::Transport(other),
        }
    }
}

impl SessionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Transport(e) => e.is_retryable(),
            SessionError::Config(_) | SessionError::Cancelled | SessionError::NoProfile => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Config(_) => ErrorCategory::Config,
            SessionError::Transport(_) => ErrorCategory::Transport,
            SessionError::Cancelled | SessionError::NoProfile => ErrorCategory::Lifecycle,
        }
    }
}

/// Outcome of a single queued write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("No active session")]
    NotConnected,

    #[error("Write discarded by session teardown")]
    Discarded,

    #[error("Write failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}
