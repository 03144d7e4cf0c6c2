//! Events the core emits to the presentation layer
//!
//! The core never assumes a thread or queue affinity; consumers decide
//! where events are handled.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

/// Ordered terminal output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// One inbound chunk, unmodified, in arrival order
    Data(Bytes),
    /// The renderer should clear its visible buffer
    Reset,
}

/// Coarse category for UI presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Needs user action (credential, auth method, key)
    Config,
    /// Handshake, authentication or link failure
    Transport,
    /// An outbound write failed
    Write,
    /// Reconnect / background policy notices
    Lifecycle,
}

/// Human-readable status message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub category: ErrorCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Sender side of the status channel
#[derive(Clone)]
pub struct StatusReporter {
    tx: broadcast::Sender<StatusReport>,
}

impl StatusReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusReport> {
        self.tx.subscribe()
    }

    pub fn report(&self, category: ErrorCategory, message: impl Into<String>) {
        let message = message.into();
        warn!("[{:?}] {}", category, message);
        // No subscribers is fine
        let _ = self.tx.send(StatusReport {
            category,
            message,
            timestamp: Utc::now(),
        });
    }
}
