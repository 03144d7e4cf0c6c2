//! Connection State Machine
//!
//! ```text
//!   Disconnected ──▶ Connecting ──▶ Authenticating ──▶ Connected
//!        ▲    ▲          │                │                │
//!        │    └──────────┴────────────────┴────────────────┤ disconnect / remote close
//!        │                                                 │
//!        │              Error ◀── any failure ─────────────┘
//!        └──────────────  │
//!                         └──▶ Connecting (retry)
//! ```
//!
//! Every transition goes through this type, is serialized by one lock, and
//! is published to subscribers in the order it was applied.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::error::StateError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// A connection attempt is in progress
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Authenticating
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Authenticating => write!(f, "authenticating"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error(msg) => write!(f, "error({})", msg),
        }
    }
}

/// An applied transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

pub struct ConnectionStateMachine {
    state: Mutex<ConnectionState>,
    tx: broadcast::Sender<StateTransition>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().is_connected()
    }

    /// Transitions applied after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.tx.subscribe()
    }

    /// User-initiated attempt (from `Disconnected`, or a retry from `Error`)
    pub fn start_connecting(&self) -> Result<(), StateError> {
        self.transition(ConnectionState::Connecting, |from| {
            matches!(from, ConnectionState::Disconnected | ConnectionState::Error(_))
        })
    }

    /// Explicit reconnect; the only way out of `Connected` into `Connecting`
    pub fn begin_reconnect(&self) -> Result<(), StateError> {
        self.transition(ConnectionState::Connecting, |from| {
            matches!(
                from,
                ConnectionState::Connected
                    | ConnectionState::Disconnected
                    | ConnectionState::Error(_)
            )
        })
    }

    pub fn authenticating(&self) -> Result<(), StateError> {
        self.transition(ConnectionState::Authenticating, |from| {
            matches!(from, ConnectionState::Connecting)
        })
    }

    pub fn connected(&self) -> Result<(), StateError> {
        self.transition(ConnectionState::Connected, |from| {
            matches!(from, ConnectionState::Authenticating)
        })
    }

    /// Any state may fail
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        // Infallible: the predicate accepts every state
        let _ = self.transition(ConnectionState::Error(message), |_| true);
    }

    /// Move to `Disconnected`. Returns false if already there.
    pub fn disconnect(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Disconnected {
            debug!("Already disconnected");
            return false;
        }
        self.apply(&mut state, ConnectionState::Disconnected);
        true
    }

    /// Drop an unfinished attempt: `Connecting` or `Authenticating` move to
    /// `Disconnected`. Returns false if no attempt was pending.
    pub fn abandon_pending(&self) -> bool {
        let mut state = self.state.lock();
        if !state.is_pending() {
            return false;
        }
        self.apply(&mut state, ConnectionState::Disconnected);
        true
    }

    fn transition(
        &self,
        to: ConnectionState,
        allowed: impl FnOnce(&ConnectionState) -> bool,
    ) -> Result<(), StateError> {
        let mut state = self.state.lock();
        if !allowed(&state) {
            return Err(StateError::InvalidTransition {
                from: state.clone(),
                to,
            });
        }
        self.apply(&mut state, to);
        Ok(())
    }

    // Publishing under the lock keeps observed order equal to applied order
    fn apply(&self, state: &mut ConnectionState, to: ConnectionState) {
        let from = std::mem::replace(state, to.clone());
        info!("Connection state: {} -> {}", from, to);
        let _ = self.tx.send(StateTransition { from, to });
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
