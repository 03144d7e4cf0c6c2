//! Session Core
//!
//! Platform-neutral orchestration of one interactive shell session:
//! - Credential resolution per attempt
//! - Explicit connection state machine with ordered transition events
//! - Single-writer outbound lane
//! - Debounced terminal geometry
//! - Background keep-alive and bounded automatic reconnect

mod auth;
mod error;
mod events;
mod geometry;
mod lifecycle;
mod orchestrator;
mod serializer;
mod state;
mod transport;

pub use auth::{resolve, username_for};
pub use error::{ConfigError, SessionError, StateError, WriteError};
pub use events::{ErrorCategory, StatusReport, StatusReporter, TerminalEvent};
pub use geometry::{TerminalGeometry, TerminalSizeTracker, DEFAULT_COLS, DEFAULT_ROWS};
pub use lifecycle::{
    BackgroundExecution, ExecutionGrant, Feedback, NoBackgroundExecution, NoFeedback,
    ReconnectPolicy, SessionLifecycleController, DEFAULT_KEEPALIVE_INTERVAL, KEEPALIVE_PAYLOAD,
};
pub use orchestrator::{SessionOrchestrator, SessionOrchestratorBuilder};
pub use serializer::{WriteSerializer, WriteTicket};
pub use state::{ConnectionState, ConnectionStateMachine, StateTransition};
pub use transport::{LinkClosed, TransportSession};
