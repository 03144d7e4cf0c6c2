//! PocketShell - SSH session core for a mobile terminal client
//!
//! Drives one interactive shell session over SSH: credential resolution,
//! connection state, ordered input, terminal geometry, background
//! keep-alive and bounded reconnect. Rendering and profile management live
//! in the host app.

pub mod config;
pub mod session;
pub mod ssh;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{AuthDescriptor, ConnectionProfile, ProtocolKind, SecretLookup, Settings};
pub use session::{
    ConnectionState, SessionError, SessionOrchestrator, StateTransition, TerminalEvent,
    WriteTicket,
};
pub use ssh::{RusshTransport, SshError};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter. Safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
