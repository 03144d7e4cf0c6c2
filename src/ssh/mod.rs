//! SSH module - the russh-facing transport adapter
//!
//! Everything wire-level (key exchange, ciphers, channel framing) is
//! delegated to russh. This module adapts it to the [`Transport`] seam the
//! session core drives:
//!
//! - Handshake with optional host key pinning
//! - Password and in-memory public key authentication
//! - PTY shell channel owned by a single task, split into reader, writer
//!   and control halves

mod client;
mod config;
mod error;
mod handle_owner;
mod keys;
mod session;
mod transport;

pub use client::{fingerprint, ClientHandler, RusshTransport};
pub use config::{AuthStrategy, SshTarget};
pub use error::SshError;
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController};
pub use keys::{decode_private_key, looks_like_private_key};
pub use session::{spawn_shell_channel, SessionCommand};
pub use transport::{
    ChannelControl, ChannelReader, ChannelWriter, PtyChannel, Transport, TransportConnection,
};
