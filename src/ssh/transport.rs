//! Transport seam between the session core and the SSH library
//!
//! The core never touches russh types directly. It drives a connection
//! through three stages (handshake, authenticate, open PTY) and then works
//! with the three halves of a [`PtyChannel`]:
//!
//! - [`ChannelReader`]: owned by the inbound read loop
//! - [`ChannelWriter`]: owned by the write serializer
//! - [`ChannelControl`]: shared, for window-change and close
//!
//! Tests substitute in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::config::{AuthStrategy, SshTarget};
use super::error::SshError;

/// Factory for transport connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// TCP connect plus key exchange, bounded by `target.timeout_secs`
    async fn handshake(&self, target: &SshTarget) -> Result<Box<dyn TransportConnection>, SshError>;
}

/// A connection that completed the handshake
#[async_trait]
pub trait TransportConnection: Send {
    async fn authenticate(&mut self, username: &str, strategy: &AuthStrategy) -> Result<(), SshError>;

    /// Request a PTY of the given size and start an interactive shell
    async fn open_pty(
        self: Box<Self>,
        term: &str,
        cols: u32,
        rows: u32,
    ) -> Result<PtyChannel, SshError>;
}

/// Inbound half of a shell channel
#[async_trait]
pub trait ChannelReader: Send {
    /// Next chunk from the primary or diagnostic stream, in arrival order.
    ///
    /// `Ok(None)` means the remote side closed the channel in an orderly way;
    /// `Err` means the link failed.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SshError>;
}

/// Outbound half of a shell channel.
///
/// Never called from two call sites concurrently; the write serializer is
/// its only owner.
#[async_trait]
pub trait ChannelWriter: Send {
    async fn write(&mut self, data: Bytes) -> Result<(), SshError>;
}

/// Out-of-band control of a shell channel
#[async_trait]
pub trait ChannelControl: Send + Sync {
    async fn window_change(&self, cols: u32, rows: u32) -> Result<(), SshError>;

    /// Tear down the channel and the underlying connection. Idempotent.
    async fn close(&self);
}

/// An open interactive shell channel, split by owner
pub struct PtyChannel {
    pub reader: Box<dyn ChannelReader>,
    pub writer: Box<dyn ChannelWriter>,
    pub control: Arc<dyn ChannelControl>,
}
