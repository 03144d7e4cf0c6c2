//! Transport Session
//!
//! Owns at most one live shell session: its reader loop, its write lane and
//! its control handle. Drives handshake → authenticate → PTY for a target,
//! forwards inbound chunks to the terminal event stream, and reports link
//! loss to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::SessionError;
use super::events::TerminalEvent;
use super::geometry::TerminalGeometry;
use super::serializer::WriteSerializer;
use super::state::ConnectionStateMachine;
use crate::ssh::{AuthStrategy, ChannelControl, ChannelReader, PtyChannel, SshError, SshTarget, Transport};

/// Sent when a live session ends without being asked to
#[derive(Debug)]
pub struct LinkClosed {
    pub session_id: String,
    /// `None` for an orderly remote close
    pub error: Option<SshError>,
}

struct SessionHandle {
    id: String,
    control: Arc<dyn ChannelControl>,
    cancel: CancellationToken,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

/// Everything the reader loop needs after the session is installed
#[derive(Clone)]
struct Shared {
    state: Arc<ConnectionStateMachine>,
    serializer: Arc<WriteSerializer>,
    events: mpsc::UnboundedSender<TerminalEvent>,
    link_tx: mpsc::UnboundedSender<LinkClosed>,
    active: Arc<Mutex<Option<SessionHandle>>>,
}

pub struct TransportSession {
    transport: Arc<dyn Transport>,
    shared: Shared,
}

impl TransportSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        state: Arc<ConnectionStateMachine>,
        serializer: Arc<WriteSerializer>,
        events: mpsc::UnboundedSender<TerminalEvent>,
        link_tx: mpsc::UnboundedSender<LinkClosed>,
    ) -> Self {
        Self {
            transport,
            shared: Shared {
                state,
                serializer,
                events,
                link_tx,
                active: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// Establish a session. The caller has already moved the state machine
    /// to `Connecting`; on success it is `Connected`.
    ///
    /// Returns [`SessionError::Cancelled`] if the state was changed
    /// underneath the attempt (e.g. a user disconnect).
    pub async fn connect(
        &self,
        target: &SshTarget,
        strategy: &AuthStrategy,
        term: &str,
        geometry: TerminalGeometry,
    ) -> Result<String, SessionError> {
        self.close().await;

        info!("Connecting to {} as {}", target.addr(), target.username);
        let mut connection = self.transport.handshake(target).await?;

        if self.shared.state.authenticating().is_err() {
            return Err(SessionError::Cancelled);
        }

        let limit = Duration::from_secs(target.timeout_secs);
        timeout(limit, connection.authenticate(&target.username, strategy))
            .await
            .map_err(|_| SshError::Timeout("Authentication timed out".into()))??;
        debug!("Authenticated {} via {}", target.username, strategy.kind());

        let pty = timeout(
            limit,
            connection.open_pty(term, geometry.cols.into(), geometry.rows.into()),
        )
        .await
        .map_err(|_| SshError::Timeout("Opening shell timed out".into()))??;

        let session_id = Uuid::new_v4().to_string();
        let control = pty.control.clone();
        self.install(&session_id, pty);

        if self.shared.state.connected().is_err() {
            warn!("Session {} established after the attempt was abandoned", session_id);
            self.close().await;
            control.close().await;
            return Err(SessionError::Cancelled);
        }

        info!("Session {} connected to {}", session_id, target.addr());
        Ok(session_id)
    }

    fn install(&self, session_id: &str, pty: PtyChannel) {
        let PtyChannel {
            reader,
            writer,
            control,
        } = pty;
        let cancel = CancellationToken::new();
        let writer_task = self.shared.serializer.attach(session_id, writer);

        // Hold the slot while spawning so the loop cannot observe it empty
        let mut active = self.shared.active.lock();
        let reader_task = tokio::spawn(read_loop(
            self.shared.clone(),
            session_id.to_string(),
            reader,
            control.clone(),
            cancel.clone(),
        ));
        *active = Some(SessionHandle {
            id: session_id.to_string(),
            control,
            cancel,
            reader_task,
            writer_task,
        });
    }

    /// Tear down the active session, if any. Idempotent; leaves the state
    /// machine alone.
    pub async fn close(&self) {
        let handle = self.shared.active.lock().take();
        let Some(handle) = handle else {
            return;
        };

        debug!("Closing session {}", handle.id);
        handle.cancel.cancel();
        self.shared.serializer.detach_session(&handle.id);
        handle.control.close().await;
        let _ = handle.reader_task.await;
        let _ = handle.writer_task.await;
    }

    /// Forward a geometry change. Only issued while `Connected`.
    pub async fn resize(&self, geometry: TerminalGeometry) -> Result<bool, SshError> {
        if !self.shared.state.is_connected() {
            return Ok(false);
        }
        let control = match self.shared.active.lock().as_ref() {
            Some(handle) => handle.control.clone(),
            None => return Ok(false),
        };
        control
            .window_change(geometry.cols.into(), geometry.rows.into())
            .await?;
        Ok(true)
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.shared.active.lock().as_ref().map(|h| h.id.clone())
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.active.lock().take() {
            handle.cancel.cancel();
            self.shared.serializer.detach_session(&handle.id);
        }
    }
}

async fn read_loop(
    shared: Shared,
    session_id: String,
    mut reader: Box<dyn ChannelReader>,
    control: Arc<dyn ChannelControl>,
    cancel: CancellationToken,
) {
    let outcome = loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Reader for session {} cancelled", session_id);
                return;
            }
            chunk = reader.next_chunk() => chunk,
        };
        match chunk {
            Ok(Some(data)) => {
                // A dropped receiver only means nobody renders
                let _ = shared.events.send(TerminalEvent::Data(data));
            }
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };

    // Only the active session may move the state machine
    {
        let mut active = shared.active.lock();
        if active.as_ref().map(|h| h.id.as_str()) != Some(session_id.as_str()) {
            debug!("Stale reader for session {} exited", session_id);
            return;
        }
        *active = None;
    }

    shared.serializer.detach_session(&session_id);
    control.close().await;

    match &outcome {
        None => {
            info!("Session {} closed by remote", session_id);
            shared.state.disconnect();
        }
        Some(e) => {
            warn!("Session {} link lost: {}", session_id, e);
            shared.state.fail(e.to_string());
        }
    }

    let _ = shared.link_tx.send(LinkClosed {
        session_id,
        error: outcome,
    });
}
