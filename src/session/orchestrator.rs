//! Session Orchestrator
//!
//! The single entry point the presentation layer talks to. Wires the auth
//! resolver, transport session, write serializer, geometry tracker, state
//! machine and lifecycle controller together, and owns the automatic
//! reconnect loop.
//!
//! Must be built inside a Tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::auth::{resolve, username_for};
use super::error::SessionError;
use super::events::{ErrorCategory, StatusReport, StatusReporter, TerminalEvent};
use super::geometry::{TerminalGeometry, TerminalSizeTracker};
use super::lifecycle::{
    BackgroundExecution, Feedback, NoBackgroundExecution, NoFeedback, ReconnectPolicy,
    SessionLifecycleController,
};
use super::serializer::{WriteSerializer, WriteTicket};
use super::state::{ConnectionState, ConnectionStateMachine, StateTransition};
use super::transport::{LinkClosed, TransportSession};
use crate::config::{ConnectionProfile, SecretLookup, Settings};
use crate::ssh::{AuthStrategy, SshTarget, Transport};

/// How an attempt enters `Connecting`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// New or retried connection; tears down whatever is live first
    Fresh,
    /// Explicit reconnect of the current profile
    Reconnect,
}

/// Leaves `Connecting` / `Authenticating` when an attempt ends without an
/// outcome (cancelled, or its future dropped). Must be dropped while the
/// connect lock is still held.
struct PendingAttempt<'a>(&'a ConnectionStateMachine);

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if self.0.abandon_pending() {
            debug!("Abandoned unfinished connection attempt");
        }
    }
}

pub struct SessionOrchestratorBuilder {
    transport: Arc<dyn Transport>,
    secrets: Arc<dyn SecretLookup>,
    settings: Settings,
    feedback: Arc<dyn Feedback>,
    background: Arc<dyn BackgroundExecution>,
}

impl SessionOrchestratorBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn background_execution(mut self, host: Arc<dyn BackgroundExecution>) -> Self {
        self.background = host;
        self
    }

    pub fn build(self) -> SessionOrchestrator {
        let settings = self.settings;
        let reporter = StatusReporter::new(64);
        let state = Arc::new(ConnectionStateMachine::new());
        let serializer = Arc::new(WriteSerializer::new(reporter.clone()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let transport = TransportSession::new(
            self.transport,
            state.clone(),
            serializer.clone(),
            events_tx.clone(),
            link_tx,
        );
        let lifecycle = SessionLifecycleController::new(
            state.clone(),
            serializer.clone(),
            self.background,
            settings.keepalive_interval(),
            ReconnectPolicy::new(
                settings.auto_reconnect,
                settings.max_reconnect_attempts,
                settings.reconnect_delay(),
            ),
        );

        let inner = Arc::new(Inner {
            secrets: self.secrets,
            state,
            serializer,
            geometry: TerminalSizeTracker::new(),
            transport,
            lifecycle,
            feedback: self.feedback,
            haptics: AtomicBool::new(settings.haptic_feedback),
            reporter,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            profile: Mutex::new(None),
            attempt: Mutex::new(CancellationToken::new()),
            connect_lock: tokio::sync::Mutex::new(()),
            settings,
        });

        tokio::spawn(supervise_links(Arc::downgrade(&inner), link_rx));
        SessionOrchestrator { inner }
    }
}

pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    secrets: Arc<dyn SecretLookup>,
    settings: Settings,
    state: Arc<ConnectionStateMachine>,
    serializer: Arc<WriteSerializer>,
    geometry: TerminalSizeTracker,
    transport: TransportSession,
    lifecycle: SessionLifecycleController,
    feedback: Arc<dyn Feedback>,
    haptics: AtomicBool,
    reporter: StatusReporter,
    events_tx: mpsc::UnboundedSender<TerminalEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TerminalEvent>>>,
    /// Profile of the most recent connect, reused by reconnects
    profile: Mutex<Option<ConnectionProfile>>,
    /// Cancels the in-flight attempt and any pending reconnect loop
    attempt: Mutex<CancellationToken>,
    /// One attempt runs at a time
    connect_lock: tokio::sync::Mutex<()>,
}

impl SessionOrchestrator {
    pub fn builder(
        transport: Arc<dyn Transport>,
        secrets: Arc<dyn SecretLookup>,
    ) -> SessionOrchestratorBuilder {
        SessionOrchestratorBuilder {
            transport,
            secrets,
            settings: Settings::default(),
            feedback: Arc::new(NoFeedback),
            background: Arc::new(NoBackgroundExecution),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Observation
    // ═══════════════════════════════════════════════════════════════════════

    pub fn state(&self) -> ConnectionState {
        self.inner.state.state()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<StateTransition> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<StatusReport> {
        self.inner.reporter.subscribe()
    }

    /// The terminal event stream. Single consumer: only the first call
    /// returns it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TerminalEvent>> {
        self.inner.events_rx.lock().take()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lifecycle.policy().attempts()
    }

    pub fn geometry(&self) -> TerminalGeometry {
        self.inner.geometry.current()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Connection control
    // ═══════════════════════════════════════════════════════════════════════

    /// Connect to `profile`, replacing any live session.
    ///
    /// Credential problems are reported and returned without touching the
    /// connection state. Retryable transport failures schedule automatic
    /// reconnects when enabled.
    pub async fn connect(&self, profile: ConnectionProfile) -> Result<(), SessionError> {
        let strategy = self.inner.resolve(&profile)?;
        *self.inner.profile.lock() = Some(profile.clone());
        let token = self.inner.new_attempt();
        self.inner
            .clone()
            .attempt(&profile, strategy, Entry::Fresh, token)
            .await
    }

    /// Re-establish the current profile's session
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        let profile = self
            .inner
            .profile
            .lock()
            .clone()
            .ok_or(SessionError::NoProfile)?;
        let strategy = self.inner.resolve(&profile)?;
        let token = self.inner.new_attempt();
        self.inner
            .clone()
            .attempt(&profile, strategy, Entry::Reconnect, token)
            .await
    }

    /// Stop everything: pending attempts, reconnect loop, live session and
    /// keep-alive. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.attempt.lock().cancel();
        self.inner.transport.close().await;
        self.inner.lifecycle.stop_keepalive();
        if self.inner.state.disconnect() {
            info!("Disconnected by user");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Input / output
    // ═══════════════════════════════════════════════════════════════════════

    /// Queue typed text as UTF-8
    pub fn send(&self, text: &str) -> WriteTicket {
        self.inner
            .serializer
            .enqueue(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Queue bytes verbatim
    pub fn send_raw(&self, data: impl Into<Bytes>) -> WriteTicket {
        self.inner.serializer.enqueue(data)
    }

    /// Queue an escape / control sequence (arrow keys, Ctrl-C, ...)
    pub fn send_control_sequence(&self, sequence: &[u8]) -> WriteTicket {
        trace!("Control sequence {:02x?}", sequence);
        self.inner
            .serializer
            .enqueue(Bytes::copy_from_slice(sequence))
    }

    /// Report the renderer's size; forwarded only when it changed
    pub async fn resize(&self, cols: u16, rows: u16) {
        let Some(geometry) = self.inner.geometry.report(cols, rows) else {
            return;
        };
        match self.inner.transport.resize(geometry).await {
            Ok(true) => debug!("Window change {}x{}", geometry.cols, geometry.rows),
            Ok(false) => {}
            Err(e) => warn!("Window change failed: {}", e),
        }
    }

    /// Ask the renderer to clear its buffer. The session is untouched.
    pub fn clear_output(&self) {
        let _ = self.inner.events_tx.send(TerminalEvent::Reset);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Host lifecycle and settings
    // ═══════════════════════════════════════════════════════════════════════

    pub fn on_background(&self) {
        self.inner.lifecycle.on_background();
    }

    pub fn on_foreground(&self) {
        self.inner.lifecycle.on_foreground();
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.lifecycle.policy().set_enabled(enabled);
    }

    pub fn set_haptic_feedback(&self, enabled: bool) {
        self.inner.haptics.store(enabled, Ordering::SeqCst);
    }
}

impl Inner {
    fn resolve(&self, profile: &ConnectionProfile) -> Result<AuthStrategy, SessionError> {
        resolve(profile, self.secrets.as_ref()).map_err(|e| {
            self.reporter.report(ErrorCategory::Config, e.to_string());
            SessionError::Config(e)
        })
    }

    /// Cancel whatever attempt is running and start a new epoch
    fn new_attempt(&self) -> CancellationToken {
        let mut current = self.attempt.lock();
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    fn target_for(&self, profile: &ConnectionProfile) -> SshTarget {
        SshTarget::new(profile.host.clone(), profile.port, username_for(profile))
            .with_timeout(self.settings.connect_timeout_secs)
            .with_host_key_fingerprint(profile.host_key_fingerprint.clone())
    }

    /// One attempt, plus the reconnect loop if it fails retryably
    async fn attempt(
        self: Arc<Self>,
        profile: &ConnectionProfile,
        strategy: AuthStrategy,
        entry: Entry,
        token: CancellationToken,
    ) -> Result<(), SessionError> {
        let result = self.establish(profile, strategy, entry, &token).await;
        if let Err(e) = &result {
            if e.is_retryable() {
                self.spawn_reconnect(token);
            }
        }
        result
    }

    async fn establish(
        &self,
        profile: &ConnectionProfile,
        strategy: AuthStrategy,
        entry: Entry,
        token: &CancellationToken,
    ) -> Result<(), SessionError> {
        let _guard = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SessionError::Cancelled),
            guard = self.connect_lock.lock() => guard,
        };
        let _pending = PendingAttempt(&self.state);

        match entry {
            Entry::Fresh => {
                self.transport.close().await;
                if !matches!(self.state.state(), ConnectionState::Error(_)) {
                    self.state.disconnect();
                }
                self.state
                    .start_connecting()
                    .map_err(|_| SessionError::Cancelled)?;
            }
            Entry::Reconnect => {
                self.transport.close().await;
                self.state
                    .begin_reconnect()
                    .map_err(|_| SessionError::Cancelled)?;
            }
        }

        let target = self.target_for(profile);
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SessionError::Cancelled),
            outcome = self.transport.connect(
                &target,
                &strategy,
                &self.settings.terminal_type,
                self.geometry.current(),
            ) => outcome,
        };
        drop(strategy);

        match outcome {
            Ok(_) if token.is_cancelled() => {
                // Finished in the same poll that saw the cancel
                self.transport.close().await;
                Err(SessionError::Cancelled)
            }
            Ok(_) => {
                self.lifecycle.policy().record_connected();
                self.lifecycle.on_connected();
                if self.haptics.load(Ordering::SeqCst) {
                    self.feedback.connected();
                }
                Ok(())
            }
            Err(SessionError::Cancelled) => Err(SessionError::Cancelled),
            Err(_) if token.is_cancelled() => Err(SessionError::Cancelled),
            Err(e) => {
                self.state.fail(e.to_string());
                self.reporter.report(e.category(), e.to_string());
                if self.haptics.load(Ordering::SeqCst) {
                    self.feedback.failed();
                }
                Err(e)
            }
        }
    }

    fn spawn_reconnect(self: &Arc<Self>, token: CancellationToken) {
        tokio::spawn(reconnect_loop(self.clone(), token));
    }

    fn on_link_closed(self: &Arc<Self>, closed: LinkClosed) {
        let Some(err) = closed.error else {
            debug!("Session {} ended cleanly", closed.session_id);
            return;
        };
        let err = SessionError::from(err);
        self.reporter
            .report(ErrorCategory::Transport, format!("Connection lost: {}", err));
        if self.haptics.load(Ordering::SeqCst) {
            self.feedback.failed();
        }
        if err.is_retryable() {
            let token = self.new_attempt();
            self.spawn_reconnect(token);
        }
    }
}

/// Bounded retry after a transport failure; every attempt re-resolves
/// credentials and waits the fixed delay first
async fn reconnect_loop(inner: Arc<Inner>, token: CancellationToken) {
    let policy = inner.lifecycle.policy();
    loop {
        if token.is_cancelled() {
            return;
        }
        if !policy.should_attempt_reconnect() {
            if policy.is_enabled() {
                inner.reporter.report(
                    ErrorCategory::Lifecycle,
                    format!(
                        "Giving up after {} reconnect attempts",
                        policy.max_attempts()
                    ),
                );
            }
            return;
        }

        info!(
            "Reconnect attempt {}/{} in {:?}",
            policy.attempts(),
            policy.max_attempts(),
            policy.delay()
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(policy.delay()) => {}
        }

        let Some(profile) = inner.profile.lock().clone() else {
            return;
        };
        let strategy = match inner.resolve(&profile) {
            Ok(strategy) => strategy,
            Err(_) => return,
        };

        match inner.establish(&profile, strategy, Entry::Fresh, &token).await {
            Ok(()) => {
                info!("Reconnected to {}", profile.display_name());
                return;
            }
            Err(e) if e.is_retryable() => continue,
            Err(_) => return,
        }
    }
}

/// Reacts to sessions that ended on their own
async fn supervise_links(inner: Weak<Inner>, mut link_rx: mpsc::UnboundedReceiver<LinkClosed>) {
    while let Some(closed) = link_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_link_closed(closed);
    }
    debug!("Link supervisor stopped");
}
