//! Session Lifecycle
//!
//! Host-lifecycle policy around a live session:
//!
//! - background keep-alive: while suspended and `Connected`, a single NUL
//!   byte is queued through the write serializer every interval so idle
//!   NAT/firewall paths stay open
//! - extended-execution grants from the host, held while suspended
//! - bounded automatic reconnect after a transport failure

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::serializer::WriteSerializer;
use super::state::ConnectionStateMachine;

/// Byte queued as a keep-alive; a NUL is a no-op for the remote shell
pub const KEEPALIVE_PAYLOAD: &[u8] = &[0u8];

/// Opaque handle for a granted extended-execution window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionGrant(pub u64);

/// Host hook for running while the app is suspended
pub trait BackgroundExecution: Send + Sync {
    /// Ask for extra execution time; `None` when the host refuses
    fn begin(&self) -> Option<ExecutionGrant>;

    fn end(&self, grant: ExecutionGrant);
}

/// Host without background execution support
pub struct NoBackgroundExecution;

impl BackgroundExecution for NoBackgroundExecution {
    fn begin(&self) -> Option<ExecutionGrant> {
        None
    }

    fn end(&self, _grant: ExecutionGrant) {}
}

/// Haptic / audible cues on connection outcomes
pub trait Feedback: Send + Sync {
    fn connected(&self);
    fn failed(&self);
}

pub struct NoFeedback;

impl Feedback for NoFeedback {
    fn connected(&self) {}
    fn failed(&self) {}
}

/// Bounded automatic reconnect
pub struct ReconnectPolicy {
    enabled: AtomicBool,
    max_attempts: u32,
    delay: Duration,
    attempts: AtomicU32,
}

impl ReconnectPolicy {
    pub fn new(enabled: bool, max_attempts: u32, delay: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            max_attempts,
            delay,
            attempts: AtomicU32::new(0),
        }
    }

    /// Consume one attempt. False when disabled or exhausted.
    pub fn should_attempt_reconnect(&self) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            return false;
        }
        let max = self.max_attempts;
        self.attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Reset after reaching `Connected`
    pub fn record_connected(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Keep-alive period used when none (or zero) is configured
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

struct Keepalive {
    cancel: CancellationToken,
    grant: Option<ExecutionGrant>,
}

#[derive(Default)]
struct Background {
    suspended: bool,
    keepalive: Option<Keepalive>,
}

pub struct SessionLifecycleController {
    state: Arc<ConnectionStateMachine>,
    serializer: Arc<WriteSerializer>,
    host: Arc<dyn BackgroundExecution>,
    keepalive_interval: Duration,
    policy: ReconnectPolicy,
    background: Mutex<Background>,
}

impl SessionLifecycleController {
    pub fn new(
        state: Arc<ConnectionStateMachine>,
        serializer: Arc<WriteSerializer>,
        host: Arc<dyn BackgroundExecution>,
        keepalive_interval: Duration,
        policy: ReconnectPolicy,
    ) -> Self {
        let keepalive_interval = if keepalive_interval.is_zero() {
            warn!(
                "Keep-alive interval of zero, using {:?}",
                DEFAULT_KEEPALIVE_INTERVAL
            );
            DEFAULT_KEEPALIVE_INTERVAL
        } else {
            keepalive_interval
        };
        Self {
            state,
            serializer,
            host,
            keepalive_interval,
            policy,
            background: Mutex::new(Background::default()),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// App suspended. The keep-alive runs now if a session is live,
    /// otherwise once one reaches `Connected`.
    pub fn on_background(&self) {
        let mut background = self.background.lock();
        background.suspended = true;
        if self.state.is_connected() {
            self.start_keepalive(&mut background);
        } else {
            debug!("Backgrounded without a live session");
        }
    }

    /// A session reached `Connected`
    pub fn on_connected(&self) {
        let mut background = self.background.lock();
        if background.suspended {
            self.start_keepalive(&mut background);
        }
    }

    /// App resumed. Stops the keep-alive and releases the grant. Idempotent.
    pub fn on_foreground(&self) {
        let mut background = self.background.lock();
        background.suspended = false;
        self.stop(&mut background);
    }

    /// Session torn down; the app may still be suspended
    pub fn stop_keepalive(&self) {
        self.stop(&mut self.background.lock());
    }

    pub fn is_suspended(&self) -> bool {
        self.background.lock().suspended
    }

    pub fn is_keepalive_running(&self) -> bool {
        self.background.lock().keepalive.is_some()
    }

    fn start_keepalive(&self, background: &mut Background) {
        if background.keepalive.is_some() {
            return;
        }
        let grant = self.host.begin();
        let cancel = CancellationToken::new();
        tokio::spawn(keepalive_loop(
            self.state.clone(),
            self.serializer.clone(),
            self.keepalive_interval,
            cancel.clone(),
        ));
        info!(
            "Background keep-alive every {:?} (grant: {:?})",
            self.keepalive_interval, grant
        );
        background.keepalive = Some(Keepalive { cancel, grant });
    }

    fn stop(&self, background: &mut Background) {
        let Some(keepalive) = background.keepalive.take() else {
            return;
        };
        keepalive.cancel.cancel();
        if let Some(grant) = keepalive.grant {
            self.host.end(grant);
        }
        debug!("Background keep-alive stopped");
    }
}

impl Drop for SessionLifecycleController {
    fn drop(&mut self) {
        self.on_foreground();
    }
}

async fn keepalive_loop(
    state: Arc<ConnectionStateMachine>,
    serializer: Arc<WriteSerializer>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if state.is_connected() {
                    trace!("Queueing keep-alive");
                    // Failures surface through the serializer's report
                    let _ = serializer.enqueue(Bytes::from_static(KEEPALIVE_PAYLOAD));
                }
            }
        }
    }
}
