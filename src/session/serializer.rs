//! Write Serializer
//!
//! Every outbound byte (keystrokes, control sequences, keep-alives) goes
//! through one FIFO lane drained by a single task, so at most one write is
//! in flight on a channel at any time and bytes hit the wire in submission
//! order.
//!
//! The lane is bound to one session. Detaching it (teardown) completes all
//! queued writes with [`WriteError::Discarded`]; writes submitted while no
//! lane is attached complete with [`WriteError::NotConnected`].

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::error::WriteError;
use super::events::{ErrorCategory, StatusReporter};
use crate::ssh::ChannelWriter;

/// Completion handle for one queued write
#[derive(Debug)]
pub struct WriteTicket {
    sequence: u64,
    done: oneshot::Receiver<Result<(), WriteError>>,
}

impl WriteTicket {
    /// Submission order across all writes on this serializer
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Resolves once the bytes were handed to the channel (or dropped)
    pub async fn flushed(self) -> Result<(), WriteError> {
        self.done.await.unwrap_or(Err(WriteError::Discarded))
    }
}

struct PendingWrite {
    sequence: u64,
    data: Bytes,
    done: oneshot::Sender<Result<(), WriteError>>,
}

struct Lane {
    session_id: String,
    tx: mpsc::UnboundedSender<PendingWrite>,
    cancel: CancellationToken,
}

struct Inner {
    lane: Option<Lane>,
    next_sequence: u64,
}

pub struct WriteSerializer {
    inner: Mutex<Inner>,
    reporter: StatusReporter,
}

impl WriteSerializer {
    pub fn new(reporter: StatusReporter) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lane: None,
                next_sequence: 0,
            }),
            reporter,
        }
    }

    /// Queue bytes for the active session
    pub fn enqueue(&self, data: impl Into<Bytes>) -> WriteTicket {
        let (done_tx, done_rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let pending = PendingWrite {
            sequence,
            data: data.into(),
            done: done_tx,
        };
        // Sending under the lock makes queue order equal sequence order
        match &inner.lane {
            Some(lane) => {
                if let Err(mpsc::error::SendError(pending)) = lane.tx.send(pending) {
                    let _ = pending.done.send(Err(WriteError::Discarded));
                }
            }
            None => {
                trace!("Write #{} with no active session", sequence);
                let _ = pending.done.send(Err(WriteError::NotConnected));
            }
        }

        WriteTicket {
            sequence,
            done: done_rx,
        }
    }

    /// Bind the lane to a new session's writer. Any previous lane is discarded.
    pub fn attach(&self, session_id: &str, writer: Box<dyn ChannelWriter>) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let previous = self.inner.lock().lane.replace(Lane {
            session_id: session_id.to_string(),
            tx,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!("Replacing write lane of session {}", previous.session_id);
            previous.cancel.cancel();
        }

        tokio::spawn(drain_lane(
            session_id.to_string(),
            rx,
            writer,
            cancel,
            self.reporter.clone(),
        ))
    }

    /// Unbind the lane, whichever session holds it
    pub fn detach(&self) {
        if let Some(lane) = self.inner.lock().lane.take() {
            lane.cancel.cancel();
        }
    }

    /// Unbind the lane only if it still belongs to `session_id`
    pub fn detach_session(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if inner.lane.as_ref().map(|l| l.session_id.as_str()) == Some(session_id) {
            if let Some(lane) = inner.lane.take() {
                lane.cancel.cancel();
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().lane.is_some()
    }
}

/// The lane's single consumer
async fn drain_lane(
    session_id: String,
    mut rx: mpsc::UnboundedReceiver<PendingWrite>,
    mut writer: Box<dyn ChannelWriter>,
    cancel: CancellationToken,
    reporter: StatusReporter,
) {
    debug!("Write lane started for session {}", session_id);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(PendingWrite {
            sequence,
            data,
            done,
        }) = next
        else {
            break;
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = done.send(Err(WriteError::Discarded));
                break;
            }
            result = writer.write(data) => result,
        };

        match result {
            Ok(()) => {
                trace!("Write #{} flushed", sequence);
                let _ = done.send(Ok(()));
            }
            Err(e) => {
                // Reported once; later writes still get their turn
                reporter.report(ErrorCategory::Write, format!("Write failed: {}", e));
                let _ = done.send(Err(WriteError::Transport(e.to_string())));
            }
        }
    }

    rx.close();
    let mut discarded = 0usize;
    while let Ok(pending) = rx.try_recv() {
        let _ = pending.done.send(Err(WriteError::Discarded));
        discarded += 1;
    }
    debug!(
        "Write lane for session {} stopped ({} queued writes discarded)",
        session_id, discarded
    );
}
