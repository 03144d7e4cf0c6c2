//! SSH shell channel task
//!
//! One task owns the russh `Channel` and multiplexes, via `select!`:
//! outbound commands (data, window-change, close) and inbound channel
//! messages. The core sees this task only through the reader, writer and
//! control halves of a [`PtyChannel`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::error::SshError;
use super::handle_owner::HandleController;
use super::transport::{ChannelControl, ChannelReader, ChannelWriter, PtyChannel};

/// Commands that can be sent to the channel task
#[derive(Debug)]
pub enum SessionCommand {
    /// Data to send to SSH stdin
    Data {
        data: Bytes,
        reply_tx: oneshot::Sender<Result<(), SshError>>,
    },
    /// Resize the PTY (cols, rows)
    Resize {
        cols: u32,
        rows: u32,
        reply_tx: oneshot::Sender<Result<(), SshError>>,
    },
    /// Close the channel
    Close,
}

/// What the channel task hands to the reader half
#[derive(Debug)]
enum Inbound {
    Data(Bytes),
    Closed,
    Failed(String),
}

/// Spawn the channel task and split it into reader, writer and control.
pub fn spawn_shell_channel(
    channel: Channel<Msg>,
    controller: HandleController,
    session_id: String,
) -> PtyChannel {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(256);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(1024);

    tokio::spawn(run_channel(channel, cmd_rx, inbound_tx, controller.clone(), session_id));

    PtyChannel {
        reader: Box::new(RusshReader { inbound_rx }),
        writer: Box::new(RusshWriter {
            cmd_tx: cmd_tx.clone(),
        }),
        control: Arc::new(RusshControl {
            cmd_tx,
            controller,
            closed: AtomicBool::new(false),
        }),
    }
}

async fn run_channel(
    mut channel: Channel<Msg>,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    inbound_tx: mpsc::Sender<Inbound>,
    controller: HandleController,
    sid: String,
) {
    debug!("Channel task started for session {}", sid);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Data { data, reply_tx }) => {
                        let result = channel
                            .data(&data[..])
                            .await
                            .map_err(|e| SshError::ChannelError(e.to_string()));
                        if let Err(e) = &result {
                            error!("Failed to send data to SSH channel: {}", e);
                        }
                        let _ = reply_tx.send(result);
                    }
                    Some(SessionCommand::Resize { cols, rows, reply_tx }) => {
                        debug!("Sending window_change: {}x{} for session {}", cols, rows, sid);
                        let result = channel
                            .window_change(cols, rows, 0, 0)
                            .await
                            .map_err(|e| SshError::ChannelError(e.to_string()));
                        let _ = reply_tx.send(result);
                    }
                    Some(SessionCommand::Close) | None => {
                        info!("Closing channel for session {}", sid);
                        let _ = channel.eof().await;
                        break;
                    }
                }
            }

            msg = channel.wait() => {
                let inbound = match msg {
                    Some(ChannelMsg::Data { data }) => Inbound::Data(Bytes::copy_from_slice(&data)),
                    // Extended stream 1 is stderr; the terminal shows it inline
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        Inbound::Data(Bytes::copy_from_slice(&data))
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => {
                        info!("SSH channel closed by remote for session {}", sid);
                        Inbound::Closed
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        info!("SSH channel exit status {} for session {}", exit_status, sid);
                        continue;
                    }
                    Some(_) => continue,
                    None => Inbound::Failed("SSH connection lost".to_string()),
                };

                let terminal = !matches!(inbound, Inbound::Data(_));
                if inbound_tx.send(inbound).await.is_err() || terminal {
                    break;
                }
            }
        }
    }

    controller.disconnect().await;
    info!("Channel task terminated for session {}", sid);
}

struct RusshReader {
    inbound_rx: mpsc::Receiver<Inbound>,
}

#[async_trait]
impl ChannelReader for RusshReader {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SshError> {
        match self.inbound_rx.recv().await {
            Some(Inbound::Data(data)) => Ok(Some(data)),
            Some(Inbound::Closed) => Ok(None),
            Some(Inbound::Failed(msg)) => Err(SshError::ConnectionFailed(msg)),
            None => Err(SshError::Disconnected),
        }
    }
}

struct RusshWriter {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

#[async_trait]
impl ChannelWriter for RusshWriter {
    async fn write(&mut self, data: Bytes) -> Result<(), SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Data { data, reply_tx })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx.await.map_err(|_| SshError::Disconnected)?
    }
}

struct RusshControl {
    cmd_tx: mpsc::Sender<SessionCommand>,
    controller: HandleController,
    closed: AtomicBool,
}

#[async_trait]
impl ChannelControl for RusshControl {
    async fn window_change(&self, cols: u32, rows: u32) -> Result<(), SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Resize {
                cols,
                rows,
                reply_tx,
            })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx.await.map_err(|_| SshError::Disconnected)?
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // The channel task may already be gone or backed up; the handle
        // disconnect below ends it either way
        let _ = self.cmd_tx.try_send(SessionCommand::Close);
        self.controller.disconnect().await;
    }
}
