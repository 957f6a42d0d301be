//! # Connection
//!
//! One live device link and its dedicated receive loop.
//!
//! The stream is split into independent halves: the receive loop owns the read
//! half and drives framer, decoder and pipeline in order, while commands are
//! written through the write half without waiting on the loop.
//!
//! Closing signals the loop through a oneshot channel, so a read blocked on a
//! silent device returns immediately. Dropping a [`Connection`] without closing
//! it sends the same signal.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{BoxedStream, ConnectionState, StateCell};
use crate::error::SendError;
use crate::events::EventSender;
use crate::pipeline::{lock, SharedIngest};
use crate::protocol::framer::LineFramer;

/// Why a receive loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Closed from the control side
    Cancelled,
    /// The peer closed the stream (zero-byte read)
    PeerClosed,
    /// The transport reported a read error
    ReadError(String),
    /// The connection left `Connected` for another reason (e.g. a failed send)
    Superseded(ConnectionState),
}

/// Everything the receive loop needs besides the stream
#[derive(Debug, Clone)]
pub struct ReceiveContext {
    pub ingest: SharedIngest,
    pub state: StateCell,
    pub events: EventSender,
    pub max_line_bytes: usize,
    pub read_buffer_size: usize,
}

type SharedWriter = Arc<Mutex<Option<WriteHalf<BoxedStream>>>>;

/// A connected device link with a running receive loop
pub struct Connection {
    label: String,
    writer: SharedWriter,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<LoopExit>>,
    state: StateCell,
    events: EventSender,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("label", &self.label)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Marks the link `Connected` and starts its receive loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(stream: BoxedStream, label: impl Into<String>, ctx: ReceiveContext) -> Self {
        let label = label.into();
        let (reader, writer) = tokio::io::split(stream);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        ctx.state.set(ConnectionState::Connected);
        let state_rx = ctx.state.subscribe();
        let state = ctx.state.clone();
        let events = ctx.events.clone();

        info!("Connected to {}", label);
        let task = tokio::spawn(receive_loop(reader, shutdown_rx, state_rx, ctx));

        Self {
            label,
            writer: Arc::new(Mutex::new(Some(writer))),
            shutdown: Some(shutdown_tx),
            task: Some(task),
            state,
            events,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the receive loop has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Write `command` to the device as-is.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] unless the link is `Connected`, and
    /// [`SendError::Transport`] if the write fails; a failed write also moves
    /// the link to `Lost`.
    pub async fn send(&self, command: &str) -> Result<(), SendError> {
        if self.state.get() != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::NotConnected)?;

        let result = match writer.write_all(command.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!("Sent command {:?} to {}", command, self.label);
                Ok(())
            }
            Err(e) => {
                error!("Error sending {:?} to {}: {}", command, self.label, e);
                if self
                    .state
                    .transition(ConnectionState::Connected, ConnectionState::Lost)
                {
                    self.events
                        .notice("Send Failed", format!("Error sending message: {}", e));
                }
                Err(SendError::Transport(e))
            }
        }
    }

    /// Stops the receive loop, releases the link and moves to `Disconnected`.
    ///
    /// Returns how the loop ended, or `None` if it could not be joined.
    pub async fn close(mut self) -> Option<LoopExit> {
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already be gone; that is fine.
            let _ = shutdown.send(());
        }

        let exit = match self.task.take() {
            Some(task) => match task.await {
                Ok(exit) => Some(exit),
                Err(e) => {
                    error!("Receive loop for {} failed: {}", self.label, e);
                    None
                }
            },
            None => None,
        };

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error shutting down {}: {}", self.label, e);
            }
        }

        self.state.set(ConnectionState::Disconnected);
        info!("Disconnected from {}", self.label);
        exit
    }
}

async fn receive_loop(
    mut reader: ReadHalf<BoxedStream>,
    mut shutdown: oneshot::Receiver<()>,
    mut state_rx: watch::Receiver<ConnectionState>,
    ctx: ReceiveContext,
) -> LoopExit {
    let mut framer = LineFramer::new(ctx.max_line_bytes);
    let mut buf = vec![0u8; ctx.read_buffer_size.max(1)];

    let exit = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break LoopExit::Cancelled,

            changed = state_rx.changed() => {
                let state = *state_rx.borrow_and_update();
                if changed.is_err() || state != ConnectionState::Connected {
                    break LoopExit::Superseded(state);
                }
            }

            read = reader.read(&mut buf) => match read {
                Ok(0) => break LoopExit::PeerClosed,
                Ok(n) => {
                    let frames = framer.feed(&buf[..n]);
                    if !frames.is_empty() {
                        let mut ingest = lock(&ctx.ingest);
                        for frame in frames {
                            ingest.process_frame(frame, &ctx.events);
                        }
                    }
                }
                Err(e) => break LoopExit::ReadError(e.to_string()),
            },
        }
    };

    match &exit {
        LoopExit::Cancelled => {
            ctx.state.set(ConnectionState::Disconnected);
        }
        LoopExit::PeerClosed | LoopExit::ReadError(_) => {
            let reason = match &exit {
                LoopExit::ReadError(e) => format!("Error receiving message: {}", e),
                _ => "Connection lost".to_string(),
            };
            warn!("{}", reason);
            if ctx
                .state
                .transition(ConnectionState::Connected, ConnectionState::Lost)
            {
                ctx.events.notice("Connection Lost", reason);
            }
        }
        LoopExit::Superseded(state) => {
            debug!("Receive loop stopping, connection is {}", state);
        }
    }

    if framer.buffered_len() > 0 {
        debug!("Discarding {} bytes of unterminated line", framer.buffered_len());
    }
    exit
}
