//! # Transport Module
//!
//! Connection lifecycle over an unreliable byte stream.
//!
//! This module handles:
//! - Opening the device link (serial / RFCOMM TTY, or TCP)
//! - Publishing [`ConnectionState`] transitions exactly once each
//! - Running the dedicated receive loop of a [`Connection`]
//! - Sending plain ASCII commands without waiting on the receive side
//!
//! ## State Machine
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected --peer close / error--> Lost
//!      ^                        |                  |                              |
//!      +-------- failure -------+---- disconnect --+---------- disconnect --------+
//! ```

pub mod connection;
pub mod stream;

pub use connection::{Connection, LoopExit};
pub use stream::{AsyncStream, BoxedStream, Endpoint};

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::events::{Event, EventSender};

/// Link state as seen by the control side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The peer closed or the link failed; reconnecting is up to the user
    Lost,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Lost => "lost",
        };
        f.write_str(name)
    }
}

/// Shared connection state; every actual change is published once as an event.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<ConnectionState>>,
    events: EventSender,
}

impl StateCell {
    pub fn new(events: EventSender) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            tx: Arc::new(tx),
            events,
        }
    }

    #[must_use]
    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Moves to `to`. Returns `false` (and publishes nothing) if already there.
    pub fn set(&self, to: ConnectionState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if *state == to {
                false
            } else {
                *state = to;
                true
            }
        });
        if changed {
            self.announce(to);
        }
        changed
    }

    /// Moves from `from` to `to` only if the current state is `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if *state == from && from != to {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            self.announce(to);
        }
        changed
    }

    fn announce(&self, state: ConnectionState) {
        info!("Connection state: {}", state);
        self.events.publish(Event::ConnectionStateChanged(state));
    }
}
