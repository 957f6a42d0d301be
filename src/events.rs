//! # Events
//!
//! Bounded queue of domain events from the receive loop to the control side.
//!
//! Publishing never blocks ingestion: when the consumer falls behind, events
//! are dropped and counted. Series data and connection state stay readable
//! through the logger itself, so a dropped event loses a notification, not data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::series::Sample;
use crate::transport::ConnectionState;

/// Default event queue capacity
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Something the UI layer may want to show
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The transport changed state
    ConnectionStateChanged(ConnectionState),
    /// A framed line, before decoding
    LineReceived(String),
    /// A sample was added to a channel's series
    SampleAppended { channel: usize, sample: Sample },
    /// A record did not advance the session clock
    RecordRejected(String),
    /// A line could not be decoded into a record
    DecodeError(String),
    /// Human-readable notice for transport-level failures
    Notice { title: String, message: String },
}

/// Receiving end of the event queue
pub type EventReceiver = mpsc::Receiver<Event>;

/// Cloneable, non-blocking publishing end of the event queue
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Queue `event`, dropping it if the queue is full or the receiver is gone.
    pub fn publish(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Shorthand for a [`Event::Notice`]
    pub fn notice(&self, title: &str, message: impl Into<String>) {
        self.publish(Event::Notice {
            title: title.to_string(),
            message: message.into(),
        });
    }

    /// Events dropped because the queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Creates a bounded event queue.
#[must_use]
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}
