//! # Ingest Pipeline
//!
//! Turns framed lines into series samples and session log rows.
//!
//! ## Control Flow
//!
//! For every line delivered by the framer:
//!
//! 1. **Decode** into a [`RawRecord`]; malformed lines are counted and dropped
//! 2. **Clock check** against the shared last accepted timestamp; stale records
//!    are dropped for every channel
//! 3. **Transform** each mapped reading; a failing field only loses its own sample
//! 4. **Store** the surviving samples in one step
//! 5. **Persist** the record's original fields; failures are logged, never rolled back
//!
//! Nothing here is fatal: the receive loop keeps running whatever a line contains.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

use crate::channel::transform::transform;
use crate::channel::{Channel, ChannelRegistry};
use crate::error::ChannelError;
use crate::events::{Event, EventSender};
use crate::protocol::framer::Frame;
use crate::protocol::record::{decode, RawRecord};
use crate::series::{AxisBounds, Sample, SeriesStore};
use crate::storage::RecordSink;

/// Counters kept by the pipeline since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub accepted: u64,
    pub malformed: u64,
    pub rejected: u64,
    pub transform_errors: u64,
    pub persist_errors: u64,
    pub overflows: u64,
}

/// What happened to one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Record accepted; `samples` channels received a point
    Accepted { samples: usize },
    /// Line was not a valid record
    Malformed,
    /// Record did not advance the session clock
    Rejected,
}

/// Channel registry, series store and session log behind one lock
pub struct Ingest {
    registry: ChannelRegistry,
    store: SeriesStore,
    sink: Option<Box<dyn RecordSink>>,
    stats: IngestStats,
}

impl std::fmt::Debug for Ingest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingest")
            .field("registry", &self.registry)
            .field("stats", &self.stats)
            .field("persisting", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Ingest {
    fn default() -> Self {
        Self::new()
    }
}

impl Ingest {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ChannelRegistry::new(),
            store: SeriesStore::new(),
            sink: None,
            stats: IngestStats::default(),
        }
    }

    /// Registers a channel and creates its series.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::RegistryFull`] when every reading slot is mapped.
    pub fn add_channel(&mut self, channel: Channel) -> Result<usize, ChannelError> {
        let limit = channel.display_limit();
        let index = self.registry.add_channel(channel)?;
        let series = self.store.add_series(limit);
        debug_assert_eq!(index, series);
        Ok(index)
    }

    /// Clears channels, series, the session clock and the counters.
    ///
    /// The session log stays open: it belongs to the connection, not the layout.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.store.reset();
        self.stats = IngestStats::default();
    }

    /// Replaces the session log; `None` stops persisting.
    pub fn set_sink(&mut self, sink: Option<Box<dyn RecordSink>>) {
        self.sink = sink;
    }

    #[must_use]
    pub fn is_persisting(&self) -> bool {
        self.sink.is_some()
    }

    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    #[must_use]
    pub fn samples(&self, channel_index: usize) -> Option<&[Sample]> {
        self.store.samples(channel_index)
    }

    #[must_use]
    pub fn axis_bounds(&self, channel_index: usize) -> Option<AxisBounds> {
        self.store.axis_bounds(channel_index)
    }

    #[must_use]
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Handles one framer output.
    pub fn process_frame(&mut self, frame: Frame, events: &EventSender) -> LineOutcome {
        match frame {
            Frame::Line(line) => self.process_line(&line, events),
            Frame::Overflow(dropped) => {
                self.stats.overflows += 1;
                self.stats.malformed += 1;
                events.publish(Event::DecodeError(format!(
                    "line exceeded buffer limit ({} bytes discarded)",
                    dropped
                )));
                LineOutcome::Malformed
            }
        }
    }

    /// Runs one line through decode, clock check, transform, store and persist.
    pub fn process_line(&mut self, line: &str, events: &EventSender) -> LineOutcome {
        self.stats.lines += 1;
        events.publish(Event::LineReceived(line.to_string()));

        let record = match decode(line) {
            Ok(record) => record,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Ignoring line {:?}: {}", line.trim(), e);
                events.publish(Event::DecodeError(e.to_string()));
                return LineOutcome::Malformed;
            }
        };

        if let Err(rejected) = self.store.check(record.timestamp()) {
            self.stats.rejected += 1;
            debug!("Dropping record: {}", rejected);
            events.publish(Event::RecordRejected(rejected.to_string()));
            return LineOutcome::Rejected;
        }

        let samples = self.transform_record(&record);
        if let Err(rejected) = self.store.append_record(record.timestamp(), &samples) {
            self.stats.rejected += 1;
            events.publish(Event::RecordRejected(rejected.to_string()));
            return LineOutcome::Rejected;
        }

        for &(channel, value) in &samples {
            events.publish(Event::SampleAppended {
                channel,
                sample: Sample {
                    timestamp: record.timestamp(),
                    value,
                },
            });
        }

        self.persist(&record);
        self.stats.accepted += 1;
        LineOutcome::Accepted {
            samples: samples.len(),
        }
    }

    fn transform_record(&mut self, record: &RawRecord) -> Vec<(usize, f64)> {
        let mut samples = Vec::with_capacity(self.registry.len());

        for (index, channel) in self.registry.list_channels().iter().enumerate() {
            let Some(raw) = record.reading(index) else {
                continue;
            };
            match transform(channel, raw) {
                Ok(value) => samples.push((index, value)),
                Err(e) => {
                    self.stats.transform_errors += 1;
                    warn!(
                        "Channel {} ({}) at t={}: {}",
                        index,
                        channel.name(),
                        record.timestamp(),
                        e
                    );
                }
            }
        }

        samples
    }

    fn persist(&mut self, record: &RawRecord) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.append_record(record) {
                self.stats.persist_errors += 1;
                error!("Error storing record t={}: {}", record.timestamp(), e);
            }
        }
    }
}

/// [`Ingest`] shared between the receive loop and the control side
pub type SharedIngest = Arc<Mutex<Ingest>>;

/// Locks the shared pipeline, recovering from a poisoned lock.
///
/// Every mutation completes under one lock, so a panic elsewhere cannot leave
/// a record half-applied.
pub fn lock(shared: &SharedIngest) -> MutexGuard<'_, Ingest> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
