//! # Series Store
//!
//! Per-channel sample sequences ordered by a single shared session clock.
//!
//! Every record carries one timestamp for all of its readings, so the store
//! keeps one "last accepted timestamp" across channels. A record either
//! advances that clock and lands in every channel it maps to, or it is rejected
//! for all of them.
//!
//! The store also tracks running axis bounds for chart rendering: the largest
//! timestamp seen and a value ceiling with 10% headroom.

use crate::error::Rejected;

/// Initial x-axis extent of a fresh series
pub const INITIAL_X_MAX: u64 = 100;

/// Headroom applied when a value exceeds the current y-axis extent
pub const Y_HEADROOM: f64 = 1.1;

/// One point of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: u64,
    pub value: f64,
}

/// Axis extents for one channel; never shrink until the store is reset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    pub x_max: u64,
    pub y_max: f64,
}

impl AxisBounds {
    fn new(display_limit: f64) -> Self {
        Self {
            x_max: INITIAL_X_MAX,
            y_max: display_limit,
        }
    }

    fn include(&mut self, sample: Sample) {
        self.x_max = self.x_max.max(sample.timestamp);
        if sample.value > self.y_max {
            self.y_max = sample.value * Y_HEADROOM;
        }
    }
}

#[derive(Debug, Clone)]
struct Series {
    samples: Vec<Sample>,
    bounds: AxisBounds,
}

/// Append-only sample store, one series per registered channel
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    series: Vec<Series>,
    last_timestamp: u64,
}

impl SeriesStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the series for a newly registered channel and returns its index.
    pub fn add_series(&mut self, display_limit: f64) -> usize {
        self.series.push(Series {
            samples: Vec::new(),
            bounds: AxisBounds::new(display_limit),
        });
        self.series.len() - 1
    }

    /// Checks that `timestamp` advances the shared clock.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] when `timestamp` is not strictly after the last
    /// accepted record. The clock starts at 0, so a record stamped 0 is never
    /// accepted.
    pub fn check(&self, timestamp: u64) -> Result<(), Rejected> {
        if timestamp <= self.last_timestamp {
            return Err(Rejected {
                timestamp,
                last: self.last_timestamp,
            });
        }
        Ok(())
    }

    /// Appends the samples of one record.
    ///
    /// `samples` pairs channel indices with values; channels missing from it
    /// (failed transforms) simply get no point for this record. The clock
    /// advances even when no channel receives a sample.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] and leaves every series untouched if `timestamp`
    /// does not advance the clock.
    pub fn append_record(
        &mut self,
        timestamp: u64,
        samples: &[(usize, f64)],
    ) -> Result<(), Rejected> {
        self.check(timestamp)?;
        self.last_timestamp = timestamp;

        for &(index, value) in samples {
            if let Some(series) = self.series.get_mut(index) {
                let sample = Sample { timestamp, value };
                series.samples.push(sample);
                series.bounds.include(sample);
            }
        }
        Ok(())
    }

    /// Appends a single sample to one channel.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] if the timestamp does not advance the shared clock.
    pub fn append(&mut self, channel_index: usize, sample: Sample) -> Result<(), Rejected> {
        self.append_record(sample.timestamp, &[(channel_index, sample.value)])
    }

    #[must_use]
    pub fn samples(&self, channel_index: usize) -> Option<&[Sample]> {
        self.series.get(channel_index).map(|s| s.samples.as_slice())
    }

    #[must_use]
    pub fn axis_bounds(&self, channel_index: usize) -> Option<AxisBounds> {
        self.series.get(channel_index).map(|s| s.bounds)
    }

    /// Timestamp of the last accepted record, 0 before the first one
    #[must_use]
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    #[must_use]
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Drops every series and restarts the shared clock.
    pub fn reset(&mut self) {
        self.series.clear();
        self.last_timestamp = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(channels: usize) -> SeriesStore {
        let mut store = SeriesStore::new();
        for _ in 0..channels {
            store.add_series(10.0);
        }
        store
    }

    #[test]
    fn test_increasing_timestamps_are_all_kept() {
        let mut store = store_with(2);
        for t in [1, 2, 5, 9] {
            store.append_record(t, &[(0, 1.0), (1, 2.0)]).unwrap();
        }
        for ch in 0..2 {
            let samples = store.samples(ch).unwrap();
            assert_eq!(samples.len(), 4);
            assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        }
    }

    #[test]
    fn test_repeated_timestamp_is_rejected_for_every_channel() {
        let mut store = store_with(2);
        store.append_record(10, &[(0, 1.0), (1, 2.0)]).unwrap();

        let err = store.append_record(10, &[(0, 3.0), (1, 4.0)]).unwrap_err();
        assert_eq!(err, Rejected { timestamp: 10, last: 10 });
        assert!(store.append_record(7, &[(0, 3.0)]).is_err());

        assert_eq!(store.samples(0).unwrap().len(), 1);
        assert_eq!(store.samples(1).unwrap().len(), 1);
        assert_eq!(store.last_timestamp(), 10);
    }

    #[test]
    fn test_timestamp_zero_is_rejected_on_a_fresh_clock() {
        let mut store = store_with(1);
        assert_eq!(store.last_timestamp(), 0);
        let err = store.append(0, Sample { timestamp: 0, value: 1.0 }).unwrap_err();
        assert_eq!(err, Rejected { timestamp: 0, last: 0 });
        assert!(store.samples(0).unwrap().is_empty());

        store.append(0, Sample { timestamp: 1, value: 1.0 }).unwrap();
        assert_eq!(store.samples(0).unwrap().len(), 1);
    }

    #[test]
    fn test_clock_is_shared_across_channels() {
        let mut store = store_with(2);
        store.append(0, Sample { timestamp: 5, value: 1.0 }).unwrap();
        assert!(store.append(1, Sample { timestamp: 5, value: 1.0 }).is_err());
        assert!(store.samples(1).unwrap().is_empty());
    }

    #[test]
    fn test_missing_channel_sample_still_advances_clock() {
        let mut store = store_with(2);
        store.append_record(3, &[(1, 2.0)]).unwrap();
        assert!(store.samples(0).unwrap().is_empty());
        assert_eq!(store.samples(1).unwrap().len(), 1);
        assert!(store.check(3).is_err());
    }

    #[test]
    fn test_axis_bounds_start_from_display_limit() {
        let store = store_with(1);
        assert_eq!(
            store.axis_bounds(0),
            Some(AxisBounds { x_max: 100, y_max: 10.0 })
        );
    }

    #[test]
    fn test_axis_bounds_grow_with_headroom() {
        let mut store = store_with(1);
        store.append_record(50, &[(0, 5.0)]).unwrap();
        assert_eq!(store.axis_bounds(0).unwrap().x_max, 100);
        assert_eq!(store.axis_bounds(0).unwrap().y_max, 10.0);

        store.append_record(250, &[(0, 20.0)]).unwrap();
        let bounds = store.axis_bounds(0).unwrap();
        assert_eq!(bounds.x_max, 250);
        assert!((bounds.y_max - 22.0).abs() < 1e-9);

        store.append_record(260, &[(0, 1.0)]).unwrap();
        let after = store.axis_bounds(0).unwrap();
        assert_eq!(after.x_max, 260);
        assert_eq!(after.y_max, bounds.y_max);
    }

    #[test]
    fn test_reset_clears_series_and_clock() {
        let mut store = store_with(1);
        store.append_record(10, &[(0, 1.0)]).unwrap();
        store.reset();
        assert_eq!(store.series_count(), 0);
        assert_eq!(store.last_timestamp(), 0);
        store.add_series(1.0);
        assert!(store.append_record(0, &[(0, 1.0)]).is_err());
        assert!(store.append_record(1, &[(0, 1.0)]).is_ok());
    }

    #[test]
    fn test_unknown_channel_index_is_ignored() {
        let mut store = store_with(1);
        store.append_record(1, &[(3, 1.0)]).unwrap();
        assert!(store.samples(3).is_none());
        assert!(store.samples(0).unwrap().is_empty());
    }
}
