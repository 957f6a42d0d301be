//! # Sensor Datalogger Library
//!
//! Ingest, chart-feed and persist line-oriented telemetry from a remote sensor board.
//!
//! The board streams ASCII records `timestamp,f1,f2,f3,f4` over a serial link or TCP.
//! This library frames and decodes them, converts each reading per its channel,
//! keeps per-channel time series for plotting, and appends every accepted record
//! to a CSV session log.

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod pipeline;
pub mod protocol;
pub mod series;
pub mod storage;
pub mod transport;
