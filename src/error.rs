//! # Error Types
//!
//! Custom error types for the sensor datalogger using `thiserror`.
//!
//! Transport failures ([`ConnectError`], [`SendError`]) are surfaced to the caller.
//! Per-record and per-field failures ([`DecodeError`], [`TransformError`],
//! [`Rejected`]) are absorbed by the ingest pipeline and only ever logged or counted.

use thiserror::Error;

/// Main error type for the sensor datalogger
#[derive(Debug, Error)]
pub enum DataloggerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Connection attempt failed
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Command could not be sent
    #[error(transparent)]
    Send(#[from] SendError),

    /// Channel registry errors
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Profile store errors
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the sensor datalogger
pub type Result<T> = std::result::Result<T, DataloggerError>;

/// Failure to establish a transport connection.
///
/// Fatal to the connect attempt only; the connection state stays `Disconnected`.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The peer refused or the device could not be opened
    #[error("Failed to connect to {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The peer did not answer within the connect timeout
    #[error("Timed out connecting to {endpoint} after {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// A receive loop is still attached to this logger
    #[error("Already connected (state: {0})")]
    AlreadyConnected(crate::transport::ConnectionState),
}

/// Failure to send a command to the device.
#[derive(Debug, Error)]
pub enum SendError {
    /// No connection is currently established
    #[error("Not connected")]
    NotConnected,

    /// The write half of the transport failed
    #[error("Failed to send command: {0}")]
    Transport(#[source] std::io::Error),
}

/// A framed line that is not a valid record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Wrong field count or unparseable timestamp
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

/// A single field that could not be converted to a display value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// The raw field is not a number
    #[error("Invalid numeric field {0:?}")]
    InvalidNumber(String),

    /// Voltage divider inversion at (or numerically at) the reference rail
    #[error("Voltage {voltage} V is at the {reference} V reference rail")]
    Singularity { voltage: f64, reference: f64 },
}

/// A record whose timestamp does not advance the shared session clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Timestamp {timestamp} is not after last accepted timestamp {last}")]
pub struct Rejected {
    pub timestamp: u64,
    pub last: u64,
}

/// Channel construction and registry errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    /// Display limit must be a positive finite number
    #[error("Display limit must be positive, got {0}")]
    InvalidDisplayLimit(f64),

    /// Every reading slot of the record is already mapped
    #[error("Channel registry is full ({0} channels)")]
    RegistryFull(usize),
}

/// Named profile store errors.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No profile saved under this name
    #[error("Profile '{0}' not found")]
    NotFound(String),

    /// The store file could not be read or written
    #[error("Profile store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not valid JSON
    #[error("Profile store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A saved descriptor does not describe a valid channel
    #[error("Invalid channel in profile: {0}")]
    InvalidChannel(#[from] ChannelError),
}
