//! # Channel Module
//!
//! Configured logical sensor channels and their positional mapping onto record fields.
//!
//! ## Channel Assignments
//!
//! | Channel index | Record field | Reading |
//! |---------------|--------------|---------|
//! | 0 | 1 | First sensor reading |
//! | 1 | 2 | Second sensor reading |
//! | 2 | 3 | Third sensor reading |
//! | 3 | 4 | Fourth sensor reading |
//!
//! The order is the protocol between device firmware and client: the registry
//! never reorders channels, and it refuses more channels than a record carries.
//!
//! ## Usage
//!
//! ```
//! use sensor_datalogger::channel::{Channel, ChannelRegistry, TransformKind};
//!
//! let mut registry = ChannelRegistry::new();
//! let idx = registry
//!     .add_channel(Channel::new("Strain gauge", 100.0, TransformKind::VoltageToResistance)?)?;
//! assert_eq!(idx, 0);
//! # Ok::<(), sensor_datalogger::error::ChannelError>(())
//! ```

pub mod profile;
pub mod transform;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::protocol::record::READINGS_PER_RECORD;

/// Conversion applied to a raw reading before it is stored in a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    /// Plain numeric reading
    #[serde(rename = "Identity", alias = "N/A")]
    Identity,
    /// Divider voltage converted to sensor resistance
    #[serde(rename = "Resistance")]
    VoltageToResistance,
    /// Voltage reading (0-4 V display range)
    #[serde(rename = "Voltage")]
    Voltage,
    /// Raw ADC counts
    #[serde(rename = "Raw ADC Val")]
    RawAdc,
    /// DHT11 temperature in degrees Celsius
    #[serde(rename = "DHT11 Temperature")]
    Temperature,
    /// DHT11 relative humidity in percent
    #[serde(rename = "DHT11 Humidity")]
    Humidity,
}

impl TransformKind {
    /// Display limit used when the user does not supply one.
    ///
    /// `VoltageToResistance` has none: its limit doubles as the baseline
    /// resistance and must be entered explicitly.
    #[must_use]
    pub fn preset_display_limit(self) -> Option<f64> {
        match self {
            Self::Voltage => Some(4.0),
            Self::RawAdc => Some(5000.0),
            Self::Temperature => Some(40.0),
            Self::Humidity => Some(100.0),
            Self::Identity | Self::VoltageToResistance => None,
        }
    }
}

/// One configured sensor channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    name: String,
    display_limit: f64,
    transform: TransformKind,
}

impl Channel {
    /// Creates a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidDisplayLimit`] unless `display_limit` is
    /// positive and finite.
    pub fn new(
        name: impl Into<String>,
        display_limit: f64,
        transform: TransformKind,
    ) -> Result<Self, ChannelError> {
        if !(display_limit.is_finite() && display_limit > 0.0) {
            return Err(ChannelError::InvalidDisplayLimit(display_limit));
        }
        Ok(Self {
            name: name.into(),
            display_limit,
            transform,
        })
    }

    /// Creates a channel with the transform's preset display limit.
    ///
    /// Returns `None` for kinds without a preset.
    #[must_use]
    pub fn with_preset(name: impl Into<String>, transform: TransformKind) -> Option<Self> {
        let limit = transform.preset_display_limit()?;
        Self::new(name, limit, transform).ok()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upper bound for axis scaling; baseline resistance for `VoltageToResistance`.
    #[must_use]
    pub fn display_limit(&self) -> f64 {
        self.display_limit
    }

    #[must_use]
    pub fn transform(&self) -> TransformKind {
        self.transform
    }
}

/// Ordered set of configured channels; index `i` reads record field `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    /// Maximum number of channels, one per reading in a record
    pub const CAPACITY: usize = READINGS_PER_RECORD;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a channel and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::RegistryFull`] once every reading slot is mapped.
    pub fn add_channel(&mut self, channel: Channel) -> Result<usize, ChannelError> {
        if self.channels.len() >= Self::CAPACITY {
            return Err(ChannelError::RegistryFull(self.channels.len()));
        }
        self.channels.push(channel);
        Ok(self.channels.len() - 1)
    }

    /// Channels in record-field order
    #[must_use]
    pub fn list_channels(&self) -> &[Channel] {
        &self.channels
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Removes every channel.
    pub fn reset(&mut self) {
        self.channels.clear();
    }
}
