//! # Channel Profiles
//!
//! Named channel layouts persisted as one JSON document:
//!
//! ```json
//! {
//!     "bench": [
//!         { "name": "Strain", "axis_limit": 100.0, "graph_type": "Resistance" },
//!         { "name": "Supply", "axis_limit": 4.0, "graph_type": "Voltage" }
//!     ]
//! }
//! ```
//!
//! Saving overwrites one entry and keeps every other profile in the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Channel, TransformKind};
use crate::error::{ChannelError, ProfileError};

/// Serialized form of one [`Channel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub axis_limit: f64,
    pub graph_type: TransformKind,
}

impl From<&Channel> for ChannelDescriptor {
    fn from(channel: &Channel) -> Self {
        Self {
            name: channel.name().to_string(),
            axis_limit: channel.display_limit(),
            graph_type: channel.transform(),
        }
    }
}

impl TryFrom<ChannelDescriptor> for Channel {
    type Error = ChannelError;

    fn try_from(descriptor: ChannelDescriptor) -> Result<Self, Self::Error> {
        Channel::new(descriptor.name, descriptor.axis_limit, descriptor.graph_type)
    }
}

type Profiles = BTreeMap<String, Vec<ChannelDescriptor>>;

/// JSON file holding every saved profile
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save `channels` under `name`, replacing any previous entry with that name.
    ///
    /// A missing or unreadable store is started afresh.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written.
    pub fn save(&self, name: &str, channels: &[Channel]) -> Result<(), ProfileError> {
        let mut profiles = match self.read() {
            Ok(profiles) => profiles,
            Err(ProfileError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("Creating new profile store at {}", self.path.display());
                Profiles::new()
            }
            Err(e) => {
                warn!("Replacing unreadable profile store {}: {}", self.path.display(), e);
                Profiles::new()
            }
        };

        profiles.insert(
            name.to_string(),
            channels.iter().map(ChannelDescriptor::from).collect(),
        );

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&profiles)?)?;
        debug!("Saved profile '{}' ({} channels)", name, channels.len());
        Ok(())
    }

    /// Load the channels saved under `name`, in their saved order.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No profile is saved under `name` (or the store does not exist)
    /// - The store is not valid JSON
    /// - A saved channel has an invalid display limit
    pub fn load(&self, name: &str) -> Result<Vec<Channel>, ProfileError> {
        let mut profiles = match self.read() {
            Ok(profiles) => profiles,
            Err(ProfileError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(ProfileError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e),
        };

        let descriptors = profiles
            .remove(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;

        descriptors
            .into_iter()
            .map(|d| Channel::try_from(d).map_err(ProfileError::from))
            .collect()
    }

    /// Names of all saved profiles, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if the store exists but cannot be read or parsed.
    pub fn names(&self) -> Result<Vec<String>, ProfileError> {
        match self.read() {
            Ok(profiles) => Ok(profiles.into_keys().collect()),
            Err(ProfileError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn read(&self) -> Result<Profiles, ProfileError> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
