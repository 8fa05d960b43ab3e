//! Channel configuration snapshots.
//!
//! The configuration store is external; the enforcer only reads typed
//! snapshots of it through [`ConfigSource`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{ChannelConfig, ChannelId, TimeShiftProfile};
use crate::{Error, Result};

/// A channel and its optional time-shift profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    #[serde(flatten)]
    pub channel: ChannelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeshift: Option<TimeShiftProfile>,
}

impl ChannelEntry {
    pub fn new(channel: ChannelConfig, timeshift: Option<TimeShiftProfile>) -> Self {
        Self { channel, timeshift }
    }

    pub fn profile(&self) -> Option<&TimeShiftProfile> {
        self.timeshift.as_ref()
    }

    fn validate(&self) -> Result<()> {
        self.channel.validate()?;
        if let Some(profile) = &self.timeshift {
            profile
                .validate()
                .map_err(|e| Error::invalid_config(format!("{}: {e}", self.channel.label())))?;
        }
        Ok(())
    }
}

/// All channels as read at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

impl ConfigSnapshot {
    pub fn new(channels: Vec<ChannelEntry>) -> Self {
        Self { channels }
    }

    /// Drop channels that fail validation or collide with an earlier one.
    ///
    /// Names are compared after sanitising since they share recording
    /// directories on disk.
    pub fn validated(self) -> Self {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();

        let channels = self
            .channels
            .into_iter()
            .filter(|entry| {
                if let Err(e) = entry.validate() {
                    warn!(channel_id = entry.channel.id, error = %e, "Dropping invalid channel");
                    return false;
                }
                if !ids.insert(entry.channel.id) {
                    warn!(channel_id = entry.channel.id, "Dropping channel with duplicate id");
                    return false;
                }
                if !names.insert(entry.channel.fs_name()) {
                    warn!(
                        channel_id = entry.channel.id,
                        channel = %entry.channel.name,
                        "Dropping channel with duplicate name"
                    );
                    return false;
                }
                true
            })
            .collect();

        Self { channels }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ChannelEntry> {
        self.channels.iter().filter(|e| e.channel.enabled)
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelEntry> {
        self.channels.iter().find(|e| e.channel.id == id)
    }

    /// Look a channel up by numeric id or exact name.
    pub fn find(&self, selector: &str) -> Option<&ChannelEntry> {
        let selector = selector.trim();
        if let Ok(id) = selector.parse::<ChannelId>()
            && let Some(entry) = self.get(id)
        {
            return Some(entry);
        }
        self.channels.iter().find(|e| e.channel.name == selector)
    }
}

/// Read access to the external configuration store.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Current configuration. Failing here is fatal for the enforcer loop.
    async fn snapshot(&self) -> Result<ConfigSnapshot>;
}

/// Reads `{"channels": [...]}` from a JSON file on every snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(json: &str) -> Result<ConfigSnapshot> {
        let snapshot: ConfigSnapshot = serde_json::from_str(json)?;
        Ok(snapshot.validated())
    }
}

#[async_trait]
impl ConfigSource for JsonFileSource {
    async fn snapshot(&self) -> Result<ConfigSnapshot> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::io_path("reading channel config", &self.path, e))?;
        Self::parse(&json)
    }
}

/// In-memory source whose snapshot can be replaced at any time.
#[derive(Debug, Default)]
pub struct StaticSource {
    snapshot: Mutex<ConfigSnapshot>,
}

impl StaticSource {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn replace(&self, snapshot: ConfigSnapshot) {
        *self.snapshot.lock() = snapshot;
    }

    /// Edit the current snapshot in place.
    pub fn update(&self, f: impl FnOnce(&mut ConfigSnapshot)) {
        f(&mut self.snapshot.lock());
    }
}

#[async_trait]
impl ConfigSource for StaticSource {
    async fn snapshot(&self) -> Result<ConfigSnapshot> {
        let snapshot = self.snapshot.lock().clone();
        Ok(snapshot.validated())
    }
}
