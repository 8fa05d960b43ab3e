//! Enforcer settings and channel configuration sources.

mod source;

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;

use crate::command::CommandSettings;
use crate::schedule::DEFAULT_TAIL_SEARCH_DAYS;
use crate::{Error, Result};

pub use source::{ChannelEntry, ConfigSnapshot, ConfigSource, JsonFileSource, StaticSource};

pub const DEFAULT_CHANNELS_FILE: &str = "channels.json";
pub const DEFAULT_MEDIA_ROOT: &str = "media";
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60;
/// Three hours of history a delayed playlist may reach back into.
pub const DEFAULT_PLAYBACK_WINDOW_SECS: u64 = 3 * 60 * 60;
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 3;
pub const DEFAULT_SCRATCH_DIR: &str = "playlists";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Largest accepted tail search horizon (one year of start days).
pub const MAX_TAIL_SEARCH_DAYS: u32 = 366;

/// Settings of the enforcer process itself, resolved once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcerConfig {
    /// JSON channel document read by [`JsonFileSource`].
    pub channels_file: PathBuf,
    /// Root for recordings, playlists and child-process logs.
    pub media_root: PathBuf,
    pub ffmpeg_path: String,
    pub poll_interval: Duration,
    pub prune_interval: Duration,
    /// Lookback window of time-shift playlists; also widens the prune guard.
    pub playback_window: Duration,
    /// Grace period when stopping a job that is no longer desired.
    pub stop_grace: Duration,
    /// Grace period per job when the enforcer shuts down.
    pub shutdown_grace: Duration,
    /// Start days searched backward for the last schedule end.
    pub tail_search_days: u32,
    /// Restart record jobs whose command changed, like playback jobs.
    pub record_drift_restart: bool,
    /// Playlist scratch directory, relative to the media root.
    pub scratch_dir: PathBuf,
    /// Directory for the enforcer's own rolling logs.
    pub log_dir: PathBuf,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            channels_file: PathBuf::from(DEFAULT_CHANNELS_FILE),
            media_root: PathBuf::from(DEFAULT_MEDIA_ROOT),
            ffmpeg_path: DEFAULT_FFMPEG_PATH.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            prune_interval: Duration::from_secs(DEFAULT_PRUNE_INTERVAL_SECS),
            playback_window: Duration::from_secs(DEFAULT_PLAYBACK_WINDOW_SECS),
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            tail_search_days: DEFAULT_TAIL_SEARCH_DAYS,
            record_drift_restart: false,
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl EnforcerConfig {
    pub fn with_media_root(mut self, media_root: impl Into<PathBuf>) -> Self {
        self.media_root = media_root.into();
        self
    }

    pub fn with_ffmpeg_path(mut self, ffmpeg_path: impl Into<String>) -> Self {
        self.ffmpeg_path = ffmpeg_path.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    pub fn with_playback_window(mut self, window: Duration) -> Self {
        self.playback_window = window;
        self
    }

    pub fn with_record_drift_restart(mut self, enabled: bool) -> Self {
        self.record_drift_restart = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        if self.prune_interval.is_zero() {
            return Err(Error::config("prune interval must be greater than zero"));
        }
        if self.playback_window.is_zero() {
            return Err(Error::config("playback window must be greater than zero"));
        }
        if !(1..=MAX_TAIL_SEARCH_DAYS).contains(&self.tail_search_days) {
            return Err(Error::config(format!(
                "tail search horizon must be within 1..={MAX_TAIL_SEARCH_DAYS} days, got {}",
                self.tail_search_days
            )));
        }
        if self.ffmpeg_path.trim().is_empty() {
            return Err(Error::config("ffmpeg path is empty"));
        }
        Ok(())
    }

    pub fn playback_window_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.playback_window).unwrap_or(TimeDelta::MAX)
    }

    /// Settings handed to the command builder.
    pub fn command_settings(&self) -> CommandSettings {
        CommandSettings {
            ffmpeg_path: self.ffmpeg_path.clone(),
            media_root: self.media_root.clone(),
            scratch_dir: self.scratch_dir.clone(),
            playback_window: self.playback_window_delta(),
        }
    }
}
