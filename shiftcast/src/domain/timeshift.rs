//! Time-shift (delayed playback) profile.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum supported playback delay (24 hours).
pub const MAX_DELAY_SECONDS: u32 = 24 * 60 * 60;

/// Playback mode derived from a channel's time-shift profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Restream the input directly, nothing is read from disk.
    Live,
    /// Replay recorded segments delayed by this amount.
    TimeShift(TimeDelta),
}

/// Delay configuration for a channel, one-to-one with the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeShiftProfile {
    #[serde(default)]
    pub enabled: bool,
    /// Delay in seconds, `0..=86400`. Zero means live restream.
    #[serde(default)]
    pub delay_seconds: u32,
}

impl TimeShiftProfile {
    pub fn validate(&self) -> Result<()> {
        if self.delay_seconds > MAX_DELAY_SECONDS {
            return Err(Error::invalid_config(format!(
                "delay_seconds must be <= {MAX_DELAY_SECONDS}, got {}",
                self.delay_seconds
            )));
        }
        Ok(())
    }

    /// Effective delay: zero unless the profile is enabled.
    pub fn effective_delay(profile: Option<&Self>) -> TimeDelta {
        match profile {
            Some(p) if p.enabled => TimeDelta::seconds(i64::from(p.delay_seconds)),
            _ => TimeDelta::zero(),
        }
    }

    /// Playback mode for an optional profile. A missing or disabled profile,
    /// or a zero delay, means live restream.
    pub fn mode(profile: Option<&Self>) -> PlaybackMode {
        let delay = Self::effective_delay(profile);
        if delay > TimeDelta::zero() {
            PlaybackMode::TimeShift(delay)
        } else {
            PlaybackMode::Live
        }
    }
}
