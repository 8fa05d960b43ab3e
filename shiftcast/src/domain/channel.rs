//! Channel configuration snapshot.
//!
//! These types are read-only views of records owned by the external
//! configuration store. The enforcer never mutates them.

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use super::schedule::WeeklySchedule;
use super::timeshift::TimeShiftProfile;
use crate::utils::filename::sanitize_filename;
use crate::{Error, Result};

/// Stable channel identifier assigned by the configuration store.
pub type ChannelId = i64;

/// Default recording path template, relative to the media root.
pub const DEFAULT_PATH_TEMPLATE: &str = "recordings/{channel}/{date}/";

/// Default recording segment length in minutes.
pub const DEFAULT_SEGMENT_MINUTES: u32 = 60;

fn default_true() -> bool {
    true
}

fn default_path_template() -> String {
    DEFAULT_PATH_TEMPLATE.to_string()
}

fn default_segment_minutes() -> u32 {
    DEFAULT_SEGMENT_MINUTES
}

/// Where a channel reads its media from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSpec {
    /// MPEG-TS over multicast UDP, e.g. `udp://@239.10.10.10:5001`.
    UdpMulticast {
        url: String,
        /// Optional receiving interface. Only IPv4 literals are applied.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interface: Option<String>,
    },
    Rtsp {
        url: String,
    },
    Rtmp {
        url: String,
    },
    /// Local file; relative paths are resolved under the media root.
    File {
        path: String,
    },
    /// Synthetic test pattern and tone, for self-test channels.
    #[serde(alias = "internal_gen")]
    InternalGenerator,
}

impl InputSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UdpMulticast { .. } => "udp_multicast",
            Self::Rtsp { .. } => "rtsp",
            Self::Rtmp { .. } => "rtmp",
            Self::File { .. } => "file",
            Self::InternalGenerator => "internal_generator",
        }
    }

    pub fn is_generator(&self) -> bool {
        matches!(self, Self::InternalGenerator)
    }
}

/// Where playback output is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputSpec {
    /// MPEG-TS over UDP (unicast or multicast).
    UdpTs { target: String },
    /// HLS playlist written to disk.
    Hls { target: String },
    /// FLV pushed to an RTMP ingest.
    Rtmp { target: String },
    /// MPEG-TS written to a file.
    File { target: String },
}

impl OutputSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UdpTs { .. } => "udp_ts",
            Self::Hls { .. } => "hls",
            Self::Rtmp { .. } => "rtmp",
            Self::File { .. } => "file",
        }
    }

    /// Trimmed target, `None` when blank.
    pub fn target(&self) -> Option<&str> {
        let raw = match self {
            Self::UdpTs { target }
            | Self::Hls { target }
            | Self::Rtmp { target }
            | Self::File { target } => target,
        };
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Whether a playback job can drive this output.
    ///
    /// Playback only pushes network streams; outputs that write to disk are
    /// rejected so that playback never mutates the media root.
    pub fn supports_playback(&self) -> bool {
        matches!(self, Self::UdpTs { .. } | Self::Rtmp { .. }) && self.target().is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    #[default]
    Copy,
    Encode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    #[default]
    Copy,
    Encode,
    Disable,
}

/// Codec directives shared by record and live playback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSettings {
    #[serde(default)]
    pub video: VideoMode,
    #[serde(default)]
    pub audio: AudioMode,
    /// Encoder used when video is re-encoded (default `libx264`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Encoder used when audio is re-encoded (default `aac`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory template with `{channel}`, `{date}` and `{time}` placeholders.
    #[serde(default = "default_path_template")]
    pub path_template: String,
    #[serde(default = "default_segment_minutes")]
    pub segment_minutes: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path_template: default_path_template(),
            segment_minutes: default_segment_minutes(),
        }
    }
}

impl RecordingSettings {
    pub fn segment_duration(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.segment_minutes))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Keep at most this many of the most recent segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_segments: Option<u32>,
    /// Delete segments older than this many days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
}

impl RetentionSettings {
    /// Retention does something only when enabled with at least one rule.
    pub fn is_active(&self) -> bool {
        self.enabled && (self.max_segments.is_some() || self.max_age_days.is_some())
    }
}

/// A configured channel: one input, one output, a weekly schedule and
/// recording/retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: ChannelId,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Marks channels created by the self-test tooling.
    #[serde(default)]
    pub test_channel: bool,
    pub input: InputSpec,
    pub output: OutputSpec,
    #[serde(default)]
    pub codec: CodecSettings,
    #[serde(default)]
    pub recording: RecordingSettings,
    #[serde(default)]
    pub retention: RetentionSettings,
    #[serde(default)]
    pub schedule: WeeklySchedule,
    /// Keep playback running past the schedule end until the time-shift
    /// buffer has drained.
    #[serde(default)]
    pub playback_tail: bool,
}

impl ChannelConfig {
    /// Channel name made safe for use in directory and file names.
    ///
    /// Segment files are named `<fs_name>_<YYYYMMDD>-<HHMMSS>.ts`.
    pub fn fs_name(&self) -> String {
        sanitize_filename(&self.name)
    }

    /// Human-readable label used in log lines.
    pub fn label(&self) -> String {
        format!("{} (id={})", self.name, self.id)
    }

    /// Check the invariants the enforcer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_config(format!(
                "channel {} has an empty name",
                self.id
            )));
        }
        if self.recording.segment_minutes == 0 {
            return Err(Error::invalid_config(format!(
                "channel {}: recording segment duration must be > 0",
                self.label()
            )));
        }
        Ok(())
    }

    /// The canonical self-test channel: internal generator into a UDP
    /// output, one-minute segments, keep-last-5 retention, active all day
    /// from `today` through the following two days.
    pub fn test_channel(id: ChannelId, output_url: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            id,
            name: "__TEST__ Internal Generator".to_string(),
            enabled: true,
            test_channel: true,
            input: InputSpec::InternalGenerator,
            output: OutputSpec::UdpTs {
                target: output_url.into(),
            },
            codec: CodecSettings::default(),
            recording: RecordingSettings {
                enabled: true,
                path_template: default_path_template(),
                segment_minutes: 1,
            },
            retention: RetentionSettings {
                enabled: true,
                max_segments: Some(5),
                max_age_days: None,
            },
            schedule: WeeklySchedule {
                date_from: Some(today),
                date_to: today.checked_add_days(chrono::Days::new(2)),
                ..WeeklySchedule::default()
            },
            playback_tail: false,
        }
    }

    /// Time-shift profile paired with [`ChannelConfig::test_channel`].
    pub fn test_channel_profile() -> TimeShiftProfile {
        TimeShiftProfile {
            enabled: true,
            delay_seconds: 60,
        }
    }
}
