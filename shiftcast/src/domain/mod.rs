//! Domain types consumed by the enforcer.

pub mod channel;
pub mod job;
pub mod schedule;
pub mod timeshift;

pub use channel::{
    AudioMode, ChannelConfig, ChannelId, CodecSettings, InputSpec, OutputSpec, RecordingSettings,
    RetentionSettings, VideoMode,
};
pub use job::{JobKey, JobPurpose, JobState};
pub use schedule::WeeklySchedule;
pub use timeshift::{PlaybackMode, TimeShiftProfile};
