//! Job identity and lifecycle state.

use serde::{Deserialize, Serialize};

use super::channel::ChannelId;
use crate::Error;

/// The role of a subprocess for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPurpose {
    /// Capture the input into segment files.
    Record,
    /// Restream, live or time-shifted.
    Playback,
}

impl JobPurpose {
    pub const ALL: [JobPurpose; 2] = [JobPurpose::Record, JobPurpose::Playback];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Playback => "playback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "record" => Some(Self::Record),
            "playback" => Some(Self::Playback),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a job in the enforcer's job table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub purpose: JobPurpose,
    pub channel_id: ChannelId,
}

impl JobKey {
    pub fn new(purpose: JobPurpose, channel_id: ChannelId) -> Self {
        Self {
            purpose,
            channel_id,
        }
    }

    pub fn record(channel_id: ChannelId) -> Self {
        Self::new(JobPurpose::Record, channel_id)
    }

    pub fn playback(channel_id: ChannelId) -> Self {
        Self::new(JobPurpose::Playback, channel_id)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.purpose, self.channel_id)
    }
}

/// Lifecycle of a tracked job. A job that is not in the table is absent.
///
/// `Absent -> Starting -> Running -> Stopping -> Absent`; a restart caused
/// by drift goes through `Stopping` and back to `Starting` on a later tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Spawned, liveness not observed yet.
    Starting,
    /// Observed alive on at least one tick.
    Running,
    /// Termination requested.
    Stopping,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
        }
    }

    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Starting, Running) | (Starting, Stopping) | (Running, Running) | (Running, Stopping)
        )
    }

    pub fn transition_to(&self, target: JobState) -> Result<JobState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_parse() {
        assert_eq!(JobPurpose::parse("record"), Some(JobPurpose::Record));
        assert_eq!(JobPurpose::parse("PLAYBACK"), Some(JobPurpose::Playback));
        assert_eq!(JobPurpose::parse("live_forward"), None);
    }

    #[test]
    fn test_job_key_display() {
        assert_eq!(JobKey::playback(4).to_string(), "playback:4");
        assert_eq!(JobKey::record(12).to_string(), "record:12");
    }

    #[test]
    fn test_valid_transitions() {
        assert!(JobState::Starting.transition_to(JobState::Running).is_ok());
        assert!(JobState::Starting.transition_to(JobState::Stopping).is_ok());
        assert!(JobState::Running.transition_to(JobState::Stopping).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        let err = JobState::Stopping
            .transition_to(JobState::Running)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert!(!JobState::Running.can_transition_to(JobState::Starting));
        assert!(!JobState::Stopping.can_transition_to(JobState::Starting));
    }
}
