//! Desired job set for one tick.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::config::{ChannelEntry, ConfigSnapshot};
use crate::domain::{JobKey, JobPurpose};
use crate::schedule::{is_active, is_playback_active};

/// Whether `purpose` should run for a channel at `now`.
///
/// Record follows the schedule strictly. Playback needs a network output and
/// follows the schedule plus, when enabled, the time-shift drain tail.
pub fn is_desired(
    entry: &ChannelEntry,
    purpose: JobPurpose,
    now: NaiveDateTime,
    tail_search_days: u32,
) -> bool {
    let channel = &entry.channel;
    if !channel.enabled {
        return false;
    }

    match purpose {
        JobPurpose::Record => channel.recording.enabled && is_active(channel, now),
        JobPurpose::Playback => {
            channel.output.supports_playback()
                && is_playback_active(channel, entry.profile(), now, tail_search_days)
        }
    }
}

/// Every job that should be running at `now`, in key order.
pub fn desired_jobs(
    snapshot: &ConfigSnapshot,
    now: NaiveDateTime,
    tail_search_days: u32,
) -> BTreeMap<JobKey, &ChannelEntry> {
    let mut desired = BTreeMap::new();
    for entry in snapshot.enabled() {
        for purpose in JobPurpose::ALL {
            if is_desired(entry, purpose, now, tail_search_days) {
                desired.insert(JobKey::new(purpose, entry.channel.id), entry);
            }
        }
    }
    desired
}
