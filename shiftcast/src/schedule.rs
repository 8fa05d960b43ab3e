//! Schedule evaluation.
//!
//! Decides whether a channel is active at a given local instant, and whether
//! its playback should still run after the schedule ended so that a
//! time-shift buffer can drain.

use chrono::{Days, NaiveDateTime, TimeDelta};

use crate::domain::{ChannelConfig, TimeShiftProfile, WeeklySchedule};

/// Default number of days searched backward for the most recent schedule end.
pub const DEFAULT_TAIL_SEARCH_DAYS: u32 = 8;

/// Whether the channel's schedule is active at `now`.
///
/// Disabled channels are never active.
pub fn is_active(channel: &ChannelConfig, now: NaiveDateTime) -> bool {
    channel.enabled && channel.schedule.contains(now)
}

/// Whether the playback purpose should run at `now`.
///
/// True while the schedule is active. With tail extension enabled and a
/// positive delay, playback also continues until `last_end + delay`, where
/// `last_end` is the most recent schedule end at or before `now`.
///
/// A full-day schedule has no discrete end, so tail extension never applies
/// to it.
pub fn is_playback_active(
    channel: &ChannelConfig,
    profile: Option<&TimeShiftProfile>,
    now: NaiveDateTime,
    search_days: u32,
) -> bool {
    if is_active(channel, now) {
        return true;
    }
    if !channel.enabled || !channel.playback_tail {
        return false;
    }

    let delay = TimeShiftProfile::effective_delay(profile);
    if delay <= TimeDelta::zero() {
        return false;
    }

    match last_schedule_end(&channel.schedule, now, search_days) {
        Some(end) => now <= end + delay,
        None => false,
    }
}

/// Most recent window end `<= now`, searching back `search_days` start days.
///
/// The date-range and weekday filters apply to the day a window starts on;
/// an overnight window that starts on day `D` ends on `D + 1`.
pub fn last_schedule_end(
    schedule: &WeeklySchedule,
    now: NaiveDateTime,
    search_days: u32,
) -> Option<NaiveDateTime> {
    if schedule.is_full_day() {
        return None;
    }

    let (_, end_time) = schedule.window();
    let end_offset = if schedule.is_overnight() { 1 } else { 0 };

    for back in 0..search_days {
        let Some(start_day) = now.date().checked_sub_days(Days::new(u64::from(back))) else {
            break;
        };
        if !schedule.runs_on(start_day) {
            continue;
        }
        let Some(end_day) = start_day.checked_add_days(Days::new(end_offset)) else {
            continue;
        };

        let end = end_day.and_time(end_time);
        if end <= now {
            return Some(end);
        }
    }

    None
}
