//! Weekly schedule types.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Weekly schedule with an optional daily window and date range.
///
/// Window semantics:
/// - `start == end` (including both unset): active the whole day.
/// - `start < end`: active in `[start, end)`.
/// - `start > end`: overnight, active from `start` until `end` the next morning.
///
/// Unset times are treated as `00:00`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    /// Enabled weekdays, Monday first.
    #[serde(default = "all_days")]
    pub days: [bool; 7],
    #[serde(default, with = "clock_time", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock_time", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    /// First active date (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    /// Last active date (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
}

fn all_days() -> [bool; 7] {
    [true; 7]
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self {
            days: all_days(),
            start_time: None,
            end_time: None,
            date_from: None,
            date_to: None,
        }
    }
}

impl WeeklySchedule {
    /// Daily window with unset bounds resolved to midnight.
    pub fn window(&self) -> (NaiveTime, NaiveTime) {
        (
            self.start_time.unwrap_or(NaiveTime::MIN),
            self.end_time.unwrap_or(NaiveTime::MIN),
        )
    }

    pub fn is_full_day(&self) -> bool {
        let (start, end) = self.window();
        start == end
    }

    pub fn is_overnight(&self) -> bool {
        let (start, end) = self.window();
        start > end
    }

    /// Whether `date` lies within `[date_from, date_to]`.
    pub fn date_in_range(&self, date: NaiveDate) -> bool {
        self.date_from.is_none_or(|from| date >= from) && self.date_to.is_none_or(|to| date <= to)
    }

    /// Whether the weekday of `date` is enabled.
    pub fn day_enabled(&self, date: NaiveDate) -> bool {
        self.days[date.weekday().num_days_from_monday() as usize]
    }

    /// Whether a window may start on `date`.
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        self.date_in_range(date) && self.day_enabled(date)
    }

    /// Date, weekday and time-of-day check for an instant.
    ///
    /// The date and weekday filters are applied to the calendar day of `now`,
    /// including the after-midnight part of an overnight window.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        if !self.runs_on(now.date()) {
            return false;
        }

        let (start, end) = self.window();
        let time = now.time();
        if start == end {
            true
        } else if start < end {
            start <= time && time < end
        } else {
            time >= start || time < end
        }
    }
}

/// Serde helpers for `"HH:MM"` / `"HH:MM:SS"` clock times.
mod clock_time {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) if t.second() == 0 => s.serialize_str(&t.format("%H:%M").to_string()),
            Some(t) => s.serialize_str(&t.format("%H:%M:%S").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => super::parse_clock_time(s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid time {s:?}, expected HH:MM"))),
        }
    }
}

/// Parse `"HH:MM"` or `"HH:MM:SS"`.
pub fn parse_clock_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("08:00"), Some(t(8, 0)));
        assert_eq!(
            parse_clock_time("23:59:30"),
            NaiveTime::from_hms_opt(23, 59, 30)
        );
        assert_eq!(parse_clock_time("25:00"), None);
        assert_eq!(parse_clock_time("noon"), None);
    }

    #[test]
    fn test_serde_round_trip_times() {
        let json = r#"{"start_time": "22:00", "end_time": "06:30:15", "date_from": "2025-01-01"}"#;
        let schedule: WeeklySchedule = serde_json::from_str(json).unwrap();

        assert_eq!(schedule.start_time, Some(t(22, 0)));
        assert_eq!(schedule.end_time, NaiveTime::from_hms_opt(6, 30, 15));
        assert_eq!(schedule.days, [true; 7]);
        assert!(schedule.is_overnight());

        let back = serde_json::to_value(&schedule).unwrap();
        assert_eq!(back["start_time"], "22:00");
        assert_eq!(back["end_time"], "06:30:15");
        assert!(back.get("date_to").is_none());
    }

    #[test]
    fn test_blank_time_is_unset() {
        let schedule: WeeklySchedule = serde_json::from_str(r#"{"start_time": ""}"#).unwrap();
        assert_eq!(schedule.start_time, None);
        assert!(schedule.is_full_day());
    }

    #[test]
    fn test_invalid_time_rejected() {
        let result: Result<WeeklySchedule, _> = serde_json::from_str(r#"{"end_time": "8pm"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let schedule = WeeklySchedule {
            date_from: NaiveDate::from_ymd_opt(2025, 3, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 3, 31),
            ..Default::default()
        };
        assert!(schedule.date_in_range(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
        assert!(schedule.date_in_range(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()));
        assert!(!schedule.date_in_range(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()));
        assert!(!schedule.date_in_range(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()));
    }

    #[test]
    fn test_day_flags_monday_first() {
        let mut schedule = WeeklySchedule::default();
        schedule.days = [false, false, false, false, false, false, true];

        // 2025-03-09 is a Sunday, 2025-03-10 a Monday.
        assert!(schedule.day_enabled(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()));
        assert!(!schedule.day_enabled(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()));
    }
}
