use chrono::{
    DurationRound, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone as _,
    Timelike,
};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{HealthError, Result};

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Uses the `iana-time-zone` crate directly, with no subprocess calls.
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| {
        warn!("could not detect system timezone, using UTC");
        "UTC".to_string()
    })
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Outcome of interpreting a naive device timestamp in a named timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Localized {
    /// The wall-clock time maps to exactly one instant, given here in UTC.
    Utc(NaiveDateTime),
    /// The wall-clock time occurs twice (DST falls back).
    Ambiguous,
    /// The wall-clock time is skipped (DST springs forward).
    Nonexistent,
}

impl Localized {
    /// The UTC instant, or `None` for invalid local times.
    pub fn utc(self) -> Option<NaiveDateTime> {
        match self {
            Localized::Utc(ts) => Some(ts),
            Localized::Ambiguous | Localized::Nonexistent => None,
        }
    }
}

/// Localises naive device timestamps to a fixed IANA timezone.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneHandler {
    tz: Tz,
}

impl TimezoneHandler {
    /// Create a handler for `tz_name`.
    ///
    /// Unknown names are rejected.
    pub fn new(tz_name: &str) -> Result<Self> {
        let tz = tz_name
            .parse::<Tz>()
            .map_err(|_| HealthError::UnknownTimezone(tz_name.to_string()))?;
        Ok(Self { tz })
    }

    /// Interpret `local` as wall-clock time in this handler's zone and return
    /// the matching UTC instant without an offset attached.
    pub fn localize_to_utc(&self, local: NaiveDateTime) -> Localized {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => Localized::Utc(dt.naive_utc()),
            LocalResult::Ambiguous(_, _) => Localized::Ambiguous,
            LocalResult::None => Localized::Nonexistent,
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m-%d-%Y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &[
    "%H:%M:%S%.f",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
];

/// Parse a timestamp in any of the export formats we have seen.
///
/// Returns `None` for empty or unrecognised strings.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Parse a calendar date, discarding any time-of-day component.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

/// Parse a time-of-day. Full timestamps are accepted and reduced to their
/// time component.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_timestamp(s).map(|ts| ts.time()))
}

// ── Arithmetic ────────────────────────────────────────────────────────────────

/// Drop sub-millisecond precision.
pub fn truncate_to_millis(ts: NaiveDateTime) -> NaiveDateTime {
    ts.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(ts)
}

/// Hours elapsed since midnight, as a fraction.
pub fn hours_since_midnight(t: NaiveTime) -> f64 {
    f64::from(t.num_seconds_from_midnight()) / 3600.0 + f64::from(t.nanosecond()) / 3.6e12
}

/// Convert a (possibly fractional) hour count into a [`TimeDelta`] with
/// millisecond resolution.
///
/// `None` for non-finite counts and for counts outside the `TimeDelta` range.
pub fn hours_to_delta(hours: f64) -> Option<TimeDelta> {
    let millis = (hours * 3_600_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}

/// Length of `delta` in fractional hours.
pub fn delta_hours(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 3_600_000.0
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    // ── TimezoneHandler ──────────────────────────────────────────────────────

    #[test]
    fn test_new_rejects_unknown_timezone() {
        let err = TimezoneHandler::new("Invalid/Timezone").unwrap_err();
        assert!(matches!(err, HealthError::UnknownTimezone(_)));
    }

    #[test]
    fn test_localize_summer_new_york() {
        let handler = TimezoneHandler::new("America/New_York").unwrap();
        // EDT is UTC-4.
        let local = dt(2024, 6, 1, 8, 0);
        assert_eq!(
            handler.localize_to_utc(local),
            Localized::Utc(dt(2024, 6, 1, 12, 0))
        );
    }

    #[test]
    fn test_localize_crosses_date_boundary() {
        let handler = TimezoneHandler::new("America/Los_Angeles").unwrap();
        // PST is UTC-8: 20:00 local is 04:00 the next day in UTC.
        let local = dt(2024, 1, 15, 20, 0);
        assert_eq!(handler.localize_to_utc(local).utc(), Some(dt(2024, 1, 16, 4, 0)));
    }

    #[test]
    fn test_localize_ambiguous_fall_back() {
        let handler = TimezoneHandler::new("America/New_York").unwrap();
        // 2023-11-05 01:30 happens twice in New York.
        let local = dt(2023, 11, 5, 1, 30);
        assert_eq!(handler.localize_to_utc(local), Localized::Ambiguous);
        assert!(handler.localize_to_utc(local).utc().is_none());
    }

    #[test]
    fn test_localize_nonexistent_spring_forward() {
        let handler = TimezoneHandler::new("America/New_York").unwrap();
        // 2024-03-10 02:30 is skipped in New York.
        let local = dt(2024, 3, 10, 2, 30);
        assert_eq!(handler.localize_to_utc(local), Localized::Nonexistent);
    }

    // ── Parsing ──────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_librelink_timestamp() {
        assert_eq!(parse_timestamp("02-15-2021 08:03 PM"), Some(dt(2021, 2, 15, 20, 3)));
    }

    #[test]
    fn test_parse_iso_timestamp_with_fraction() {
        let ts = parse_timestamp("2021-02-15 23:41:55.123456").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2021, 2, 15).unwrap());
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_timestamp_garbage_returns_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not-a-date").is_none());
    }

    #[test]
    fn test_parse_date_strips_time() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15"), Some(expected));
        assert_eq!(parse_date("01/15/2024"), Some(expected));
        assert_eq!(parse_date("2024-01-15 00:00:00"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_parse_time_of_day_formats() {
        let ten_pm = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        assert_eq!(parse_time_of_day("22:00"), Some(ten_pm));
        assert_eq!(parse_time_of_day("22:00:00"), Some(ten_pm));
        assert_eq!(parse_time_of_day("10:00 PM"), Some(ten_pm));
        assert_eq!(parse_time_of_day("2024-01-01 22:00:00"), Some(ten_pm));
        assert_eq!(parse_time_of_day("late"), None);
    }

    // ── Arithmetic ───────────────────────────────────────────────────────────

    #[test]
    fn test_truncate_to_millis() {
        let ts = parse_timestamp("2021-02-15 23:41:55.123456789").unwrap();
        assert_eq!(truncate_to_millis(ts).nanosecond(), 123_000_000);
    }

    #[test]
    fn test_hours_since_midnight() {
        assert_eq!(hours_since_midnight(NaiveTime::from_hms_opt(6, 30, 0).unwrap()), 6.5);
        assert_eq!(hours_since_midnight(NaiveTime::MIN), 0.0);
    }

    #[test]
    fn test_hours_delta_round_trip() {
        assert_eq!(hours_to_delta(8.0).map(delta_hours), Some(8.0));
        assert_eq!(hours_to_delta(1.5), Some(TimeDelta::minutes(90)));
    }

    #[test]
    fn test_hours_to_delta_out_of_range() {
        assert_eq!(hours_to_delta(f64::INFINITY), None);
        assert_eq!(hours_to_delta(f64::NEG_INFINITY), None);
        assert_eq!(hours_to_delta(f64::NAN), None);
        assert_eq!(hours_to_delta(-1e300), None);
        assert_eq!(hours_to_delta(1e300), None);
        assert!(hours_to_delta(1e12).is_some());
    }
}
