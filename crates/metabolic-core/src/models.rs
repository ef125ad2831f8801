use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single "Historic Glucose" sample from a continuous glucose monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    /// Sample time, converted to UTC and stored without an offset.
    pub timestamp: NaiveDateTime,
    /// Glucose concentration in mg/dL.
    #[serde(rename = "Glucose (mg/dL)")]
    pub value: f64,
}

impl GlucoseReading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Time-ordered glucose readings.
pub type GlucoseSeries = Vec<GlucoseReading>;

/// Glucose readings bucketed by calendar date.
pub type DayGroups = BTreeMap<NaiveDate, GlucoseSeries>;

/// One day of a Whoop sleep / recovery summary.
///
/// Numeric fields are `NaN` when the export left the cell empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    pub date: NaiveDate,
    pub strain: f64,
    pub recovery: f64,
    pub sleep_score: f64,
    pub resting_hr: f64,
    pub average_hr: f64,
    pub max_hr: f64,
    pub respiratory_rate: f64,
    pub hrv_ms: f64,
    pub sleep_hours: f64,
    /// Sleep onset, truncated to millisecond precision.
    pub sleep_start: Option<NaiveDateTime>,
    /// Wake time, truncated to millisecond precision.
    pub sleep_end: Option<NaiveDateTime>,
}

impl SleepRecord {
    /// Export column names paired with their value, in export order.
    ///
    /// The two timestamp columns are excluded.
    pub fn metrics(&self) -> [(&'static str, f64); 9] {
        [
            ("Strain", self.strain),
            ("Recovery", self.recovery),
            ("Sleep Score", self.sleep_score),
            ("RHR", self.resting_hr),
            ("Average HR", self.average_hr),
            ("Max HR", self.max_hr),
            ("Respiratory Rate", self.respiratory_rate),
            ("HRV (ms)", self.hrv_ms),
            ("Sleep (hr)", self.sleep_hours),
        ]
    }

    /// The `[sleep_start, sleep_end]` window, when both ends are known.
    pub fn sleep_window(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.sleep_start, self.sleep_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

/// Sleep records keyed (and ordered) by date.
pub type SleepTable = BTreeMap<NaiveDate, SleepRecord>;

/// One logged fast from a Zero export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastLogEntry {
    /// Date the fast started on.
    pub date: NaiveDate,
    /// Local time-of-day the fast started.
    pub start: NaiveTime,
    /// Local time-of-day the fast ended. The end *date* is derived from
    /// `hours`, never from this field.
    pub end: NaiveTime,
    /// Logged fast duration in hours.
    pub hours: f64,
    pub night_eating: bool,
}

impl FastLogEntry {
    /// Absolute start instant of the fast.
    pub fn start_datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }
}

/// Levels daily metabolic scores keyed by date.
pub type MetabolicScores = BTreeMap<NaiveDate, f64>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sleep() -> SleepRecord {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        SleepRecord {
            date,
            strain: 10.5,
            recovery: 64.0,
            sleep_score: 88.0,
            resting_hr: 52.0,
            average_hr: 61.0,
            max_hr: 150.0,
            respiratory_rate: 14.2,
            hrv_ms: 71.0,
            sleep_hours: 7.6,
            sleep_start: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(23, 10, 0),
            sleep_end: date.and_hms_opt(6, 50, 0),
        }
    }

    #[test]
    fn test_sleep_metrics_in_export_order() {
        let names: Vec<&str> = sample_sleep().metrics().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "Strain",
                "Recovery",
                "Sleep Score",
                "RHR",
                "Average HR",
                "Max HR",
                "Respiratory Rate",
                "HRV (ms)",
                "Sleep (hr)"
            ]
        );
    }

    #[test]
    fn test_sleep_window_requires_both_ends() {
        let mut record = sample_sleep();
        assert!(record.sleep_window().is_some());
        record.sleep_end = None;
        assert!(record.sleep_window().is_none());
    }

    #[test]
    fn test_fast_start_datetime() {
        let fast = FastLogEntry {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            hours: 8.0,
            night_eating: false,
        };
        assert_eq!(
            fast.start_datetime(),
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(22, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_glucose_reading_serialises_canonical_label() {
        let reading = GlucoseReading::new(sample_sleep().date.and_hms_opt(3, 0, 0).unwrap(), 92.0);
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["Glucose (mg/dL)"], 92.0);
        assert!(json.get("value").is_none());
    }
}
