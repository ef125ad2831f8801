//! Fasting interval engine.
//!
//! Reconstructs the absolute start and end of every logged fast, splits each
//! fast's duration across the midnight it crosses, accumulates per-day
//! cumulative and consecutive fasted hours and bins the result.
//!
//! A fast's end *date* comes from its logged duration; its end *time* comes
//! from the logged end time-of-day. The two are cross-checked against
//! [`FastingConfig::duration_tolerance_hours`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use metabolic_core::error::{HealthError, Result};
use metabolic_core::formatting::format_hours;
use metabolic_core::models::FastLogEntry;
use metabolic_core::table::FeatureTable;
use metabolic_core::time_utils::{delta_hours, hours_since_midnight, hours_to_delta};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CUMULATIVE_COLUMN: &str = "Fast (cumulative hours)";
pub const CONSECUTIVE_COLUMN: &str = "Fast (consecutive hours)";
pub const CONSECUTIVE_BIN_COLUMN: &str = "Fast Binned (consecutive hrs)";
pub const CUMULATIVE_BIN_COLUMN: &str = "Fast Binned (cumulative hrs)";
pub const FAST_COLUMN: &str = "Fast";

/// Hours above which a day counts as a fasting day.
const FAST_THRESHOLD_HOURS: f64 = 12.0;

// ── Configuration ─────────────────────────────────────────────────────────────

/// How strictly logged durations are checked against start/end times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastingConfig {
    /// Largest accepted gap, in hours, between `end - start` and the logged
    /// duration.
    pub duration_tolerance_hours: f64,
    /// Fail instead of warning when the gap is larger than the tolerance.
    pub reject_inconsistent: bool,
}

impl Default for FastingConfig {
    fn default() -> Self {
        Self {
            duration_tolerance_hours: 0.25,
            reject_inconsistent: false,
        }
    }
}

// ── Intervals ─────────────────────────────────────────────────────────────────

/// Absolute start and end of one fast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FastInterval {
    /// Date the fast was logged on.
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reported_hours: f64,
    /// `|(end - start) - reported_hours|`
    pub drift_hours: f64,
}

/// Compute the start and end instants of every fast.
///
/// Fails with [`HealthError::FastDurationOutOfRange`] when the logged hours
/// cannot be added to the start.
pub fn fasts_start_end(
    fasts: &[FastLogEntry],
    config: &FastingConfig,
) -> Result<Vec<FastInterval>> {
    fasts
        .iter()
        .map(|fast| {
            let start = fast.start_datetime();
            let end_date = hours_to_delta(fast.hours)
                .and_then(|delta| start.checked_add_signed(delta))
                .ok_or(HealthError::FastDurationOutOfRange {
                    date: fast.date,
                    hours: fast.hours,
                })?
                .date();
            let end = end_date.and_time(fast.end);
            let computed = delta_hours(end - start);
            let drift_hours = (computed - fast.hours).abs();

            if drift_hours > config.duration_tolerance_hours {
                if config.reject_inconsistent {
                    return Err(HealthError::InconsistentFast {
                        date: fast.date,
                        reported_hours: fast.hours,
                        computed_hours: computed,
                    });
                }
                warn!(
                    "Fast on {} logged as {} but runs {} from {} to {}",
                    fast.date,
                    format_hours(fast.hours),
                    format_hours(computed),
                    start,
                    end
                );
            }

            Ok(FastInterval {
                date: fast.date,
                start,
                end,
                reported_hours: fast.hours,
                drift_hours,
            })
        })
        .collect()
}

// ── Durations ─────────────────────────────────────────────────────────────────

/// How one fast's hours split between its start and end dates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FastDurations {
    /// Hours fasted on the start date.
    pub start_hours: f64,
    /// Hours fasted on the end date.
    pub end_hours: f64,
    pub total_hours: f64,
}

fn interval_durations(interval: &FastInterval) -> Result<FastDurations> {
    let total_hours = delta_hours(interval.end - interval.start);
    if total_hours < 0.0 {
        return Err(HealthError::InconsistentFast {
            date: interval.date,
            reported_hours: interval.reported_hours,
            computed_hours: total_hours,
        });
    }

    match (interval.end.date() - interval.start.date()).num_days() {
        0 => Ok(FastDurations {
            start_hours: total_hours,
            end_hours: 0.0,
            total_hours,
        }),
        1 => Ok(FastDurations {
            start_hours: 24.0 - hours_since_midnight(interval.start.time()),
            end_hours: hours_since_midnight(interval.end.time()),
            total_hours,
        }),
        _ => Err(HealthError::UnsupportedIntervalLength {
            date: interval.date,
            start: interval.start,
            end: interval.end,
        }),
    }
}

/// Split every fast's duration between its start and end dates.
pub fn date_durations(intervals: &[FastInterval]) -> Result<Vec<FastDurations>> {
    intervals.iter().map(interval_durations).collect()
}

/// A fast's interval together with its per-day split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FastDetail {
    #[serde(flatten)]
    pub interval: FastInterval,
    #[serde(flatten)]
    pub durations: FastDurations,
}

/// Intervals and durations for every fast, in log order.
pub fn fasts_details(
    fasts: &[FastLogEntry],
    config: &FastingConfig,
) -> Result<Vec<FastDetail>> {
    let intervals = fasts_start_end(fasts, config)?;
    let durations = date_durations(&intervals)?;
    Ok(intervals
        .into_iter()
        .zip(durations)
        .map(|(interval, durations)| FastDetail {
            interval,
            durations,
        })
        .collect())
}

// ── Per-day totals ────────────────────────────────────────────────────────────

/// Fasted hours attributed to one date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FastDayHours {
    /// Sum of every fast's share of the day.
    pub cumulative: f64,
    /// Longest unbroken fast up to the end of the day, including hours
    /// carried over from the previous day.
    pub consecutive: f64,
}

/// Cumulative and consecutive fasted hours for every date from the first
/// fast's start to the last fast's end. Dates without a fast are zero.
pub fn fast_cumulative_consecutive(details: &[FastDetail]) -> BTreeMap<NaiveDate, FastDayHours> {
    let mut days = BTreeMap::new();

    let first = details.iter().map(|d| d.interval.start.date()).min();
    let last = details.iter().map(|d| d.interval.end.date()).max();
    let (Some(first), Some(last)) = (first, last) else {
        return days;
    };
    for date in first.iter_days().take_while(|d| *d <= last) {
        days.insert(date, FastDayHours::default());
    }

    for detail in details {
        let d = &detail.durations;

        let start_day = days.entry(detail.interval.start.date()).or_default();
        start_day.cumulative += d.start_hours;
        start_day.consecutive = start_day.consecutive.max(d.start_hours);

        let end_day = days.entry(detail.interval.end.date()).or_default();
        end_day.cumulative += d.end_hours;
        end_day.consecutive = end_day.consecutive.max(d.total_hours);
    }

    days
}

// ── Binning ───────────────────────────────────────────────────────────────────

/// Fasted-hours bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FastBin {
    UpTo12,
    From13To15,
    From16To18,
    Over18,
}

impl FastBin {
    /// Bucket for `hours`: `(-1, 12]`, `(12, 15]`, `(15, 18]`, above 18.
    ///
    /// The top bucket is open-ended rather than capped at 24, so a fast
    /// running past a full day still lands in `18+ hrs`.
    /// `None` for `NaN` and values at or below -1.
    pub fn from_hours(hours: f64) -> Option<Self> {
        if hours.is_nan() || hours <= -1.0 {
            None
        } else if hours <= 12.0 {
            Some(FastBin::UpTo12)
        } else if hours <= 15.0 {
            Some(FastBin::From13To15)
        } else if hours <= 18.0 {
            Some(FastBin::From16To18)
        } else {
            Some(FastBin::Over18)
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FastBin::UpTo12 => "0-12 hrs",
            FastBin::From13To15 => "13-15 hrs",
            FastBin::From16To18 => "16-18 hrs",
            FastBin::Over18 => "18+ hrs",
        }
    }
}

impl fmt::Display for FastBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a day counts as a fasting day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FastFlag {
    No,
    Yes,
}

impl FastFlag {
    /// `No` for `(-1, 12]`, `Yes` above 12.
    pub fn from_hours(hours: f64) -> Option<Self> {
        if hours.is_nan() || hours <= -1.0 {
            None
        } else if hours <= FAST_THRESHOLD_HOURS {
            Some(FastFlag::No)
        } else {
            Some(FastFlag::Yes)
        }
    }
}

impl fmt::Display for FastFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FastFlag::No => "No",
            FastFlag::Yes => "Yes",
        })
    }
}

/// Bins for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FastDayBins {
    pub consecutive: Option<FastBin>,
    pub cumulative: Option<FastBin>,
    /// Based on cumulative hours.
    pub fast: Option<FastFlag>,
}

/// Bin every day's consecutive and cumulative hours.
pub fn fasts_binned(days: &BTreeMap<NaiveDate, FastDayHours>) -> BTreeMap<NaiveDate, FastDayBins> {
    days.iter()
        .map(|(date, hours)| {
            let bins = FastDayBins {
                consecutive: FastBin::from_hours(hours.consecutive),
                cumulative: FastBin::from_hours(hours.cumulative),
                fast: FastFlag::from_hours(hours.cumulative),
            };
            (*date, bins)
        })
        .collect()
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Per-date fasting table: hours, bins and the fasting-day flag.
pub fn all_fasts_stats(fasts: &[FastLogEntry], config: &FastingConfig) -> Result<FeatureTable> {
    let details = fasts_details(fasts, config)?;
    let days = fast_cumulative_consecutive(&details);
    let bins = fasts_binned(&days);

    debug!("Fasting: {} fasts over {} days", details.len(), days.len());

    fn text<T: fmt::Display>(value: Option<T>) -> Option<String> {
        value.map(|v| v.to_string())
    }

    let mut table = FeatureTable::from_dates(days.keys().copied());
    table.push_numeric(CUMULATIVE_COLUMN, days.values().map(|h| h.cumulative).collect())?;
    table.push_numeric(CONSECUTIVE_COLUMN, days.values().map(|h| h.consecutive).collect())?;
    table.push_categorical(
        CONSECUTIVE_BIN_COLUMN,
        bins.values().map(|b| text(b.consecutive)).collect(),
    )?;
    table.push_categorical(
        CUMULATIVE_BIN_COLUMN,
        bins.values().map(|b| text(b.cumulative)).collect(),
    )?;
    table.push_categorical(FAST_COLUMN, bins.values().map(|b| text(b.fast)).collect())?;
    Ok(table)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
