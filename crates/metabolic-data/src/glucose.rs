//! Glucose grouping engine.
//!
//! Buckets a [`GlucoseSeries`] by calendar day, by the previous day, or by
//! arbitrary labelled time windows (the sleep window being the main one) and
//! reduces every bucket to the four glucose statistics.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use metabolic_core::error::Result;
use metabolic_core::models::{DayGroups, GlucoseReading, GlucoseSeries, SleepTable};
use metabolic_core::stats;
use metabolic_core::table::FeatureTable;
use serde::Serialize;
use tracing::debug;

// ── Grouping ──────────────────────────────────────────────────────────────────

/// Partition readings by the calendar date of their timestamp.
///
/// Every reading lands in exactly one group and keeps its relative order.
pub fn day_groups(glucose: &[GlucoseReading]) -> DayGroups {
    let mut groups = DayGroups::new();
    for reading in glucose {
        groups
            .entry(reading.timestamp.date())
            .or_default()
            .push(*reading);
    }
    groups
}

/// Re-key day groups so each date holds the readings of the day before.
pub fn previous_day_groups(groups: &DayGroups) -> DayGroups {
    groups
        .iter()
        .filter_map(|(date, readings)| {
            date.checked_add_signed(TimeDelta::days(1))
                .map(|next| (next, readings.clone()))
        })
        .collect()
}

/// A labelled, inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period<K> {
    pub key: K,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Collect the readings inside each `[start, end]` window.
///
/// Windows that contain no reading are left out of the result. When two
/// windows share a key their readings are concatenated.
pub fn period_groups<K: Ord + Clone>(
    glucose: &[GlucoseReading],
    periods: &[Period<K>],
) -> BTreeMap<K, GlucoseSeries> {
    let mut groups: BTreeMap<K, GlucoseSeries> = BTreeMap::new();
    for period in periods {
        let inside: GlucoseSeries = glucose
            .iter()
            .filter(|r| period.start <= r.timestamp && r.timestamp <= period.end)
            .copied()
            .collect();
        if inside.is_empty() {
            continue;
        }
        groups.entry(period.key.clone()).or_default().extend(inside);
    }
    groups
}

/// Readings that fall inside each night's sleep window, keyed by sleep date.
///
/// Only dates that also appear as a glucose calendar date are considered.
/// Dates without both sleep timestamps, or with no reading in the window,
/// are omitted.
pub fn sleep_groups(
    glucose: &[GlucoseReading],
    sleep: &SleepTable,
) -> BTreeMap<NaiveDate, GlucoseSeries> {
    let days = day_groups(glucose);
    let periods: Vec<Period<NaiveDate>> = sleep
        .values()
        .filter(|record| days.contains_key(&record.date))
        .filter_map(|record| {
            record.sleep_window().map(|(start, end)| Period {
                key: record.date,
                start,
                end,
            })
        })
        .collect();

    let groups = period_groups(glucose, &periods);
    debug!(
        "Sleep groups: {} candidate nights, {} with readings",
        periods.len(),
        groups.len()
    );
    groups
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Summary of one bucket of glucose readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlucoseStats {
    pub mean: f64,
    /// Sample standard deviation; `NaN` for a single reading.
    pub volatility: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl GlucoseStats {
    /// Column names for these statistics, with an optional ` (<label>)` suffix.
    pub fn column_names(label: Option<&str>) -> [String; 4] {
        ["Glucose Mean", "Glucose Volatility", "Glucose Minimum", "Glucose Maximum"].map(|name| {
            match label {
                Some(label) => format!("{name} ({label})"),
                None => name.to_string(),
            }
        })
    }

    fn values(&self) -> [f64; 4] {
        [self.mean, self.volatility, self.minimum, self.maximum]
    }
}

/// Mean, volatility, minimum and maximum of `readings`.
pub fn glucose_stats(readings: &[GlucoseReading]) -> GlucoseStats {
    let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
    GlucoseStats {
        mean: stats::mean(&values),
        volatility: stats::sample_std(&values),
        minimum: stats::min(&values),
        maximum: stats::max(&values),
    }
}

/// One row of [`GlucoseStats`] per group, keyed by group date.
pub fn grouped_glucose_stats(
    groups: &BTreeMap<NaiveDate, GlucoseSeries>,
    label: Option<&str>,
) -> Result<FeatureTable> {
    let mut table = FeatureTable::from_dates(groups.keys().copied());
    let per_group: Vec<[f64; 4]> = groups
        .values()
        .map(|readings| glucose_stats(readings).values())
        .collect();

    for (i, name) in GlucoseStats::column_names(label).into_iter().enumerate() {
        table.push_numeric(name, per_group.iter().map(|v| v[i]).collect())?;
    }
    Ok(table)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
