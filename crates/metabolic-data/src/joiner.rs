//! Per-date tables for the sleep and metabolic score sources.

use chrono::NaiveDateTime;
use metabolic_core::error::Result;
use metabolic_core::models::{MetabolicScores, SleepRecord, SleepTable};
use metabolic_core::table::FeatureTable;

/// Column name of the metabolic score in joined tables.
pub const METABOLIC_SCORE_COLUMN: &str = "Metabolic Score";

/// Column names produced by [`sleep_metrics`], in order.
pub const SLEEP_METRIC_COLUMNS: [&str; 9] = [
    "Strain",
    "Recovery",
    "Sleep Score",
    "RHR",
    "Average HR",
    "Max HR",
    "Respiratory Rate",
    "HRV (ms)",
    "Sleep (hr)",
];

/// Sleep onset and wake columns, which never take part in correlation.
pub const SLEEP_TIMESTAMP_COLUMNS: [&str; 2] = ["Sleep Start", "Sleep End"];

/// The full sleep table: the metric columns followed by the onset and wake
/// timestamps as text.
pub fn sleep_table(sleep: &SleepTable) -> Result<FeatureTable> {
    let mut table = FeatureTable::from_dates(sleep.keys().copied());
    let rows: Vec<_> = sleep.values().map(SleepRecord::metrics).collect();
    for (i, name) in SLEEP_METRIC_COLUMNS.into_iter().enumerate() {
        table.push_numeric(name, rows.iter().map(|metrics| metrics[i].1).collect())?;
    }

    let stamp = |t: Option<NaiveDateTime>| t.map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
    let [start, end] = SLEEP_TIMESTAMP_COLUMNS;
    table.push_categorical(start, sleep.values().map(|r| stamp(r.sleep_start)).collect())?;
    table.push_categorical(end, sleep.values().map(|r| stamp(r.sleep_end)).collect())?;
    Ok(table)
}

/// The sleep table as numeric columns, without the sleep timestamps.
pub fn sleep_metrics(sleep: &SleepTable) -> Result<FeatureTable> {
    Ok(sleep_table(sleep)?.drop_columns(&SLEEP_TIMESTAMP_COLUMNS))
}

/// Metabolic scores as a one-column table.
pub fn metabolic_score_table(scores: &MetabolicScores) -> Result<FeatureTable> {
    let mut table = FeatureTable::from_dates(scores.keys().copied());
    table.push_numeric(METABOLIC_SCORE_COLUMN, scores.values().copied().collect())?;
    Ok(table)
}
