//! Analysis pipelines.
//!
//! Two variants build the per-date feature table:
//!
//! * **glucose** – glucose statistics for the sleep window, the day and the
//!   previous day, joined with the nightly sleep metrics.
//! * **metrics** – sleep metrics, the daily metabolic score and the fasting
//!   statistics, restricted to dates present in all three.
//!
//! Either table is then reduced to a correlation matrix.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use metabolic_core::error::{HealthError, Result};
use metabolic_core::matrix::{CorrelationEdge, CorrelationMatrix};
use metabolic_core::models::{FastLogEntry, GlucoseReading, MetabolicScores, SleepTable};
use metabolic_core::table::FeatureTable;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::correlation::corr_matrix;
use crate::fasting::{all_fasts_stats, FastingConfig};
use crate::glucose::{day_groups, grouped_glucose_stats, previous_day_groups, sleep_groups};
use crate::joiner::{metabolic_score_table, sleep_metrics};

/// Decimal places kept in pipeline outputs.
pub const OUTPUT_DECIMALS: u32 = 2;

// ── Public types ──────────────────────────────────────────────────────────────

/// Which feature table to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Metrics,
    Glucose,
}

impl FromStr for Pipeline {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "metrics" => Ok(Pipeline::Metrics),
            "glucose" => Ok(Pipeline::Glucose),
            other => Err(HealthError::Config(format!("unknown pipeline: {other}"))),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pipeline::Metrics => "metrics",
            Pipeline::Glucose => "glucose",
        })
    }
}

/// Metadata produced alongside the analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp when this result was generated.
    pub generated_at: String,
    pub pipeline: Pipeline,
    /// Rows in the feature table.
    pub dates: usize,
    /// Columns in the feature table, excluding `Date`.
    pub columns: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Wall-clock seconds spent building the table and matrix.
    pub compute_time_seconds: f64,
}

/// The complete output of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub table: FeatureTable,
    pub correlation: CorrelationMatrix,
    pub correlation_long: Vec<CorrelationEdge>,
    pub metadata: AnalysisMetadata,
}

// ── Feature tables ────────────────────────────────────────────────────────────

/// Glucose statistics joined with nightly sleep metrics.
///
/// The sleep-window, day and previous-day statistics are outer-joined, then
/// inner-joined with the sleep metrics. Values are rounded to two decimals.
pub fn create_analysis_dataset(
    sleep: &SleepTable,
    glucose: &[GlucoseReading],
) -> Result<FeatureTable> {
    let days = day_groups(glucose);
    let previous_days = previous_day_groups(&days);
    let nights = sleep_groups(glucose, sleep);

    let sleep_stats = grouped_glucose_stats(&nights, Some("Sleep"))?;
    let day_stats = grouped_glucose_stats(&days, Some("Day"))?;
    let previous_day_stats = grouped_glucose_stats(&previous_days, Some("Previous Day"))?;

    let all_glucose = sleep_stats
        .outer_join(&day_stats)?
        .outer_join(&previous_day_stats)?;

    Ok(all_glucose
        .inner_join(&sleep_metrics(sleep)?)?
        .round(OUTPUT_DECIMALS))
}

/// Sleep metrics, metabolic scores and fasting statistics for the dates all
/// three cover. Values are rounded to two decimals.
pub fn create_metrics_dataset(
    sleep_scores: &FeatureTable,
    metabolic_scores: &FeatureTable,
    fasting_scores: &FeatureTable,
) -> Result<FeatureTable> {
    Ok(sleep_scores
        .inner_join(metabolic_scores)?
        .inner_join(fasting_scores)?
        .round(OUTPUT_DECIMALS))
}

// ── Pipelines ─────────────────────────────────────────────────────────────────

/// Run the glucose pipeline end to end.
pub fn run_glucose_pipeline(
    sleep: &SleepTable,
    glucose: &[GlucoseReading],
) -> Result<AnalysisResult> {
    let start = std::time::Instant::now();
    let table = create_analysis_dataset(sleep, glucose)?;
    finish(Pipeline::Glucose, table, start)
}

/// Run the metrics pipeline end to end.
pub fn run_metrics_pipeline(
    sleep: &SleepTable,
    scores: &MetabolicScores,
    fasts: &[FastLogEntry],
    config: &FastingConfig,
) -> Result<AnalysisResult> {
    let start = std::time::Instant::now();
    let table = create_metrics_dataset(
        &sleep_metrics(sleep)?,
        &metabolic_score_table(scores)?,
        &all_fasts_stats(fasts, config)?,
    )?;
    finish(Pipeline::Metrics, table, start)
}

fn finish(
    pipeline: Pipeline,
    table: FeatureTable,
    start: std::time::Instant,
) -> Result<AnalysisResult> {
    let correlation = corr_matrix(&table)?.round(OUTPUT_DECIMALS);
    let correlation_long = correlation.to_long();

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        pipeline,
        dates: table.len(),
        columns: table.column_names().count(),
        first_date: table.dates().first().copied(),
        last_date: table.dates().last().copied(),
        compute_time_seconds: start.elapsed().as_secs_f64(),
    };

    info!(
        "{} pipeline: {} dates, {} columns, {} correlated",
        pipeline,
        metadata.dates,
        metadata.columns,
        correlation.size()
    );

    Ok(AnalysisResult {
        table,
        correlation,
        correlation_long,
        metadata,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
