//! Writing pipeline results to stdout or an output directory.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use metabolic_data::analysis::AnalysisResult;
use metabolic_data::core::formatting::format_cell;
use metabolic_data::core::matrix::CorrelationEdge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => anyhow::bail!("unknown output format: {other}"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        })
    }
}

// ── Stream output ─────────────────────────────────────────────────────────────

/// Write `result` to a single stream.
///
/// CSV output is the feature table, a blank line, then the correlation
/// matrix. JSON output is the whole result as one document.
pub fn write_stream<W: Write>(
    result: &AnalysisResult,
    format: OutputFormat,
    mut out: W,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Csv => {
            result.table.write_csv(&mut out)?;
            writeln!(out)?;
            result.correlation.write_csv(&mut out)?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, result)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

// ── Directory output ──────────────────────────────────────────────────────────

/// Write `result` as files under `dir`, prefixed with the pipeline name.
///
/// Returns the paths written, in order.
pub fn write_to_dir(
    result: &AnalysisResult,
    format: OutputFormat,
    dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let prefix = result.metadata.pipeline.to_string();
    let mut written = Vec::new();

    match format {
        OutputFormat::Csv => {
            let path = dir.join(format!("{prefix}_features.csv"));
            result.table.write_csv(create(&path)?)?;
            written.push(path);

            let path = dir.join(format!("{prefix}_correlation.csv"));
            result.correlation.write_csv(create(&path)?)?;
            written.push(path);

            let path = dir.join(format!("{prefix}_correlation_long.csv"));
            write_edges_csv(&result.correlation_long, create(&path)?)?;
            written.push(path);

            let path = dir.join(format!("{prefix}_metadata.json"));
            serde_json::to_writer_pretty(create(&path)?, &result.metadata)?;
            written.push(path);
        }
        OutputFormat::Json => {
            let path = dir.join(format!("{prefix}_analysis.json"));
            serde_json::to_writer_pretty(create(&path)?, result)?;
            written.push(path);
        }
    }

    for path in &written {
        tracing::info!("Wrote {}", path.display());
    }
    Ok(written)
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Long-form correlation as `x,y,correlation` rows; undefined values are empty.
fn write_edges_csv<W: Write>(edges: &[CorrelationEdge], writer: W) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["x", "y", "correlation"])?;
    for edge in edges {
        wtr.write_record([edge.x.as_str(), edge.y.as_str(), &format_cell(edge.correlation)])?;
    }
    wtr.flush()?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use metabolic_data::analysis::{AnalysisMetadata, Pipeline};
    use metabolic_data::core::table::FeatureTable;
    use metabolic_data::correlation::corr_matrix;
    use tempfile::TempDir;

    fn sample_result() -> AnalysisResult {
        let dates = (1..=3).map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
        let mut table = FeatureTable::from_dates(dates);
        table.push_numeric("Recovery", vec![50.0, 60.0, 70.0]).unwrap();
        table.push_numeric("Metabolic Score", vec![80.0, 75.0, f64::NAN]).unwrap();

        let correlation = corr_matrix(&table).unwrap();
        let correlation_long = correlation.to_long();
        AnalysisResult {
            metadata: AnalysisMetadata {
                generated_at: "2024-01-04T00:00:00+00:00".to_string(),
                pipeline: Pipeline::Metrics,
                dates: table.len(),
                columns: 2,
                first_date: table.dates().first().copied(),
                last_date: table.dates().last().copied(),
                compute_time_seconds: 0.0,
            },
            table,
            correlation,
            correlation_long,
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_write_stream_csv() {
        let mut out = Vec::new();
        write_stream(&sample_result(), OutputFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Date,Recovery,Metabolic Score\n2024-01-01,50,80\n"));
        assert!(text.contains("2024-01-03,70,\n\nLabel,Recovery,Metabolic Score\n"));
    }

    #[test]
    fn test_write_stream_json() {
        let mut out = Vec::new();
        write_stream(&sample_result(), OutputFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["metadata"]["pipeline"], "metrics");
        assert_eq!(value["table"][2]["Metabolic Score"], serde_json::Value::Null);
        assert_eq!(value["correlation"]["labels"][0], "Recovery");
    }

    #[test]
    fn test_write_to_dir_csv() {
        let tmp = TempDir::new().unwrap();
        let written = write_to_dir(&sample_result(), OutputFormat::Csv, tmp.path()).unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "metrics_features.csv",
                "metrics_correlation.csv",
                "metrics_correlation_long.csv",
                "metrics_metadata.json"
            ]
        );

        let long = std::fs::read_to_string(&written[2]).unwrap();
        assert!(long.starts_with("x,y,correlation\nRecovery,Recovery,1\n"));
    }

    #[test]
    fn test_write_to_dir_json_creates_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("out");
        let written = write_to_dir(&sample_result(), OutputFormat::Json, &dir).unwrap();

        assert_eq!(written, vec![dir.join("metrics_analysis.json")]);
        assert!(written[0].is_file());
    }
}
