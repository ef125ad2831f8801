use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// The export a loader was reading when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Whoop daily sleep / recovery summary.
    Sleep,
    /// FreeStyle LibreLink glucose export.
    Glucose,
    /// Levels daily metabolic score log.
    MetabolicScore,
    /// Zero fasting log export.
    Fasting,
}

impl DataSource {
    /// Zero-based index of the row that holds the column headers.
    pub fn header_row(self) -> usize {
        match self {
            DataSource::Glucose => 1,
            _ => 0,
        }
    }
}

fn header_row_label(input: &DataSource) -> &'static str {
    match input.header_row() {
        0 => "first",
        _ => "second",
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataSource::Sleep => "sleep",
            DataSource::Glucose => "glucose",
            DataSource::MetabolicScore => "metabolic score",
            DataSource::Fasting => "fasting",
        };
        f.write_str(name)
    }
}

/// All errors produced by the metabolic health analysis crates.
#[derive(Error, Debug)]
pub enum HealthError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source export does not carry the expected column layout, or one of
    /// its required cells could not be parsed.
    #[error(
        "Incorrect format of {input} data CSV ({detail}). The following columns must be present in the {} row: {expected:?}",
        header_row_label(.input)
    )]
    Schema {
        input: DataSource,
        expected: Vec<String>,
        detail: String,
    },

    /// A row parsed correctly but violates a record invariant.
    #[error("Invalid {input} record at row {row}: {reason}")]
    InvalidRecord {
        input: DataSource,
        row: usize,
        reason: String,
    },

    /// The timezone name is not a recognised IANA identifier.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// A fast crosses more than one midnight and cannot be split into a
    /// start-day and end-day share.
    #[error("Unsupported interval length: fast logged on {date} runs from {start} to {end}, crossing more than one midnight")]
    UnsupportedIntervalLength {
        date: NaiveDate,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// A fast's logged duration cannot place its end on the calendar.
    #[error("Fast logged on {date} has an out-of-range duration of {hours} hours")]
    FastDurationOutOfRange { date: NaiveDate, hours: f64 },

    /// The logged duration of a fast disagrees with its start and end times.
    #[error("Inconsistent fast logged on {date}: reported {reported_hours} hours, start/end give {computed_hours:.2} hours")]
    InconsistentFast {
        date: NaiveDate,
        reported_hours: f64,
        computed_hours: f64,
    },

    /// Two joined tables share a non-key column name.
    #[error("Column collision while joining tables: {0}")]
    ColumnCollision(String),

    /// A column does not have one value per row.
    #[error("Column {column} has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// A CSV document could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed or written.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HealthError {
    /// Build a [`HealthError::Schema`] from a static column list.
    pub fn schema(input: DataSource, expected: &[&str], detail: impl Into<String>) -> Self {
        HealthError::Schema {
            input,
            expected: expected.iter().map(|c| c.to_string()).collect(),
            detail: detail.into(),
        }
    }

    /// `true` for errors the user can fix by uploading a different file.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, HealthError::Schema { .. })
    }
}

/// Convenience alias used throughout the metabolic crates.
pub type Result<T> = std::result::Result<T, HealthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = HealthError::FileRead {
            path: PathBuf::from("/some/whoop.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/some/whoop.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_schema_error_lists_expected_columns() {
        let err = HealthError::schema(
            DataSource::Glucose,
            &["Device Timestamp", "Record Type", "Historic Glucose mg/dL"],
            "missing column \"Record Type\"",
        );
        let msg = err.to_string();
        assert!(msg.contains("glucose data CSV"));
        assert!(msg.contains("second row"));
        assert!(msg.contains("\"Device Timestamp\""));
        assert!(msg.contains("\"Record Type\""));
        assert!(msg.contains("\"Historic Glucose mg/dL\""));
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_schema_error_first_row_for_sleep() {
        let err = HealthError::schema(DataSource::Sleep, &["Date"], "empty file");
        assert!(err.to_string().contains("first row"));
    }

    #[test]
    fn test_error_display_invalid_record() {
        let err = HealthError::InvalidRecord {
            input: DataSource::MetabolicScore,
            row: 4,
            reason: "duplicate date 2024-01-01".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid metabolic score record at row 4: duplicate date 2024-01-01"
        );
        assert!(!err.is_schema_error());
    }

    #[test]
    fn test_error_display_fast_duration_out_of_range() {
        let err = HealthError::FastDurationOutOfRange {
            date: NaiveDate::from_ymd_opt(2021, 2, 15).unwrap(),
            hours: f64::INFINITY,
        };
        assert_eq!(
            err.to_string(),
            "Fast logged on 2021-02-15 has an out-of-range duration of inf hours"
        );
    }

    #[test]
    fn test_error_display_unknown_timezone() {
        let err = HealthError::UnknownTimezone("Mars/Olympus".to_string());
        assert_eq!(err.to_string(), "Unknown timezone: Mars/Olympus");
    }

    #[test]
    fn test_error_display_unsupported_interval() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = HealthError::UnsupportedIntervalLength {
            date,
            start: date.and_hms_opt(20, 0, 0).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 3)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Unsupported interval length"));
        assert!(msg.contains("2024-01-03 08:00:00"));
    }

    #[test]
    fn test_error_display_column_collision() {
        let err = HealthError::ColumnCollision("Recovery".to_string());
        assert_eq!(err.to_string(), "Column collision while joining tables: Recovery");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: HealthError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: HealthError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
