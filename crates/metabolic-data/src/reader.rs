//! CSV loading for the four tracker exports.
//!
//! Every loader takes the raw bytes of one export, locates its header row,
//! checks that the expected columns are present (extra columns are ignored)
//! and turns the rows into typed records from [`metabolic_core::models`].

use std::collections::btree_map::Entry;
use std::path::Path;

use chrono::NaiveDate;
use metabolic_core::error::{DataSource, HealthError, Result};
use metabolic_core::models::{
    FastLogEntry, GlucoseReading, GlucoseSeries, MetabolicScores, SleepRecord, SleepTable,
};
use metabolic_core::time_utils::{
    parse_date, parse_time_of_day, parse_timestamp, truncate_to_millis, Localized,
    TimezoneHandler,
};
use tracing::debug;

// ── Expected layouts ──────────────────────────────────────────────────────────

/// Columns required in a Whoop daily summary export.
pub const SLEEP_COLUMNS: [&str; 12] = [
    "Date",
    "Strain",
    "Recovery",
    "Sleep Score",
    "RHR",
    "Average HR",
    "Max HR",
    "Respiratory Rate",
    "HRV (ms)",
    "Sleep (hr)",
    "Sleep Start",
    "Sleep End",
];

/// Columns required in a FreeStyle LibreLink export (second row).
pub const GLUCOSE_COLUMNS: [&str; 3] =
    ["Device Timestamp", "Record Type", "Historic Glucose mg/dL"];

/// Columns required in a Levels metabolic score export.
pub const METABOLIC_SCORE_COLUMNS: [&str; 2] = ["Date", "Levels Score (day)"];

/// Columns required in a Zero fasting export.
pub const FASTING_COLUMNS: [&str; 5] = ["Date", "Start", "End", "Hours", "Night Eating"];

/// Longest fast a log row may report. A fast crossing one midnight ends
/// before this.
pub const MAX_FAST_HOURS: f64 = 48.0;

/// Record type of "Historic Glucose" samples in LibreLink exports.
const HISTORIC_GLUCOSE_RECORD: f64 = 0.0;

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse a Whoop daily summary export into a date-keyed [`SleepTable`].
pub fn load_sleep_data(bytes: &[u8]) -> Result<SleepTable> {
    let table = ProjectedTable::read(bytes, DataSource::Sleep, &SLEEP_COLUMNS)?;
    let mut sleep = SleepTable::new();

    for row in &table.rows {
        let date = table.date(row, 0)?;
        let sleep_start = table.timestamp(row, 10)?.map(truncate_to_millis);
        let sleep_end = table.timestamp(row, 11)?.map(truncate_to_millis);

        if let (Some(start), Some(end)) = (sleep_start, sleep_end) {
            if start > end {
                return Err(HealthError::InvalidRecord {
                    input: DataSource::Sleep,
                    row: row.line,
                    reason: format!("sleep starts at {start} but ends at {end}"),
                });
            }
        }

        let record = SleepRecord {
            date,
            strain: table.number(row, 1)?,
            recovery: table.number(row, 2)?,
            sleep_score: table.number(row, 3)?,
            resting_hr: table.number(row, 4)?,
            average_hr: table.number(row, 5)?,
            max_hr: table.number(row, 6)?,
            respiratory_rate: table.number(row, 7)?,
            hrv_ms: table.number(row, 8)?,
            sleep_hours: table.number(row, 9)?,
            sleep_start,
            sleep_end,
        };
        insert_unique(&mut sleep, date, record, DataSource::Sleep, row.line)?;
    }

    debug!("Loaded {} sleep records", sleep.len());
    Ok(sleep)
}

/// Parse a LibreLink export into a time-ordered UTC [`GlucoseSeries`].
///
/// Device timestamps are wall-clock times in `timezone`. Local times that
/// are ambiguous or skipped around a DST change are dropped.
pub fn load_glucose_data(bytes: &[u8], timezone: &str) -> Result<GlucoseSeries> {
    let handler = TimezoneHandler::new(timezone)?;
    let table = ProjectedTable::read(bytes, DataSource::Glucose, &GLUCOSE_COLUMNS)?;

    let mut readings: GlucoseSeries = Vec::with_capacity(table.rows.len());
    let mut other_records = 0usize;
    let mut missing = 0usize;
    let mut dst_dropped = 0usize;

    for row in &table.rows {
        let record_type = table.number(row, 1)?;
        if record_type != HISTORIC_GLUCOSE_RECORD {
            other_records += 1;
            continue;
        }

        let value = table.number(row, 2)?;
        let Some(local) = parse_timestamp(row.cell(0)) else {
            missing += 1;
            continue;
        };
        if value.is_nan() {
            missing += 1;
            continue;
        }

        match handler.localize_to_utc(local) {
            Localized::Utc(ts) => readings.push(GlucoseReading::new(ts, value)),
            Localized::Ambiguous | Localized::Nonexistent => {
                debug!("Dropping glucose reading at {} (DST transition)", local);
                dst_dropped += 1;
            }
        }
    }

    readings.sort_by_key(|r| r.timestamp);

    debug!(
        "Glucose export: {} rows read, {} kept, {} other record types, {} incomplete, {} dropped at DST changes",
        table.rows.len(),
        readings.len(),
        other_records,
        missing,
        dst_dropped,
    );

    Ok(readings)
}

/// Parse a Levels export into date-keyed [`MetabolicScores`].
pub fn load_metabolic_scores(bytes: &[u8]) -> Result<MetabolicScores> {
    let table = ProjectedTable::read(bytes, DataSource::MetabolicScore, &METABOLIC_SCORE_COLUMNS)?;
    let mut scores = MetabolicScores::new();

    for row in &table.rows {
        let date = table.date(row, 0)?;
        let score = table.number(row, 1)?;
        insert_unique(&mut scores, date, score, DataSource::MetabolicScore, row.line)?;
    }

    debug!("Loaded {} metabolic scores", scores.len());
    Ok(scores)
}

/// Parse a Zero export into fasts ordered oldest first.
///
/// Zero writes the newest fast first, so the row order is reversed.
pub fn load_fasting_data(bytes: &[u8]) -> Result<Vec<FastLogEntry>> {
    let table = ProjectedTable::read(bytes, DataSource::Fasting, &FASTING_COLUMNS)?;
    let mut fasts = Vec::with_capacity(table.rows.len());

    for row in table.rows.iter().rev() {
        let hours = table.number(row, 3)?;
        if !(0.0..=MAX_FAST_HOURS).contains(&hours) {
            return Err(table.cell_error(row, 3));
        }
        fasts.push(FastLogEntry {
            date: table.date(row, 0)?,
            start: parse_time_of_day(row.cell(1)).ok_or_else(|| table.cell_error(row, 1))?,
            end: parse_time_of_day(row.cell(2)).ok_or_else(|| table.cell_error(row, 2))?,
            hours,
            night_eating: parse_flag(row.cell(4)).ok_or_else(|| table.cell_error(row, 4))?,
        });
    }

    debug!("Loaded {} fasts", fasts.len());
    Ok(fasts)
}

// ── File wrappers ─────────────────────────────────────────────────────────────

/// Read a whole export from disk.
pub fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| HealthError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_sleep_file(path: &Path) -> Result<SleepTable> {
    load_sleep_data(&read_source(path)?)
}

pub fn load_glucose_file(path: &Path, timezone: &str) -> Result<GlucoseSeries> {
    load_glucose_data(&read_source(path)?, timezone)
}

pub fn load_metabolic_score_file(path: &Path) -> Result<MetabolicScores> {
    load_metabolic_scores(&read_source(path)?)
}

pub fn load_fasting_file(path: &Path) -> Result<Vec<FastLogEntry>> {
    load_fasting_data(&read_source(path)?)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Data rows of an export, reduced to the expected columns in order.
struct ProjectedTable {
    input: DataSource,
    expected: &'static [&'static str],
    rows: Vec<ProjectedRow>,
}

struct ProjectedRow {
    /// 1-based line number in the source file.
    line: usize,
    cells: Vec<String>,
}

impl ProjectedRow {
    fn cell(&self, col: usize) -> &str {
        self.cells.get(col).map_or("", String::as_str)
    }
}

impl ProjectedTable {
    fn read(
        bytes: &[u8],
        input: DataSource,
        expected: &'static [&'static str],
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let header_row = input.header_row();
        let mut positions: Option<Vec<usize>> = None;
        let mut rows = Vec::new();

        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| HealthError::schema(input, expected, e.to_string()))?;
            let line = record
                .position()
                .map_or(index + 1, |p| p.line() as usize);

            if index < header_row {
                continue;
            }

            let Some(columns) = positions.as_ref() else {
                positions = Some(locate_columns(&record, input, expected)?);
                continue;
            };

            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            let cells = columns
                .iter()
                .map(|&p| record.get(p).unwrap_or("").trim().to_string())
                .collect();
            rows.push(ProjectedRow { line, cells });
        }

        if positions.is_none() {
            return Err(HealthError::schema(input, expected, "header row not found"));
        }

        debug!("Read {} {} rows", rows.len(), input);
        Ok(Self {
            input,
            expected,
            rows,
        })
    }

    fn cell_error(&self, row: &ProjectedRow, col: usize) -> HealthError {
        HealthError::schema(
            self.input,
            self.expected,
            format!(
                "could not parse {:?} in column {} at line {}",
                row.cell(col),
                self.expected[col],
                row.line
            ),
        )
    }

    /// Required date cell.
    fn date(&self, row: &ProjectedRow, col: usize) -> Result<NaiveDate> {
        parse_date(row.cell(col)).ok_or_else(|| self.cell_error(row, col))
    }

    /// Numeric cell; empty cells are `NaN`.
    fn number(&self, row: &ProjectedRow, col: usize) -> Result<f64> {
        let cell = row.cell(col);
        if cell.is_empty() {
            return Ok(f64::NAN);
        }
        cell.parse::<f64>().map_err(|_| self.cell_error(row, col))
    }

    /// Optional timestamp cell.
    fn timestamp(
        &self,
        row: &ProjectedRow,
        col: usize,
    ) -> Result<Option<chrono::NaiveDateTime>> {
        let cell = row.cell(col);
        if cell.is_empty() {
            return Ok(None);
        }
        parse_timestamp(cell)
            .map(Some)
            .ok_or_else(|| self.cell_error(row, col))
    }
}

/// Position of every expected column in the header record.
fn locate_columns(
    header: &csv::StringRecord,
    input: DataSource,
    expected: &[&str],
) -> Result<Vec<usize>> {
    let names: Vec<&str> = header
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();

    let mut positions = Vec::with_capacity(expected.len());
    let mut missing = Vec::new();
    for column in expected {
        match names.iter().position(|n| n == column) {
            Some(p) => positions.push(p),
            None => missing.push(*column),
        }
    }

    if !missing.is_empty() {
        return Err(HealthError::schema(
            input,
            expected,
            format!("missing columns: {}", missing.join(", ")),
        ));
    }
    Ok(positions)
}

fn insert_unique<V>(
    map: &mut std::collections::BTreeMap<NaiveDate, V>,
    date: NaiveDate,
    value: V,
    input: DataSource,
    line: usize,
) -> Result<()> {
    match map.entry(date) {
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
        Entry::Occupied(_) => Err(HealthError::InvalidRecord {
            input,
            row: line,
            reason: format!("duplicate date {date}"),
        }),
    }
}

fn parse_flag(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "" | "no" | "false" | "0" | "n" => Some(false),
        "yes" | "true" | "1" | "y" => Some(true),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, NaiveTime, Timelike};
    use std::io::Write;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        day(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    const SLEEP_HEADER: &str = "Date,Strain,Recovery,Sleep Score,RHR,Average HR,Max HR,Respiratory Rate,HRV (ms),Sleep (hr),Sleep Start,Sleep End";

    const GLUCOSE_CSV: &str = "\
Glucose Data,Generated on,02-20-2021 10:00 AM,Generated by,FreeStyle LibreLink
Device,Serial Number,Device Timestamp,Record Type,Historic Glucose mg/dL,Scan Glucose mg/dL
FreeStyle LibreLink,abc,02-15-2021 08:15 PM,0,101,
FreeStyle LibreLink,abc,02-15-2021 08:00 PM,0,96,
FreeStyle LibreLink,abc,02-15-2021 08:05 PM,1,,104
FreeStyle LibreLink,abc,02-15-2021 08:30 PM,0,,
";

    // ── load_sleep_data ───────────────────────────────────────────────────────

    #[test]
    fn test_load_sleep_data_basic() {
        let csv = format!(
            "{SLEEP_HEADER}\n2021-02-15,10.2,64,88,52,61,150,14.2,71,7.6,2021-02-14 23:10:00.123456,2021-02-15 06:50:00\n"
        );
        let sleep = load_sleep_data(csv.as_bytes()).unwrap();

        let record = &sleep[&day(2021, 2, 15)];
        assert_eq!(record.recovery, 64.0);
        assert_eq!(record.hrv_ms, 71.0);
        assert_eq!(record.sleep_end, Some(dt(2021, 2, 15, 6, 50)));
        assert_eq!(record.sleep_start.unwrap().nanosecond(), 123_000_000);
    }

    #[test]
    fn test_load_sleep_data_empty_cells() {
        let csv = format!("{SLEEP_HEADER}\n2021-02-15,,64,88,52,61,150,14.2,71,7.6,,\n");
        let sleep = load_sleep_data(csv.as_bytes()).unwrap();

        let record = &sleep[&day(2021, 2, 15)];
        assert!(record.strain.is_nan());
        assert!(record.sleep_window().is_none());
    }

    #[test]
    fn test_load_sleep_data_ignores_extra_columns() {
        let csv = "Cycle,Date,Strain,Recovery,Sleep Score,RHR,Average HR,Max HR,Respiratory Rate,HRV (ms),Sleep (hr),Sleep Start,Sleep End,Notes\n\
                   1,2021-02-15,10.2,64,88,52,61,150,14.2,71,7.6,,,note\n";
        let sleep = load_sleep_data(csv.as_bytes()).unwrap();
        assert_eq!(sleep[&day(2021, 2, 15)].strain, 10.2);
    }

    #[test]
    fn test_load_sleep_data_missing_column_lists_expected() {
        let csv = "Date,Strain\n2021-02-15,10\n";
        let err = load_sleep_data(csv.as_bytes()).unwrap_err();

        let HealthError::Schema { expected, .. } = &err else {
            panic!("expected schema error, got {err:?}");
        };
        assert_eq!(expected.len(), 12);
        assert!(err.to_string().contains("first row"));
    }

    #[test]
    fn test_load_sleep_data_rejects_duplicate_dates() {
        let row = "2021-02-15,10.2,64,88,52,61,150,14.2,71,7.6,,";
        let csv = format!("{SLEEP_HEADER}\n{row}\n{row}\n");
        let err = load_sleep_data(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, HealthError::InvalidRecord { row: 3, .. }));
    }

    #[test]
    fn test_load_sleep_data_rejects_inverted_window() {
        let csv = format!(
            "{SLEEP_HEADER}\n2021-02-15,10.2,64,88,52,61,150,14.2,71,7.6,2021-02-15 07:00:00,2021-02-14 23:00:00\n"
        );
        let err = load_sleep_data(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, HealthError::InvalidRecord { .. }));
    }

    // ── load_glucose_data ─────────────────────────────────────────────────────

    #[test]
    fn test_load_glucose_data_filters_and_sorts() {
        let readings = load_glucose_data(GLUCOSE_CSV.as_bytes(), "UTC").unwrap();

        assert_eq!(
            readings,
            vec![
                GlucoseReading::new(dt(2021, 2, 15, 20, 0), 96.0),
                GlucoseReading::new(dt(2021, 2, 15, 20, 15), 101.0),
            ]
        );
    }

    #[test]
    fn test_load_glucose_data_converts_to_utc() {
        let readings = load_glucose_data(GLUCOSE_CSV.as_bytes(), "America/New_York").unwrap();
        // EST is UTC-5, pushing both readings past midnight UTC.
        assert_eq!(readings[0].timestamp, dt(2021, 2, 16, 1, 0));
    }

    #[test]
    fn test_load_glucose_data_drops_ambiguous_times() {
        let csv = "\
meta
Device Timestamp,Record Type,Historic Glucose mg/dL
11-05-2023 01:30 AM,0,100
11-05-2023 03:30 AM,0,110
";
        let readings = load_glucose_data(csv.as_bytes(), "America/New_York").unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value, 110.0);
    }

    #[test]
    fn test_load_glucose_data_missing_record_type() {
        let csv = "\
meta
Device Timestamp,Historic Glucose mg/dL
02-15-2021 08:00 PM,96
";
        let err = load_glucose_data(csv.as_bytes(), "UTC").unwrap_err();

        let HealthError::Schema { expected, .. } = &err else {
            panic!("expected schema error, got {err:?}");
        };
        assert_eq!(
            expected,
            &vec![
                "Device Timestamp".to_string(),
                "Record Type".to_string(),
                "Historic Glucose mg/dL".to_string()
            ]
        );
        assert!(err.to_string().contains("second row"));
    }

    #[test]
    fn test_load_glucose_data_header_on_first_row_is_rejected() {
        let csv = "Device Timestamp,Record Type,Historic Glucose mg/dL\n02-15-2021 08:00 PM,0,96\n";
        let err = load_glucose_data(csv.as_bytes(), "UTC").unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_load_glucose_data_unknown_timezone() {
        let err = load_glucose_data(GLUCOSE_CSV.as_bytes(), "Mars/Olympus").unwrap_err();
        assert!(matches!(err, HealthError::UnknownTimezone(_)));
    }

    // ── load_metabolic_scores ─────────────────────────────────────────────────

    #[test]
    fn test_load_metabolic_scores() {
        let csv = "\u{feff}Date,Levels Score (day),Notes\n2021-02-15,78,\n2021-02-16,81,x\n";
        let scores = load_metabolic_scores(csv.as_bytes()).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&day(2021, 2, 16)], 81.0);
    }

    #[test]
    fn test_load_metabolic_scores_bad_value() {
        let csv = "Date,Levels Score (day)\n2021-02-15,high\n";
        let err = load_metabolic_scores(csv.as_bytes()).unwrap_err();
        assert!(err.is_schema_error());
    }

    // ── load_fasting_data ─────────────────────────────────────────────────────

    #[test]
    fn test_load_fasting_data_reverses_rows() {
        let csv = "\
Date,Start,End,Hours,Night Eating
2021-02-16,20:00,12:00,16,No
2021-02-15,22:00,06:00,8,Yes
";
        let fasts = load_fasting_data(csv.as_bytes()).unwrap();

        assert_eq!(fasts.len(), 2);
        assert_eq!(fasts[0].date, day(2021, 2, 15));
        assert_eq!(fasts[0].start, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert!(fasts[0].night_eating);
        assert_eq!(fasts[1].hours, 16.0);
        assert!(!fasts[1].night_eating);
    }

    #[test]
    fn test_load_fasting_data_requires_hours() {
        let csv = "Date,Start,End,Hours,Night Eating\n2021-02-15,22:00,06:00,,No\n";
        let err = load_fasting_data(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Hours"));
    }

    #[test]
    fn test_load_fasting_data_rejects_out_of_range_hours() {
        for hours in ["inf", "-inf", "NaN", "1e12", "-1e300", "-2", "48.5"] {
            let csv =
                format!("Date,Start,End,Hours,Night Eating\n2021-02-15,22:00,06:00,{hours},No\n");
            let err = load_fasting_data(csv.as_bytes()).unwrap_err();
            assert!(err.is_schema_error(), "hours = {hours}");
            assert!(err.to_string().contains("Hours"), "hours = {hours}");
        }
    }

    #[test]
    fn test_load_fasting_data_accepts_hour_bounds() {
        let csv = "\
Date,Start,End,Hours,Night Eating
2021-02-16,08:00,08:00,0,No
2021-02-15,20:00,20:00,48,No
";
        let fasts = load_fasting_data(csv.as_bytes()).unwrap();
        assert_eq!(fasts[0].hours, 48.0);
        assert_eq!(fasts[1].hours, 0.0);
    }

    #[test]
    fn test_load_fasting_data_bad_time() {
        let csv = "Date,Start,End,Hours,Night Eating\n2021-02-15,late,06:00,8,No\n";
        assert!(load_fasting_data(csv.as_bytes()).unwrap_err().is_schema_error());
    }

    // ── file wrappers ─────────────────────────────────────────────────────────

    #[test]
    fn test_load_fasting_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("zero.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Date,Start,End,Hours,Night Eating").unwrap();
        writeln!(file, "2021-02-15,22:00,06:00,8,No").unwrap();

        let fasts = load_fasting_file(&path).unwrap();
        assert_eq!(fasts.len(), 1);
    }

    #[test]
    fn test_read_source_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_source(&tmp.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, HealthError::FileRead { .. }));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
