//! Date-keyed wide feature table.
//!
//! Every analysis output is one row per calendar date with an explicit
//! `Date` column followed by named statistic columns. Columns are numeric
//! (`NaN` marks a missing value) or categorical (`None` marks a missing
//! value). Dates are unique and ascending.

use std::collections::BTreeSet;
use std::io::Write;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{HealthError, Result};
use crate::formatting::{format_cell, round_to};

/// Name of the explicit key column.
pub const DATE_COLUMN: &str = "Date";

// ── Column ────────────────────────────────────────────────────────────────────

/// Values of one table column, aligned with the table's dates.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric values, or `None` for a categorical column.
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Column::Numeric(v) => Some(v),
            Column::Categorical(_) => None,
        }
    }

    /// Gather values by row position; `None` positions become missing values.
    fn take(&self, rows: &[Option<usize>]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(
                rows.iter()
                    .map(|r| r.map_or(f64::NAN, |i| v[i]))
                    .collect(),
            ),
            Column::Categorical(v) => Column::Categorical(
                rows.iter()
                    .map(|r| r.and_then(|i| v[i].clone()))
                    .collect(),
            ),
        }
    }

    fn cell_text(&self, row: usize) -> String {
        match self {
            Column::Numeric(v) => format_cell(v[row]),
            Column::Categorical(v) => v[row].clone().unwrap_or_default(),
        }
    }
}

// ── FeatureTable ──────────────────────────────────────────────────────────────

/// One row per date, columns in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    dates: Vec<NaiveDate>,
    columns: IndexMap<String, Column>,
}

impl FeatureTable {
    /// Create a table with no columns over the given dates.
    ///
    /// Duplicates are collapsed and the dates sorted ascending.
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        Self {
            dates: unique.into_iter().collect(),
            columns: IndexMap::new(),
        }
    }

    /// Append a numeric column.
    pub fn push_numeric(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.push_column(name.into(), Column::Numeric(values))
    }

    /// Append a categorical column.
    pub fn push_categorical(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<()> {
        self.push_column(name.into(), Column::Categorical(values))
    }

    fn push_column(&mut self, name: String, column: Column) -> Result<()> {
        if name == DATE_COLUMN || self.columns.contains_key(&name) {
            return Err(HealthError::ColumnCollision(name));
        }
        if column.len() != self.dates.len() {
            return Err(HealthError::LengthMismatch {
                column: name,
                expected: self.dates.len(),
                actual: column.len(),
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Column names in order, excluding `Date`.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Numeric columns in order; categorical columns are skipped.
    pub fn numeric_columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns
            .iter()
            .filter_map(|(name, col)| col.as_numeric().map(|v| (name.as_str(), v)))
    }

    /// Row position of `date`.
    pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Numeric cell at (`date`, `column`). Missing cells come back as `NaN`.
    pub fn number(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let row = self.row_of(date)?;
        self.columns.get(column)?.as_numeric().map(|v| v[row])
    }

    /// Categorical cell at (`date`, `column`).
    pub fn text(&self, date: NaiveDate, column: &str) -> Option<&str> {
        let row = self.row_of(date)?;
        match self.columns.get(column)? {
            Column::Categorical(v) => v[row].as_deref(),
            Column::Numeric(_) => None,
        }
    }

    // ── Transformations ───────────────────────────────────────────────────────

    /// Union of dates; cells absent from one side become missing values.
    pub fn outer_join(&self, other: &FeatureTable) -> Result<FeatureTable> {
        let dates: BTreeSet<NaiveDate> =
            self.dates.iter().chain(other.dates.iter()).copied().collect();
        self.join_on(other, dates.into_iter().collect())
    }

    /// Intersection of dates.
    pub fn inner_join(&self, other: &FeatureTable) -> Result<FeatureTable> {
        let dates: Vec<NaiveDate> = self
            .dates
            .iter()
            .copied()
            .filter(|d| other.row_of(*d).is_some())
            .collect();
        self.join_on(other, dates)
    }

    fn join_on(&self, other: &FeatureTable, dates: Vec<NaiveDate>) -> Result<FeatureTable> {
        if let Some(name) = other.column_names().find(|n| self.columns.contains_key(*n)) {
            return Err(HealthError::ColumnCollision(name.to_string()));
        }

        let left_rows: Vec<Option<usize>> = dates.iter().map(|d| self.row_of(*d)).collect();
        let right_rows: Vec<Option<usize>> = dates.iter().map(|d| other.row_of(*d)).collect();

        let mut columns = IndexMap::with_capacity(self.columns.len() + other.columns.len());
        for (name, col) in &self.columns {
            columns.insert(name.clone(), col.take(&left_rows));
        }
        for (name, col) in &other.columns {
            columns.insert(name.clone(), col.take(&right_rows));
        }

        Ok(FeatureTable { dates, columns })
    }

    /// Copy with every numeric cell rounded to `decimals` places.
    pub fn round(&self, decimals: u32) -> FeatureTable {
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| {
                let rounded = match col {
                    Column::Numeric(v) => {
                        Column::Numeric(v.iter().map(|x| round_to(*x, decimals)).collect())
                    }
                    other => other.clone(),
                };
                (name.clone(), rounded)
            })
            .collect();
        FeatureTable {
            dates: self.dates.clone(),
            columns,
        }
    }

    /// Copy without the named columns. Unknown names are ignored.
    pub fn drop_columns(&self, names: &[&str]) -> FeatureTable {
        let columns = self
            .columns
            .iter()
            .filter(|(name, _)| !names.contains(&name.as_str()))
            .map(|(name, col)| (name.clone(), col.clone()))
            .collect();
        FeatureTable {
            dates: self.dates.clone(),
            columns,
        }
    }

    // ── Output ────────────────────────────────────────────────────────────────

    /// Write the table as CSV with `Date` as the first column.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec![DATE_COLUMN.to_string()];
        header.extend(self.columns.keys().cloned());
        wtr.write_record(&header)?;

        for (row, date) in self.dates.iter().enumerate() {
            let mut record = vec![date.format("%Y-%m-%d").to_string()];
            record.extend(self.columns.values().map(|col| col.cell_text(row)));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }
}

/// Serialises as an array of row objects: `[{"Date": "2024-01-01", ...}]`.
impl Serialize for FeatureTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.dates.len()))?;
        for row in 0..self.dates.len() {
            seq.serialize_element(&RowView { table: self, row })?;
        }
        seq.end()
    }
}

struct RowView<'a> {
    table: &'a FeatureTable,
    row: usize,
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.table.columns.len() + 1))?;
        map.serialize_entry(DATE_COLUMN, &self.table.dates[self.row])?;
        for (name, col) in &self.table.columns {
            match col {
                Column::Numeric(v) => {
                    let x = v[self.row];
                    map.serialize_entry(name, &(!x.is_nan()).then_some(x))?;
                }
                Column::Categorical(v) => map.serialize_entry(name, &v[self.row])?,
            }
        }
        map.end()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
