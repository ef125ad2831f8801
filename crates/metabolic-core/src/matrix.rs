use std::collections::HashMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{HealthError, Result};
use crate::formatting::{format_cell, round_to};

/// One `(x, y, correlation)` entry of a long-format correlation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEdge {
    pub x: String,
    pub y: String,
    /// Pearson coefficient; `NaN` (serialised as `null`) when undefined.
    #[serde(with = "nan_as_null")]
    pub correlation: f64,
}

/// Square, symmetric, labelled correlation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    labels: Vec<String>,
    /// Row-major, `labels.len()` × `labels.len()`.
    values: Vec<f64>,
}

impl CorrelationMatrix {
    /// Build from labels and row-major values.
    pub fn new(labels: Vec<String>, values: Vec<f64>) -> Result<Self> {
        let expected = labels.len() * labels.len();
        if values.len() != expected {
            return Err(HealthError::LengthMismatch {
                column: "correlation values".to_string(),
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { labels, values })
    }

    /// Rebuild a square matrix from its long form.
    ///
    /// Labels keep the order in which they first appear as `x`.
    pub fn from_long(edges: &[CorrelationEdge]) -> Result<Self> {
        let mut labels: Vec<String> = Vec::new();
        for edge in edges {
            if !labels.contains(&edge.x) {
                labels.push(edge.x.clone());
            }
        }
        let position: HashMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let n = labels.len();
        let mut values = vec![f64::NAN; n * n];
        for edge in edges {
            let (Some(&i), Some(&j)) =
                (position.get(edge.x.as_str()), position.get(edge.y.as_str()))
            else {
                return Err(HealthError::Config(format!(
                    "correlation edge references unknown label {:?}",
                    edge.y
                )));
            };
            values[i * n + j] = edge.correlation;
        }
        Self::new(labels, values)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    /// Coefficient at (`row`, `col`) by position.
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.labels.len() + col]
    }

    /// Coefficient between two labels.
    pub fn get(&self, x: &str, y: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == x)?;
        let j = self.labels.iter().position(|l| l == y)?;
        Some(self.at(i, j))
    }

    /// One edge per `(x, y)` pair, row-major.
    pub fn to_long(&self) -> Vec<CorrelationEdge> {
        let n = self.labels.len();
        let mut edges = Vec::with_capacity(n * n);
        for (i, x) in self.labels.iter().enumerate() {
            for (j, y) in self.labels.iter().enumerate() {
                edges.push(CorrelationEdge {
                    x: x.clone(),
                    y: y.clone(),
                    correlation: self.values[i * n + j],
                });
            }
        }
        edges
    }

    /// Copy with every coefficient rounded to `decimals` places.
    pub fn round(&self, decimals: u32) -> Self {
        Self {
            labels: self.labels.clone(),
            values: self.values.iter().map(|v| round_to(*v, decimals)).collect(),
        }
    }

    /// Write as CSV: a leading `Label` column, then one column per label.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["Label".to_string()];
        header.extend(self.labels.iter().cloned());
        wtr.write_record(&header)?;

        let n = self.labels.len();
        for (i, label) in self.labels.iter().enumerate() {
            let mut record = vec![label.clone()];
            record.extend(self.values[i * n..(i + 1) * n].iter().map(|v| format_cell(*v)));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Serialises as `{"labels": [...], "values": [[...], ...]}` with `null`
/// for undefined coefficients.
impl Serialize for CorrelationMatrix {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let n = self.labels.len();
        let rows: Vec<Vec<Option<f64>>> = (0..n)
            .map(|i| {
                self.values[i * n..(i + 1) * n]
                    .iter()
                    .map(|v| (!v.is_nan()).then_some(*v))
                    .collect()
            })
            .collect();

        let mut s = serializer.serialize_struct("CorrelationMatrix", 2)?;
        s.serialize_field("labels", &self.labels)?;
        s.serialize_field("values", &rows)?;
        s.end()
    }
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
