//! Shared types for the metabolic health analysis crates.
//!
//! Domain records for the four source exports, the error taxonomy, timezone
//! handling, statistics primitives and the date-keyed output tables.

pub mod error;
pub mod formatting;
pub mod matrix;
pub mod models;
pub mod settings;
pub mod stats;
pub mod table;
pub mod time_utils;

pub use error::{DataSource, HealthError, Result};
pub use matrix::{CorrelationEdge, CorrelationMatrix};
pub use table::{Column, FeatureTable, DATE_COLUMN};
