//! Runtime layer for metabolic health analysis.
//!
//! Holds the per-session cache that sits between the command line and the
//! loaders and pipelines of `metabolic-data`.

pub mod session;

pub use metabolic_core as core;
pub use metabolic_data as data;
