//! Data layer for metabolic health analysis.
//!
//! Loads the sleep, glucose, metabolic score and fasting exports, groups
//! and aggregates them per calendar day, joins the results into feature
//! tables and correlates their columns.

pub mod analysis;
pub mod correlation;
pub mod fasting;
pub mod glucose;
pub mod joiner;
pub mod reader;

pub use metabolic_core as core;
