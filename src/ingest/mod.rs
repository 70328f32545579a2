//! Ingestion of uploaded sensor files.
//!
//! This module provides:
//! - Reading, labeled reading and dataset types
//! - CSV parsing with column validation and timestamp synthesis
//! - Reference dataset parsing for classifier training

pub mod parser;
pub mod types;

// Re-export commonly used types
pub use parser::{parse, parse_readings, parse_reference, IngestionError, ReferenceData};
pub use types::{Dataset, Features, LabeledReading, Metric, Reading};
