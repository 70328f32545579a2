//! Delimited-text parsing for uploaded sensor files and the reference dataset.
//!
//! Uploaded files need the three feature columns; any other columns are
//! ignored, including timestamps. Each row is stamped one minute after the
//! previous one, starting at the ingestion instant. Parsing stops at the first
//! invalid row.

use crate::ingest::types::{Dataset, Features, LabeledReading, Metric, Reading};
use crate::model::{LabelMappingError, PumpClassifier, TrainingError};
use chrono::{DateTime, Duration, Utc};
use csv::StringRecord;
use std::io::Read;

/// Label column of the reference dataset.
pub const PUMP_DATA_COLUMN: &str = "Pump Data";

/// Spacing between synthesized timestamps.
pub const READING_INTERVAL_SECS: i64 = 60;

/// Errors raised while ingesting an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionError {
    /// A required column is absent from the header row
    MissingColumn(String),
    /// A feature value is missing or not a finite number
    InvalidRow {
        row: usize,
        column: String,
        value: String,
    },
    /// Fewer rows than one window needs
    TooFewRows { rows: usize },
    /// Odd row count: the last window would have a single parcel
    UnpairedRow { rows: usize },
    /// The file is not readable as delimited text
    Csv(String),
    /// The classifier produced a label outside the pump states
    Classification(LabelMappingError),
}

impl IngestionError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            IngestionError::MissingColumn(_) => "MISSING_COLUMN",
            IngestionError::InvalidRow { .. } => "INVALID_ROW",
            IngestionError::TooFewRows { .. } => "TOO_FEW_ROWS",
            IngestionError::UnpairedRow { .. } => "UNPAIRED_ROW",
            IngestionError::Csv(_) => "INVALID_CSV",
            IngestionError::Classification(_) => "LABEL_MAPPING",
        }
    }
}

impl std::fmt::Display for IngestionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestionError::MissingColumn(column) => write!(f, "Missing column '{column}'"),
            IngestionError::InvalidRow { row, column, value } => {
                write!(f, "Row {row}: '{column}' value '{value}' is not a number")
            }
            IngestionError::TooFewRows { rows } => {
                write!(f, "File has {rows} row(s); at least 2 are needed")
            }
            IngestionError::UnpairedRow { rows } => write!(
                f,
                "File has {rows} rows; readings are shown in pairs so the count must be even"
            ),
            IngestionError::Csv(e) => write!(f, "Could not read file: {e}"),
            IngestionError::Classification(e) => write!(f, "Classification failed: {e}"),
        }
    }
}

impl std::error::Error for IngestionError {}

impl From<LabelMappingError> for IngestionError {
    fn from(e: LabelMappingError) -> Self {
        IngestionError::Classification(e)
    }
}

/// Parsed reference data: features and raw labels.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub features: Vec<Features>,
    pub labels: Vec<i64>,
}

impl ReferenceData {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Parse an uploaded file and label every row with the classifier.
pub fn parse<R: Read>(
    reader: R,
    classifier: &PumpClassifier,
    ingested_at: DateTime<Utc>,
) -> Result<Dataset, IngestionError> {
    let readings = parse_readings(reader, ingested_at)?;

    let rows = readings.len();
    if rows < 2 {
        return Err(IngestionError::TooFewRows { rows });
    }
    if rows % 2 != 0 {
        return Err(IngestionError::UnpairedRow { rows });
    }

    let labeled = readings
        .into_iter()
        .map(|reading| {
            let pump_state = classifier.predict_state(&reading.features)?;
            Ok(LabeledReading {
                reading,
                pump_state,
            })
        })
        .collect::<Result<Vec<_>, IngestionError>>()?;

    tracing::debug!("Ingested {} readings", labeled.len());
    Ok(Dataset::new(labeled, ingested_at))
}

/// Parse feature rows and synthesize timestamps, without classifying.
pub fn parse_readings<R: Read>(
    reader: R,
    ingested_at: DateTime<Utc>,
) -> Result<Vec<Reading>, IngestionError> {
    let mut csv_reader = reader_builder().from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| IngestionError::Csv(e.to_string()))?
        .clone();
    let columns = feature_indices(&headers).map_err(IngestionError::MissingColumn)?;

    let mut readings = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record.map_err(|e| IngestionError::Csv(e.to_string()))?;
        let features = read_features(&record, &columns).map_err(|(metric, value)| {
            IngestionError::InvalidRow {
                row,
                column: metric.column().to_string(),
                value,
            }
        })?;
        let timestamp = ingested_at + Duration::seconds(READING_INTERVAL_SECS * row as i64);
        readings.push(Reading::new(features, timestamp));
    }

    Ok(readings)
}

/// Parse the reference dataset (features plus `Pump Data` label).
pub fn parse_reference<R: Read>(reader: R) -> Result<ReferenceData, TrainingError> {
    let mut csv_reader = reader_builder().from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| TrainingError::Csv(e.to_string()))?
        .clone();
    let columns = feature_indices(&headers).map_err(TrainingError::MissingColumn)?;
    let label_index = column_index(&headers, PUMP_DATA_COLUMN)
        .ok_or_else(|| TrainingError::MissingColumn(PUMP_DATA_COLUMN.to_string()))?;

    let mut reference = ReferenceData::default();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record.map_err(|e| TrainingError::Csv(e.to_string()))?;
        let features = read_features(&record, &columns).map_err(|(metric, value)| {
            TrainingError::NonNumeric {
                row,
                column: metric.column().to_string(),
                value,
            }
        })?;

        let raw_label = record.get(label_index).unwrap_or("");
        let label = parse_label(raw_label).ok_or_else(|| TrainingError::NonNumeric {
            row,
            column: PUMP_DATA_COLUMN.to_string(),
            value: raw_label.to_string(),
        })?;

        reference.features.push(features);
        reference.labels.push(label);
    }

    if reference.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    Ok(reference)
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All);
    builder
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// Header positions of the feature columns, in classifier order.
fn feature_indices(headers: &StringRecord) -> Result<[usize; 3], String> {
    let mut indices = [0; 3];
    for (slot, metric) in indices.iter_mut().zip(Metric::ALL) {
        *slot = column_index(headers, metric.column())
            .ok_or_else(|| metric.column().to_string())?;
    }
    Ok(indices)
}

/// Read the three features of a record. On failure returns the offending
/// metric and its raw value.
fn read_features(
    record: &StringRecord,
    columns: &[usize; 3],
) -> Result<Features, (Metric, String)> {
    let mut values = [0.0; 3];
    for ((value, &index), metric) in values.iter_mut().zip(columns).zip(Metric::ALL) {
        let raw = record.get(index).unwrap_or("");
        *value = parse_number(raw).ok_or_else(|| (metric, raw.to_string()))?;
    }
    Ok(Features::new(values[0], values[1], values[2]))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Labels may be written as integers or integral floats ("1", "1.0").
fn parse_label(raw: &str) -> Option<i64> {
    if let Ok(label) = raw.parse::<i64>() {
        return Some(label);
    }
    parse_number(raw)
        .filter(|v| v.fract() == 0.0)
        .map(|v| v as i64)
}
