//! Pump-state classifier adapter.
//!
//! Wraps a [`RandomForest`] trained once on the reference dataset and exposes
//! a pure `predict` over the three sensor features. The trained model can be
//! persisted as JSON and reloaded on later starts.

use crate::ingest::parser::{parse_reference, ReferenceData};
use crate::ingest::types::Features;
use crate::model::forest::{ForestParams, RandomForest, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fraction of reference rows held out to measure accuracy.
const HOLDOUT_FRACTION: f64 = 0.2;

/// Below this many reference rows every row is used for training.
const MIN_ROWS_FOR_HOLDOUT: usize = 5;

/// Seed for the train/holdout shuffle.
const SPLIT_SEED: u64 = 42;

/// Predicted pump state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PumpState {
    On,
    Off,
}

impl PumpState {
    /// Map a raw classifier label (`1` or `0`).
    pub fn from_label(label: i64) -> Result<Self, LabelMappingError> {
        match label {
            1 => Ok(PumpState::On),
            0 => Ok(PumpState::Off),
            other => Err(LabelMappingError(other)),
        }
    }

    pub fn label(&self) -> u8 {
        match self {
            PumpState::On => 1,
            PumpState::Off => 0,
        }
    }

    /// Display value shown in the irrigation column.
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpState::On => "On",
            PumpState::Off => "Off",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, PumpState::On)
    }
}

impl std::fmt::Display for PumpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw label outside `{0, 1}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMappingError(pub i64);

impl std::fmt::Display for LabelMappingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Label {} is not a pump state (expected 0 or 1)", self.0)
    }
}

impl std::error::Error for LabelMappingError {}

/// Errors raised while fitting the classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// No reference rows
    EmptyDataset,
    /// Feature rows and labels disagree in count
    LengthMismatch { features: usize, labels: usize },
    /// A feature column holds a non-numeric value
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
    /// A label column holds something other than 0 or 1
    InvalidLabel { row: usize, label: String },
    /// Reference file missing a required column
    MissingColumn(String),
    /// Reference file could not be read as delimited text
    Csv(String),
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingError::EmptyDataset => write!(f, "Reference dataset is empty"),
            TrainingError::LengthMismatch { features, labels } => write!(
                f,
                "Reference dataset has {features} feature rows but {labels} labels"
            ),
            TrainingError::NonNumeric { row, column, value } => write!(
                f,
                "Reference row {row}: column '{column}' is not numeric ('{value}')"
            ),
            TrainingError::InvalidLabel { row, label } => {
                write!(f, "Reference row {row}: label '{label}' is not 0 or 1")
            }
            TrainingError::MissingColumn(column) => {
                write!(f, "Reference dataset is missing column '{column}'")
            }
            TrainingError::Csv(e) => write!(f, "Reference dataset is not valid CSV: {e}"),
        }
    }
}

impl std::error::Error for TrainingError {}

/// Errors loading, saving or building the model artifact.
#[derive(Debug)]
pub enum ModelError {
    IoError(String),
    SerializeError(String),
    ParseError(String),
    Training(TrainingError),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::IoError(e) => write!(f, "IO error: {e}"),
            ModelError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ModelError::ParseError(e) => write!(f, "Parse error: {e}"),
            ModelError::Training(e) => write!(f, "Training error: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<TrainingError> for ModelError {
    fn from(e: TrainingError) -> Self {
        ModelError::Training(e)
    }
}

/// Trained classifier handle. Immutable after training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpClassifier {
    forest: RandomForest,
    trained_at: DateTime<Utc>,
    training_rows: usize,
    holdout_accuracy: Option<f64>,
}

impl PumpClassifier {
    /// Train with default forest parameters.
    pub fn train(records: &[Features], labels: &[i64]) -> Result<Self, TrainingError> {
        Self::train_with(records, labels, ForestParams::default())
    }

    /// Train with explicit forest parameters.
    pub fn train_with(
        records: &[Features],
        labels: &[i64],
        params: ForestParams,
    ) -> Result<Self, TrainingError> {
        if records.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        if records.len() != labels.len() {
            return Err(TrainingError::LengthMismatch {
                features: records.len(),
                labels: labels.len(),
            });
        }

        let mut samples: Vec<Sample> = Vec::with_capacity(records.len());
        let mut targets: Vec<bool> = Vec::with_capacity(labels.len());
        for (row, (features, &label)) in records.iter().zip(labels).enumerate() {
            if let Some(metric) = features.first_non_finite() {
                return Err(TrainingError::NonNumeric {
                    row,
                    column: metric.column().to_string(),
                    value: features.value(metric).to_string(),
                });
            }
            let state = PumpState::from_label(label).map_err(|e| TrainingError::InvalidLabel {
                row,
                label: e.0.to_string(),
            })?;
            samples.push(features.as_array());
            targets.push(state.is_on());
        }

        let (train_rows, holdout_rows) = split_rows(samples.len());
        let train_samples: Vec<Sample> = train_rows.iter().map(|&i| samples[i]).collect();
        let train_targets: Vec<bool> = train_rows.iter().map(|&i| targets[i]).collect();

        let forest = RandomForest::fit(&train_samples, &train_targets, params);

        let holdout_accuracy = if holdout_rows.is_empty() {
            None
        } else {
            let correct = holdout_rows
                .iter()
                .filter(|&&i| forest.predict(&samples[i]) == targets[i])
                .count();
            Some(correct as f64 / holdout_rows.len() as f64)
        };

        tracing::info!(
            "Trained pump classifier on {} rows ({} trees, holdout accuracy: {})",
            train_samples.len(),
            forest.n_trees(),
            holdout_accuracy
                .map(|a| format!("{:.1}%", a * 100.0))
                .unwrap_or_else(|| "n/a".to_string())
        );

        Ok(Self {
            forest,
            trained_at: Utc::now(),
            training_rows: train_samples.len(),
            holdout_accuracy,
        })
    }

    /// Train from a parsed reference file.
    pub fn train_reference(reference: &ReferenceData) -> Result<Self, TrainingError> {
        Self::train(&reference.features, &reference.labels)
    }

    /// Raw label (`0` or `1`) for the given features.
    pub fn predict(&self, features: &Features) -> u8 {
        u8::from(self.forest.predict(&features.as_array()))
    }

    /// Predicted pump state for the given features.
    pub fn predict_state(&self, features: &Features) -> Result<PumpState, LabelMappingError> {
        PumpState::from_label(i64::from(self.predict(features)))
    }

    /// Probability that the pump should be on.
    pub fn pump_probability(&self, features: &Features) -> f64 {
        self.forest.predict_proba(&features.as_array())
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }

    pub fn holdout_accuracy(&self) -> Option<f64> {
        self.holdout_accuracy
    }

    /// Save the model as JSON.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModelError::IoError(e.to_string()))?;
        }

        let json =
            serde_json::to_string(self).map_err(|e| ModelError::SerializeError(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ModelError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Load a model saved with [`PumpClassifier::save`].
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ModelError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ModelError::ParseError(e.to_string()))
    }

    /// Train from a reference CSV file and save the result.
    pub fn train_from_file(reference_path: &Path, model_path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(reference_path).map_err(|e| {
            ModelError::IoError(format!(
                "cannot open reference data {}: {e}",
                reference_path.display()
            ))
        })?;
        let reference = parse_reference(file)?;
        let classifier = Self::train_reference(&reference)?;
        classifier.save(model_path)?;
        tracing::info!("Saved pump classifier to {}", model_path.display());
        Ok(classifier)
    }

    /// Load the persisted model, or train and persist one if none exists.
    pub fn load_or_train(model_path: &Path, reference_path: &Path) -> Result<Self, ModelError> {
        if model_path.exists() {
            let classifier = Self::load(model_path)?;
            tracing::info!(
                "Loaded pump classifier from {} (trained {})",
                model_path.display(),
                classifier.trained_at.format("%Y-%m-%d %H:%M:%S")
            );
            return Ok(classifier);
        }

        tracing::info!(
            "No saved classifier at {}, training from {}",
            model_path.display(),
            reference_path.display()
        );
        Self::train_from_file(reference_path, model_path)
    }
}

/// Shuffle row indices and split off the holdout part.
fn split_rows(n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut rows: Vec<usize> = (0..n).collect();
    if n < MIN_ROWS_FOR_HOLDOUT {
        return (rows, Vec::new());
    }

    crate::model::forest::Lcg::new(SPLIT_SEED).shuffle(&mut rows);
    let holdout = ((n as f64) * HOLDOUT_FRACTION).ceil() as usize;
    let train = rows.split_off(holdout);
    (train, rows)
}
