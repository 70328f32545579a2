//! Pump-state classification.
//!
//! The classifier is trained once per process (or loaded from its persisted
//! artifact) and shared as an immutable handle:
//!
//! ```no_run
//! use irrigation_monitor::model::PumpClassifier;
//! use irrigation_monitor::ingest::Features;
//! use std::path::Path;
//!
//! let classifier = PumpClassifier::load_or_train(
//!     Path::new("rf_model.json"),
//!     Path::new("ModelDevDataset.csv"),
//! )
//! .expect("model");
//! let state = classifier.predict_state(&Features::new(480.0, 34.0, 78.0));
//! ```

mod classifier;
pub mod forest;

pub use classifier::{LabelMappingError, ModelError, PumpClassifier, PumpState, TrainingError};
pub use forest::{ForestParams, RandomForest};
