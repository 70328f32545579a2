//! Irrigation Monitor - pump-state prediction over a rotating sensor feed.
//!
//! This library loads CSV files of soil moisture, temperature and air humidity
//! readings, labels every reading with a pump on/off prediction from a
//! classifier trained once at startup, and rotates through the labeled
//! readings two parcels at a time for a dashboard to display.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Irrigation Monitor                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Ingest    │──▶│ Classifier  │──▶│   Session   │        │
//! │  │   (CSV)     │   │  (forest)   │   │  (cursor)   │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                                             │ tick          │
//! │                                             ▼               │
//! │  ┌─────────────┐                     ┌─────────────┐        │
//! │  │  Activity   │                     │    Frame    │        │
//! │  │    Log      │                     │ (2 parcels) │        │
//! │  └─────────────┘                     └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use irrigation_monitor::{core::FrameBuilder, model::PumpClassifier, ActivityLog, Session};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let classifier = PumpClassifier::load_or_train(
//!     Path::new("rf_model.json"),
//!     Path::new("ModelDevDataset.csv"),
//! )
//! .expect("Failed to prepare classifier");
//!
//! let mut session = Session::new(Arc::new(classifier), ActivityLog::shared());
//! let file = std::fs::File::open("readings.csv").expect("Failed to open readings");
//! session.upload(file, chrono::Utc::now()).expect("Invalid readings");
//!
//! let builder = FrameBuilder::default();
//! let outcome = session.tick(&builder).expect("Window out of range");
//! ```

pub mod activity;
pub mod config;
pub mod core;
pub mod ingest;
pub mod model;
pub mod session;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats, SharedActivityLog};
pub use config::{Config, ParcelConfig};
pub use core::{Cursor, FeedError, Frame, FrameBuilder, SeriesMode};
pub use ingest::{Dataset, Features, IngestionError, LabeledReading, Reading};
pub use model::{PumpClassifier, PumpState, TrainingError};
pub use session::{Session, SessionState, TickOutcome};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
