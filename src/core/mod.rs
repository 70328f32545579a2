//! Core feed logic.
//!
//! This module contains:
//! - The cursor window over a dataset and its advance rule
//! - Chart series derived from the rows shown so far
//! - The frame builder producing one frame per tick

pub mod feed;
pub mod frame;
pub mod series;

// Re-export commonly used types
pub use feed::{advance, current_window, Cursor, FeedError, WINDOW_SIZE};
pub use frame::{Frame, FrameBuilder, Measurement, ParcelStatus, PRODUCER_NAME};
pub use series::{build_charts, MetricChart, ParcelSeries, SeriesMode, SeriesPoint};
