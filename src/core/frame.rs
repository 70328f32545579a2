//! Per-tick frame handed to the presentation layer.
//!
//! A frame is the data behind one refresh of the dashboard: the status of
//! both parcels in the current window and the metric charts up to it.

use crate::config::ParcelConfig;
use crate::core::feed::{current_window, FeedError};
use crate::core::series::{build_charts, MetricChart, SeriesMode};
use crate::ingest::types::{Dataset, LabeledReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The name of this producer.
pub const PRODUCER_NAME: &str = "irrigation-monitor";

/// A measured value with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub unit: String,
}

impl Measurement {
    fn new(value: f64, unit: &str) -> Self {
        Self {
            value,
            unit: unit.to_string(),
        }
    }
}

/// Status row for one parcel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelStatus {
    /// 1 or 2
    pub parcel: u8,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Dataset row shown for this parcel
    pub row: usize,
    pub observed_at: DateTime<Utc>,
    pub soil_moisture: Measurement,
    pub temperature: Measurement,
    pub air_humidity: Measurement,
    /// "On" or "Off"
    pub irrigation: String,
}

/// Everything rendered for one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: String,
    pub session_id: String,
    pub producer: String,
    pub cursor: usize,
    pub dataset_len: usize,
    pub computed_at: DateTime<Utc>,
    pub parcels: Vec<ParcelStatus>,
    pub charts: Vec<MetricChart>,
}

impl Frame {
    /// Number of parcels in this frame whose pump is predicted on.
    pub fn pumps_on(&self) -> usize {
        self.parcels.iter().filter(|p| p.irrigation == "On").count()
    }
}

/// Builder for frames; holds the static parcel layout and series mode.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    instance_id: Uuid,
    parcels: Vec<ParcelConfig>,
    series_mode: SeriesMode,
}

impl FrameBuilder {
    pub fn new(parcels: Vec<ParcelConfig>, series_mode: SeriesMode) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            parcels,
            series_mode,
        }
    }

    /// Build the frame for the window at `cursor`. Does not move the cursor.
    pub fn build(
        &self,
        session_id: &str,
        dataset: &Dataset,
        cursor: usize,
    ) -> Result<Frame, FeedError> {
        let (first, second) = current_window(dataset, cursor)?;
        let computed_at = Utc::now();

        let parcels = vec![
            self.parcel_status(1, cursor, first),
            self.parcel_status(2, cursor + 1, second),
        ];

        Ok(Frame {
            frame_id: format!("f_{}_{}", computed_at.timestamp_millis(), cursor),
            session_id: session_id.to_string(),
            producer: format!("{PRODUCER_NAME}/{}", self.instance_id),
            cursor,
            dataset_len: dataset.len(),
            computed_at,
            parcels,
            charts: build_charts(dataset, cursor, self.series_mode),
        })
    }

    fn parcel_status(&self, parcel: u8, row: usize, reading: &LabeledReading) -> ParcelStatus {
        let layout = self.parcels.get(usize::from(parcel) - 1);
        let features = reading.features();

        ParcelStatus {
            parcel,
            name: layout
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("Parcel {parcel}")),
            latitude: layout.map(|p| p.latitude),
            longitude: layout.map(|p| p.longitude),
            row,
            observed_at: reading.timestamp(),
            soil_moisture: Measurement::new(features.soil_moisture, "Ohm"),
            temperature: Measurement::new(features.temperature, "°C"),
            air_humidity: Measurement::new(features.air_humidity, "%"),
            irrigation: reading.pump_state.as_str().to_string(),
        }
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new(ParcelConfig::defaults(), SeriesMode::default())
    }
}
