//! Sensor reading types shared by ingestion, the classifier and the feed.

use crate::model::PumpState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of numeric features fed to the classifier.
pub const FEATURE_COUNT: usize = 3;

/// The three measured values of one sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Soil moisture in Ohm
    pub soil_moisture: f64,
    /// Temperature in °C
    pub temperature: f64,
    /// Air humidity in percent
    pub air_humidity: f64,
}

impl Features {
    pub fn new(soil_moisture: f64, temperature: f64, air_humidity: f64) -> Self {
        Self {
            soil_moisture,
            temperature,
            air_humidity,
        }
    }

    /// Features in classifier column order.
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [self.soil_moisture, self.temperature, self.air_humidity]
    }

    /// Value of a single metric.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::SoilMoisture => self.soil_moisture,
            Metric::Temperature => self.temperature,
            Metric::AirHumidity => self.air_humidity,
        }
    }

    /// First metric whose value is not a finite number.
    pub fn first_non_finite(&self) -> Option<Metric> {
        Metric::ALL
            .into_iter()
            .find(|metric| !self.value(*metric).is_finite())
    }
}

/// A measured metric, with the column name and display metadata it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SoilMoisture,
    Temperature,
    AirHumidity,
}

impl Metric {
    /// All metrics in classifier column order.
    pub const ALL: [Metric; FEATURE_COUNT] =
        [Metric::SoilMoisture, Metric::Temperature, Metric::AirHumidity];

    /// Exact header name in uploaded files.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::SoilMoisture => "Soil Moisture",
            Metric::Temperature => "Temperature",
            Metric::AirHumidity => "Air Humidity",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::SoilMoisture => "Ohm",
            Metric::Temperature => "°C",
            Metric::AirHumidity => "%",
        }
    }

    /// Chart title.
    pub fn title(&self) -> &'static str {
        match self {
            Metric::SoilMoisture => "Soil Moisture Levels (Ohm)",
            Metric::Temperature => "Temperature Variation (°C)",
            Metric::AirHumidity => "Air Humidity Percentage (%)",
        }
    }

    /// Axis label, e.g. "Temperature (°C)".
    pub fn axis_label(&self) -> String {
        format!("{} ({})", self.column(), self.unit())
    }
}

/// A single sensor reading. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(flatten)]
    pub features: Features,
    /// Synthesized arrival time
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(features: Features, timestamp: DateTime<Utc>) -> Self {
        Self {
            features,
            timestamp,
        }
    }
}

/// A reading together with its predicted pump state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledReading {
    #[serde(flatten)]
    pub reading: Reading,
    pub pump_state: PumpState,
}

impl LabeledReading {
    pub fn features(&self) -> &Features {
        &self.reading.features
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.reading.timestamp
    }
}

/// Labeled readings of one uploaded file, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    readings: Vec<LabeledReading>,
    ingested_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(readings: Vec<LabeledReading>, ingested_at: DateTime<Utc>) -> Self {
        Self {
            readings,
            ingested_at,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LabeledReading> {
        self.readings.get(index)
    }

    pub fn readings(&self) -> &[LabeledReading] {
        &self.readings
    }

    /// When the file was ingested (timestamp of the first reading).
    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    /// Number of readings predicted to need the pump.
    pub fn pump_on_count(&self) -> usize {
        self.readings
            .iter()
            .filter(|r| r.pump_state == PumpState::On)
            .count()
    }
}
