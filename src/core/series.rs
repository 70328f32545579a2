//! Time series for the metric charts.
//!
//! Rows are split between the two parcels by position: even dataset indices
//! belong to Parcel 1, odd ones to Parcel 2. Each chart carries one line per
//! parcel plus the parcel's mean over the plotted rows.

use crate::ingest::types::{Dataset, Metric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::ops::Range;

/// Which rows the charts plot at a given cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SeriesMode {
    /// Everything from the first row through the current window
    Cumulative,
    /// The last `rows` rows ending with the current window
    Trailing { rows: usize },
}

impl Default for SeriesMode {
    fn default() -> Self {
        SeriesMode::Cumulative
    }
}

impl SeriesMode {
    /// Dataset rows plotted when the window starts at `cursor`.
    pub fn range(&self, cursor: usize, len: usize) -> Range<usize> {
        let end = (cursor + crate::core::feed::WINDOW_SIZE).min(len);
        match self {
            SeriesMode::Cumulative => 0..end,
            SeriesMode::Trailing { rows } => end.saturating_sub(*rows)..end,
        }
    }
}

/// 1 for even rows, 2 for odd rows.
pub fn parcel_for_row(index: usize) -> u8 {
    if index % 2 == 0 {
        1
    } else {
        2
    }
}

/// One point of a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A parcel's line on one chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelSeries {
    pub parcel: u8,
    pub name: String,
    pub points: Vec<SeriesPoint>,
    /// Mean over the plotted points, `None` when there are none
    pub mean: Option<f64>,
}

/// Data for one metric chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricChart {
    pub metric: Metric,
    pub title: String,
    pub unit: String,
    pub axis_label: String,
    pub series: Vec<ParcelSeries>,
}

impl MetricChart {
    pub fn series_for(&self, parcel: u8) -> Option<&ParcelSeries> {
        self.series.iter().find(|s| s.parcel == parcel)
    }
}

/// Build one chart per metric for the window at `cursor`.
pub fn build_charts(dataset: &Dataset, cursor: usize, mode: SeriesMode) -> Vec<MetricChart> {
    let range = mode.range(cursor, dataset.len());
    Metric::ALL
        .into_iter()
        .map(|metric| build_chart(dataset, range.clone(), metric))
        .collect()
}

fn build_chart(dataset: &Dataset, range: Range<usize>, metric: Metric) -> MetricChart {
    let series = [1u8, 2]
        .into_iter()
        .map(|parcel| {
            let points: Vec<SeriesPoint> = range
                .clone()
                .filter(|&i| parcel_for_row(i) == parcel)
                .filter_map(|i| dataset.get(i))
                .map(|r| SeriesPoint {
                    timestamp: r.timestamp(),
                    value: r.features().value(metric),
                })
                .collect();
            let mean = if points.is_empty() {
                None
            } else {
                Some(points.iter().map(|p| p.value).mean())
            };
            ParcelSeries {
                parcel,
                name: format!("Parcel {parcel}"),
                points,
                mean,
            }
        })
        .collect();

    MetricChart {
        metric,
        title: metric.title().to_string(),
        unit: metric.unit().to_string(),
        axis_label: metric.axis_label(),
        series,
    }
}
