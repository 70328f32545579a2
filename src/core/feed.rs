//! Rotating window over a labeled dataset.
//!
//! The feed shows two consecutive readings at a time. Each tick moves the
//! cursor forward by two and wraps back to the start once the next window
//! would run past the end of the dataset.

use crate::ingest::types::{Dataset, LabeledReading};
use serde::{Deserialize, Serialize};

/// Readings shown per window (one per parcel).
pub const WINDOW_SIZE: usize = 2;

/// Window selection errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The cursor no longer addresses a full window
    OutOfRange { cursor: usize, len: usize },
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::OutOfRange { cursor, len } => write!(
                f,
                "Window at cursor {cursor} needs rows {cursor} and {} but the dataset has {len}",
                cursor + 1
            ),
        }
    }
}

impl std::error::Error for FeedError {}

/// The two readings at `cursor` and `cursor + 1`.
pub fn current_window(
    dataset: &Dataset,
    cursor: usize,
) -> Result<(&LabeledReading, &LabeledReading), FeedError> {
    let out_of_range = FeedError::OutOfRange {
        cursor,
        len: dataset.len(),
    };
    let first = dataset.get(cursor).ok_or_else(|| out_of_range.clone())?;
    let second = dataset.get(cursor + 1).ok_or(out_of_range)?;
    Ok((first, second))
}

/// Next cursor position: `cursor + 2` while it stays in range, else `0`.
pub fn advance(cursor: usize, len: usize) -> usize {
    let next = cursor + WINDOW_SIZE;
    if next < len {
        next
    } else {
        0
    }
}

/// Cursor state owned by a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    /// A cursor at the start of the dataset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to the next window of a dataset with `len` readings.
    pub fn advance(&mut self, len: usize) {
        self.position = advance(self.position, len);
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Window addressed by this cursor.
    pub fn window<'a>(
        &self,
        dataset: &'a Dataset,
    ) -> Result<(&'a LabeledReading, &'a LabeledReading), FeedError> {
        current_window(dataset, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{Features, Reading};
    use crate::model::PumpState;
    use chrono::Utc;

    fn dataset(n: usize) -> Dataset {
        let now = Utc::now();
        let readings = (0..n)
            .map(|i| LabeledReading {
                reading: Reading::new(
                    Features::new(i as f64, 20.0, 50.0),
                    now + chrono::Duration::minutes(i as i64),
                ),
                pump_state: PumpState::Off,
            })
            .collect();
        Dataset::new(readings, now)
    }

    #[test]
    fn test_advance_wraps() {
        assert_eq!(advance(0, 4), 2);
        assert_eq!(advance(2, 4), 0);
        assert_eq!(advance(0, 2), 0);
        assert_eq!(advance(4, 6), 0);
    }

    #[test]
    fn test_advance_visits_every_even_position() {
        for n in (2..=40usize).step_by(2) {
            let mut cursor = 0;
            let mut visited = vec![cursor];
            for _ in 0..n.div_ceil(2) {
                cursor = advance(cursor, n);
                assert!(cursor + 1 < n, "cursor {cursor} out of range for {n}");
                if cursor == 0 {
                    break;
                }
                visited.push(cursor);
            }
            assert_eq!(cursor, 0, "no wrap within ceil(n/2) steps for {n}");
            assert_eq!(visited, (0..n).step_by(2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_current_window() {
        let data = dataset(4);
        let (first, second) = current_window(&data, 2).unwrap();
        assert_eq!(first.features().soil_moisture, 2.0);
        assert_eq!(second.features().soil_moisture, 3.0);
    }

    #[test]
    fn test_current_window_out_of_range() {
        let data = dataset(3);
        assert_eq!(
            current_window(&data, 2).unwrap_err(),
            FeedError::OutOfRange { cursor: 2, len: 3 }
        );
        // three rows: 0 -> 2 is a legal advance but the window is incomplete
        assert_eq!(advance(0, 3), 2);
        assert!(current_window(&data, advance(0, 3)).is_err());
    }

    #[test]
    fn test_cursor_state() {
        let data = dataset(6);
        let mut cursor = Cursor::new();
        assert_eq!(cursor.position(), 0);

        cursor.advance(data.len());
        cursor.advance(data.len());
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.window(&data).unwrap().0.features().soil_moisture, 4.0);

        cursor.advance(data.len());
        assert_eq!(cursor.position(), 0);

        cursor.advance(data.len());
        cursor.reset();
        assert_eq!(cursor.position(), 0);
    }
}
