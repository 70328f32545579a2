//! Session state: the uploaded dataset and the feed cursor.
//!
//! A session starts in [`SessionState::NoInput`] and does no classification,
//! windowing or cursor movement until a file is accepted. Every accepted
//! upload replaces the dataset and puts the cursor back at the start. A tick
//! renders the current window first and moves the cursor afterwards.

use crate::activity::SharedActivityLog;
use crate::core::feed::{Cursor, FeedError};
use crate::core::frame::{Frame, FrameBuilder};
use crate::ingest::parser::{parse, IngestionError};
use crate::ingest::types::Dataset;
use crate::model::PumpClassifier;
use chrono::{DateTime, Utc};
use std::io::Read;
use std::sync::Arc;
use uuid::Uuid;

/// Whether the session has data to show.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Waiting for a file
    NoInput,
    /// A labeled dataset and the cursor into it
    Ready { dataset: Dataset, cursor: Cursor },
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Nothing uploaded yet; no work was done
    NoInput,
    /// The frame rendered for the pre-advance cursor
    Rendered(Frame),
}

/// One monitoring session.
pub struct Session {
    id: String,
    classifier: Arc<PumpClassifier>,
    activity: SharedActivityLog,
    state: SessionState,
    last_frame: Option<Frame>,
}

impl Session {
    /// Create a session waiting for input.
    pub fn new(classifier: Arc<PumpClassifier>, activity: SharedActivityLog) -> Self {
        Self {
            id: format!("SESS-{}", Uuid::new_v4()),
            classifier,
            activity,
            state: SessionState::NoInput,
            last_frame: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready { .. })
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        match &self.state {
            SessionState::NoInput => None,
            SessionState::Ready { dataset, .. } => Some(dataset),
        }
    }

    pub fn cursor(&self) -> Option<usize> {
        match &self.state {
            SessionState::NoInput => None,
            SessionState::Ready { cursor, .. } => Some(cursor.position()),
        }
    }

    /// Frame produced by the most recent tick since the last upload.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Ingest a new file. On failure the current dataset is kept.
    pub fn upload<R: Read>(
        &mut self,
        reader: R,
        ingested_at: DateTime<Utc>,
    ) -> Result<usize, IngestionError> {
        let dataset = match parse(reader, &self.classifier, ingested_at) {
            Ok(dataset) => dataset,
            Err(e) => {
                self.activity.record_rejected_upload();
                tracing::warn!(session = %self.id, "Upload rejected: {e}");
                return Err(e);
            }
        };

        let rows = dataset.len();
        self.activity.record_upload(rows as u64);
        tracing::info!(
            session = %self.id,
            "Loaded {} readings ({} with pump on)",
            rows,
            dataset.pump_on_count()
        );

        self.state = SessionState::Ready {
            dataset,
            cursor: Cursor::new(),
        };
        self.last_frame = None;
        Ok(rows)
    }

    /// Drop the dataset and wait for a new file.
    pub fn clear(&mut self) {
        self.state = SessionState::NoInput;
        self.last_frame = None;
    }

    /// Render the current window, then advance the cursor.
    ///
    /// If the cursor no longer addresses a full window the error is returned
    /// and the cursor restarts from the beginning.
    pub fn tick(&mut self, builder: &FrameBuilder) -> Result<TickOutcome, FeedError> {
        let (dataset, cursor) = match &mut self.state {
            SessionState::NoInput => {
                self.activity.record_idle_tick();
                return Ok(TickOutcome::NoInput);
            }
            SessionState::Ready { dataset, cursor } => (dataset, cursor),
        };

        let frame = match builder.build(&self.id, dataset, cursor.position()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(session = %self.id, "{e}; restarting feed");
                cursor.reset();
                return Err(e);
            }
        };

        cursor.advance(dataset.len());
        self.activity.record_tick();
        tracing::debug!(
            session = %self.id,
            "Rendered window at {}, next cursor {}",
            frame.cursor,
            cursor.position()
        );

        self.last_frame = Some(frame.clone());
        Ok(TickOutcome::Rendered(frame))
    }

    /// Render the current window without advancing.
    pub fn peek(&self, builder: &FrameBuilder) -> Result<TickOutcome, FeedError> {
        match &self.state {
            SessionState::NoInput => Ok(TickOutcome::NoInput),
            SessionState::Ready { dataset, cursor } => builder
                .build(&self.id, dataset, cursor.position())
                .map(TickOutcome::Rendered),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLog;
    use crate::ingest::types::Features;

    const FOUR_ROWS: &str = "Soil Moisture,Temperature,Air Humidity\n\
                             12,21,51\n\
                             490,34,79\n\
                             15,20,49\n\
                             505,36,81\n";

    fn session() -> Session {
        let classifier = PumpClassifier::train(
            &[Features::new(10.0, 20.0, 50.0), Features::new(500.0, 35.0, 80.0)],
            &[0, 1],
        )
        .unwrap();
        Session::new(Arc::new(classifier), ActivityLog::shared())
    }

    #[test]
    fn test_no_input_does_nothing() {
        let mut session = session();
        let builder = FrameBuilder::default();

        assert!(matches!(session.tick(&builder), Ok(TickOutcome::NoInput)));
        assert!(matches!(session.peek(&builder), Ok(TickOutcome::NoInput)));
        assert!(session.cursor().is_none());

        let stats = session.activity.stats();
        assert_eq!(stats.predictions, 0);
        assert_eq!(stats.ticks_idle, 1);
    }

    #[test]
    fn test_render_then_advance() {
        let mut session = session();
        let builder = FrameBuilder::default();
        assert_eq!(session.upload(FOUR_ROWS.as_bytes(), Utc::now()).unwrap(), 4);

        let TickOutcome::Rendered(frame) = session.tick(&builder).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.cursor, 0);
        assert_eq!(session.cursor(), Some(2));

        let TickOutcome::Rendered(frame) = session.tick(&builder).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.cursor, 2);
        assert_eq!(frame.parcels[1].irrigation, "On");
        assert_eq!(session.cursor(), Some(0));
        assert_eq!(session.last_frame().unwrap().cursor, 2);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut session = session();
        let builder = FrameBuilder::default();
        session.upload(FOUR_ROWS.as_bytes(), Utc::now()).unwrap();

        session.peek(&builder).unwrap();
        session.peek(&builder).unwrap();
        assert_eq!(session.cursor(), Some(0));
    }

    #[test]
    fn test_upload_resets_cursor() {
        let mut session = session();
        let builder = FrameBuilder::default();
        session.upload(FOUR_ROWS.as_bytes(), Utc::now()).unwrap();
        session.tick(&builder).unwrap();
        assert_eq!(session.cursor(), Some(2));

        session.upload(FOUR_ROWS.as_bytes(), Utc::now()).unwrap();
        assert_eq!(session.cursor(), Some(0));
        assert!(session.last_frame().is_none());
        assert_eq!(session.activity.stats().predictions, 8);
    }

    #[test]
    fn test_rejected_upload_keeps_dataset() {
        let mut session = session();
        let builder = FrameBuilder::default();
        session.upload(FOUR_ROWS.as_bytes(), Utc::now()).unwrap();
        session.tick(&builder).unwrap();

        let bad = "Soil Moisture,Temperature\n1,2\n3,4\n";
        assert!(matches!(
            session.upload(bad.as_bytes(), Utc::now()),
            Err(IngestionError::MissingColumn(_))
        ));
        assert_eq!(session.cursor(), Some(2));
        assert_eq!(session.dataset().unwrap().len(), 4);
        assert_eq!(session.activity.stats().uploads_rejected, 1);
    }

    #[test]
    fn test_clear_returns_to_no_input() {
        let mut session = session();
        session.upload(FOUR_ROWS.as_bytes(), Utc::now()).unwrap();
        session.clear();
        assert!(!session.is_ready());
        assert!(session.dataset().is_none());
    }
}
