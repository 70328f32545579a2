//! HTTP server for the dashboard feed.
//!
//! This module provides an HTTP server that:
//! - Accepts sensor files via POST /upload and labels them
//! - Ticks the feed on a fixed interval (render, then advance)
//! - Serves the latest frame via GET /frame for the presentation layer
//!
//! # Architecture
//!
//! ```text
//! CSV upload ──→ POST /upload ──→ Session ←── tick task (every 6s)
//!                                    │
//!                                    ▼
//!                   Dashboard ←── GET /frame
//! ```

use crate::activity::{ActivityStats, SharedActivityLog};
use crate::config::{ParcelConfig, DEFAULT_MAX_UPLOAD_BYTES};
use crate::core::{FeedError, Frame, FrameBuilder, SeriesMode};
use crate::ingest::{Features, IngestionError};
use crate::model::PumpClassifier;
use crate::session::{Session, TickOutcome};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Interval between feed ticks
    pub tick_interval: Duration,
    /// Rows plotted by the charts
    pub series_mode: SeriesMode,
    /// Parcel layout for frames
    pub parcels: Vec<ParcelConfig>,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, tick_interval: Duration) -> Self {
        Self {
            port,
            tick_interval,
            series_mode: SeriesMode::default(),
            parcels: ParcelConfig::defaults(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_series_mode(mut self, series_mode: SeriesMode) -> Self {
        self.series_mode = series_mode;
        self
    }

    pub fn with_parcels(mut self, parcels: Vec<ParcelConfig>) -> Self {
        self.parcels = parcels;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Shared server state
pub struct ServerState {
    /// The single monitoring session; one writer per tick or upload
    session: RwLock<Session>,
    /// Frame builder
    builder: FrameBuilder,
    /// Classifier for ad-hoc predictions
    classifier: Arc<PumpClassifier>,
    /// Activity counters
    activity: SharedActivityLog,
}

impl ServerState {
    /// Create new server state
    pub fn new(
        config: &ServerConfig,
        classifier: Arc<PumpClassifier>,
        activity: SharedActivityLog,
    ) -> Self {
        Self {
            session: RwLock::new(Session::new(classifier.clone(), activity.clone())),
            builder: FrameBuilder::new(config.parcels.clone(), config.series_mode),
            classifier,
            activity,
        }
    }

    /// Run one render-then-advance cycle.
    pub async fn tick(&self) {
        let mut session = self.session.write().await;
        match session.tick(&self.builder) {
            Ok(TickOutcome::Rendered(frame)) => {
                tracing::debug!(
                    "Tick rendered rows {}-{} ({} pump(s) on)",
                    frame.cursor,
                    frame.cursor + 1,
                    frame.pumps_on()
                );
            }
            Ok(TickOutcome::NoInput) => {
                tracing::debug!("Tick skipped: no input uploaded");
            }
            Err(e) => {
                tracing::warn!("Tick failed: {}", e);
            }
        }
    }
}

/// Response from upload endpoint
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub session_id: String,
    pub rows: usize,
    pub pumps_on: usize,
}

/// Session summary
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub session_id: String,
    /// "no_input" or "ready"
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_len: Option<usize>,
    pub tick_interval_secs: u64,
    pub activity: ActivityStats,
}

/// Prediction request
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub soil_moisture: f64,
    pub temperature: f64,
    pub air_humidity: f64,
}

/// Prediction response
#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub pump_data: u8,
    pub irrigation: String,
    pub probability: f64,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

fn ingestion_error(e: IngestionError) -> ApiError {
    api_error(StatusCode::UNPROCESSABLE_ENTITY, e.code(), &e)
}

/// The body never reached the parser: too large or not readable.
fn body_rejection(rejection: BytesRejection) -> ApiError {
    let status = rejection.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "FILE_TOO_LARGE"
    } else {
        "INVALID_BODY"
    };
    api_error(status, code, rejection.body_text())
}

fn feed_error(e: FeedError) -> ApiError {
    api_error(StatusCode::CONFLICT, "OUT_OF_RANGE", &e)
}

fn no_input() -> ApiError {
    api_error(
        StatusCode::CONFLICT,
        "NO_INPUT",
        "Please upload a CSV file.",
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /upload
///
/// Accepts a CSV body, labels every row and restarts the feed. The body is
/// handed to the parser as raw bytes so encoding problems surface as
/// ingestion errors.
async fn upload(
    State(state): State<Arc<ServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let body = body.map_err(|rejection| {
        state.activity.record_rejected_upload();
        body_rejection(rejection)
    })?;

    let mut session = state.session.write().await;
    let rows = session
        .upload(&body[..], Utc::now())
        .map_err(ingestion_error)?;

    let pumps_on = session.dataset().map(|d| d.pump_on_count()).unwrap_or(0);
    Ok(Json(UploadResponse {
        status: "ok".to_string(),
        session_id: session.id().to_string(),
        rows,
        pumps_on,
    }))
}

/// DELETE /upload
///
/// Drops the current dataset; the feed waits for a new file.
async fn clear(
    State(state): State<Arc<ServerState>>,
    State(tick_interval): State<TickInterval>,
) -> Json<StatusResponse> {
    let mut session = state.session.write().await;
    session.clear();
    tracing::info!(session = %session.id(), "Dataset cleared");
    Json(status_response(&session, &state.activity, tick_interval))
}

/// GET /frame
///
/// The frame rendered by the latest tick. Before the first tick after an
/// upload, the window the next tick will render.
async fn frame(State(state): State<Arc<ServerState>>) -> Result<Json<Frame>, ApiError> {
    let session = state.session.read().await;
    if let Some(frame) = session.last_frame() {
        return Ok(Json(frame.clone()));
    }

    match session.peek(&state.builder).map_err(feed_error)? {
        TickOutcome::Rendered(frame) => Ok(Json(frame)),
        TickOutcome::NoInput => Err(no_input()),
    }
}

/// GET /status
async fn status(
    State(state): State<Arc<ServerState>>,
    State(tick_interval): State<TickInterval>,
) -> Json<StatusResponse> {
    let session = state.session.read().await;
    Json(status_response(&session, &state.activity, tick_interval))
}

fn status_response(
    session: &Session,
    activity: &SharedActivityLog,
    tick_interval: TickInterval,
) -> StatusResponse {
    StatusResponse {
        session_id: session.id().to_string(),
        state: if session.is_ready() { "ready" } else { "no_input" }.to_string(),
        cursor: session.cursor(),
        dataset_len: session.dataset().map(|d| d.len()),
        tick_interval_secs: tick_interval.0.as_secs(),
        activity: activity.stats(),
    }
}

/// POST /predict
async fn predict(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let features = Features::new(
        request.soil_moisture,
        request.temperature,
        request.air_humidity,
    );
    if let Some(metric) = features.first_non_finite() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_FEATURES",
            format!("'{}' is not a finite number", metric.column()),
        ));
    }

    let pump_state = state
        .classifier
        .predict_state(&features)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "LABEL_MAPPING", e))?;
    state.activity.record_prediction();

    Ok(Json(PredictResponse {
        pump_data: pump_state.label(),
        irrigation: pump_state.as_str().to_string(),
        probability: state.classifier.pump_probability(&features),
    }))
}

/// Tick interval exposed to handlers.
#[derive(Debug, Clone, Copy)]
struct TickInterval(Duration);

/// Router state: shared server state plus static settings.
#[derive(Clone)]
struct AppState {
    server: Arc<ServerState>,
    tick_interval: TickInterval,
}

impl axum::extract::FromRef<AppState> for Arc<ServerState> {
    fn from_ref(app: &AppState) -> Self {
        app.server.clone()
    }
}

impl axum::extract::FromRef<AppState> for TickInterval {
    fn from_ref(app: &AppState) -> Self {
        app.tick_interval
    }
}

/// Build the router for the given state.
pub fn router(state: Arc<ServerState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/upload",
            post(upload)
                .delete(clear)
                .layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/frame", get(frame))
        .route("/status", get(status))
        .route("/predict", post(predict))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(AppState {
            server: state,
            tick_interval: TickInterval(config.tick_interval),
        })
}

/// Run the HTTP server and the tick task
pub async fn run(
    config: ServerConfig,
    classifier: Arc<PumpClassifier>,
    activity: SharedActivityLog,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config, classifier, activity));
    let app = router(state.clone(), &config);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Irrigation monitor listening on http://{}", actual_addr);

    // One cycle at a time; a slow cycle delays the next instead of queuing.
    let tick_interval = config.tick_interval;
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            state.tick().await;
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                ticker.abort();
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
