use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::broadcast::{serve_socket, Broadcaster};
use crate::alerts::{Alert, AlertEngine};
use crate::metrics::{MetricsSnapshot, MetricsStore};
use crate::monitor::{EngineState, MonitoringEngine};
use crate::probe::{ConnectionHealth, LagMeasurement};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<MetricsStore>,
    pub alerts: Arc<AlertEngine>,
    pub engine: Arc<MonitoringEngine>,
    pub broadcaster: Arc<Broadcaster>,
    /// Default page size for the alert history endpoint
    pub alert_history_limit: usize,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub engine: EngineState,
    pub total_pairs: usize,
    pub connected_pairs: usize,
    pub connection_status: BTreeMap<String, ConnectionHealth>,
    pub last_updated: DateTime<Utc>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.store.snapshot();
    let connected_pairs = snapshot
        .connection_status
        .values()
        .filter(|h| h.both_connected())
        .count();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        engine: state.engine.state(),
        total_pairs: state.engine.pair_count(),
        connected_pairs,
        connection_status: snapshot.connection_status,
        last_updated: snapshot.last_updated,
    })
}

// ============================================================================
// Metrics
// ============================================================================

/// Current metrics snapshot
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.store.snapshot())
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub minutes: Option<u64>,
    pub pair: Option<String>,
}

/// Lag history, optionally for one pair
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<LagMeasurement>>, ApiError> {
    let minutes = params.minutes.unwrap_or(60);
    if minutes == 0 {
        return Err(ApiError::BadRequest("minutes must be positive".into()));
    }
    let window = Duration::from_secs(minutes.saturating_mul(60));

    let entries = match params.pair {
        Some(pair) => {
            if !state.engine.pair_names().contains(&pair) {
                return Err(ApiError::NotFound(format!("unknown database pair: {}", pair)));
            }
            state.store.pair_history(&pair, window)
        }
        None => state.store.history(window),
    };

    Ok(Json(entries))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
pub struct AlertsParams {
    pub limit: Option<usize>,
}

/// Alert history, newest first
pub async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsParams>,
) -> Json<Vec<Alert>> {
    let limit = params.limit.unwrap_or(state.alert_history_limit);
    Json(state.alerts.get_history(limit))
}

/// Currently open alerts
pub async fn active_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<Alert>> {
    Json(state.alerts.get_active())
}

// ============================================================================
// WebSocket
// ============================================================================

/// Upgrade to the live update socket
pub async fn websocket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let broadcaster = Arc::clone(&state.broadcaster);
    ws.on_upgrade(move |socket| serve_socket(socket, broadcaster))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
