//! REST handlers for operator control
//!
//! Every JSON response is wrapped in [`ApiResponse`].

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::time::Instant;

use crate::metrics;
use crate::notifications::QueueStats;
use crate::scheduler::{MonitorOverrides, MonitorStats, MonitorStatus, SchedulerError};

use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub monitor_running: bool,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub monitor: MonitorStatus,
    /// `None` when the store could not be queried
    pub pending_registrants: Option<usize>,
}

/// Start/restart response
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub room: String,
    pub poll_interval_ms: u64,
    pub auto_registration: bool,
}

fn error_response(err: SchedulerError) -> Response {
    let status = match &err {
        SchedulerError::AlreadyRunning | SchedulerError::NotRunning => StatusCode::CONFLICT,
        SchedulerError::InvalidConfig { .. } | SchedulerError::InvalidTimezone { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Empty body means no overrides
fn parse_overrides(body: &Bytes) -> Result<MonitorOverrides, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(MonitorOverrides::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!("Invalid overrides: {e}"))),
        )
            .into_response()
    })
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/monitor/start", post(start_monitor))
        .route("/api/monitor/stop", post(stop_monitor))
        .route("/api/monitor/restart", post(restart_monitor))
        .route("/api/monitor/refresh", post(refresh_monitor))
        .route("/api/events/stats", get(event_stats))
        .route("/metrics", get(prometheus_metrics))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        monitor_running: state.controller.is_running().await,
    }))
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let monitor = state.controller.status().await;
    let pending_registrants = match state.controller.pending_count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Pending count unavailable");
            None
        }
    };

    Json(ApiResponse::success(StatusResponse {
        monitor,
        pending_registrants,
    }))
}

async fn start_monitor(State(state): State<AppState>, body: Bytes) -> Response {
    let overrides = match parse_overrides(&body) {
        Ok(o) => o,
        Err(response) => return response,
    };

    match state.controller.start(overrides).await {
        Ok(settings) => (
            StatusCode::OK,
            Json(ApiResponse::success(StartResponse {
                room: settings.room,
                poll_interval_ms: settings.poll_interval.as_millis() as u64,
                auto_registration: settings.auto_registration,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn stop_monitor(State(state): State<AppState>) -> Response {
    match state.controller.stop().await {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::<MonitorStats>::success(stats))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn restart_monitor(State(state): State<AppState>, body: Bytes) -> Response {
    let overrides = match parse_overrides(&body) {
        Ok(o) => o,
        Err(response) => return response,
    };

    match state.controller.restart(overrides).await {
        Ok(settings) => (
            StatusCode::OK,
            Json(ApiResponse::success(StartResponse {
                room: settings.room,
                poll_interval_ms: settings.poll_interval.as_millis() as u64,
                auto_registration: settings.auto_registration,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn refresh_monitor(State(state): State<AppState>) -> Response {
    match state.controller.force_refresh().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success("Registrant refresh requested")),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn event_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::<QueueStats>::success(state.controller.events().stats()))
}

async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!("Failed to encode metrics: {e}"))),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
