//! Health and statistics routes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::types::{HealthResponse, StatsResponse};
use super::{AppState, ShutdownState};

impl HealthResponse {
    /// Combine the server lifecycle with the checker probe
    pub async fn from_state(state: &AppState) -> Self {
        let shutdown_state = state.get_shutdown_state();
        let checker = state.dispatcher.health_check().await;
        let (status, ready) = match shutdown_state {
            ShutdownState::Running if checker.is_healthy() => ("healthy", true),
            ShutdownState::Running => ("degraded", false),
            ShutdownState::Draining => ("draining", false),
            ShutdownState::ShuttingDown => ("unhealthy", false),
        };
        Self {
            status: status.to_string(),
            shutdown_state: shutdown_state.as_str().to_string(),
            checker,
            ready,
        }
    }
}

/// GET /health
///
/// 200 when accepting work, 503 while draining, shutting down, or when the
/// checker installation is unusable.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = HealthResponse::from_state(&state).await;
    let status_code = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response))
}

/// GET /stats - queue, pool and store counters
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        dispatcher: state.dispatcher.stats(),
        uptime_secs: state.uptime_secs(),
    })
}
