// Crate-level lint configuration for pedantic clippy
#![allow(clippy::must_use_candidate)] // Server handlers don't need must_use
#![allow(clippy::missing_errors_doc)] // Handlers return documented status codes
#![allow(clippy::return_self_not_must_use)] // Builder pattern doesn't need must_use

//! proofserve REST API server
//!
//! Thin HTTP transport over [`proofserve_dispatcher::Dispatcher`]:
//!
//! - `POST /verify` - check a proof, respond with `{task_id, result}`
//! - `POST /score` - extract a proof from a model completion and score it
//! - `GET /health` - 503 while draining or when the checker is unusable
//! - `GET /stats` - dispatcher counters

pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use routes::AppState;
use std::sync::Arc;

/// Build the application router over shared state
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/stats", get(routes::stats))
        .route("/verify", post(routes::verify))
        .route("/score", post(routes::score))
        .with_state(state)
}
