//! Verification and scoring handlers

use axum::{extract::State, http::StatusCode, Json};
use proofserve_dispatcher::{DispatchError, VerificationRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::types::{ErrorResponse, ScoreRequest, ScoreResponse, VerifyRequest, VerifyResponse};
use super::{AppState, ShutdownState};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn dispatch_error(err: &DispatchError) -> ApiError {
    let status = match err {
        DispatchError::QueueFull { .. } | DispatchError::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        DispatchError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::Store(_) | DispatchError::Log(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::from(err)))
}

fn ensure_running(state: &AppState) -> Result<(), ApiError> {
    match state.get_shutdown_state() {
        ShutdownState::Running => Ok(()),
        _ => Err(dispatch_error(&DispatchError::ShuttingDown)),
    }
}

fn parse_timeout(secs: Option<f64>) -> Result<Option<Duration>, ApiError> {
    let Some(secs) = secs else {
        return Ok(None);
    };
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(Some(timeout)),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("invalid_timeout")
                    .with_details(format!("timeout must be a positive number of seconds, got {secs}")),
            ),
        )),
    }
}

/// POST /verify - check one proof against its statement
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    ensure_running(&state)?;

    let mut request = VerificationRequest::new(req.code, req.formal_statement);
    request.timeout = parse_timeout(req.timeout)?;
    request.checker_path = req.lake_path;
    request.workspace_path = req.lean_workspace;

    let (task_id, result) = state
        .dispatcher
        .submit_with_id(request)
        .await
        .map_err(|e| dispatch_error(&e))?;

    info!(
        task_id = %task_id,
        outcome = result.outcome_label(),
        "Verify request served"
    );
    Ok(Json(VerifyResponse { task_id, result }))
}

/// POST /score - extract a proof from a model completion and score it
pub async fn score(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    ensure_running(&state)?;

    let reward = state
        .reward
        .score(&state.dispatcher, &req.completion, &req.formal_statement)
        .await
        .map_err(|e| dispatch_error(&e))?;

    Ok(Json(ScoreResponse {
        score: reward.score,
        proof: reward.proof,
        result: reward.verdict,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofserve_dispatcher::JobId;

    #[test]
    fn test_dispatch_error_status_codes() {
        let (status, body) = dispatch_error(&DispatchError::QueueFull { capacity: 4 });
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.error, "queue_full");

        let (status, body) = dispatch_error(&DispatchError::ShuttingDown);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.error, "shutting_down");

        let (status, _) = dispatch_error(&DispatchError::DeadlineExceeded {
            id: JobId(3),
            waited: Duration::from_secs(1),
        });
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(None).unwrap(), None);
        assert_eq!(
            parse_timeout(Some(1.5)).unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert!(parse_timeout(Some(0.0)).is_err());
        assert!(parse_timeout(Some(-3.0)).is_err());
        assert!(parse_timeout(Some(f64::NAN)).is_err());
        assert!(parse_timeout(Some(f64::INFINITY)).is_err());
        // Finite but past what a Duration can hold
        assert!(parse_timeout(Some(1e30)).is_err());
    }
}
