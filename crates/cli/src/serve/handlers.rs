//! Route handlers: liveness and push-delivery ingestion.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use timeline_core::VerifiedClaims;

use super::state::AppState;
use super::{internal_error, invalid_token};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// GET /
pub(crate) async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "OK!")
}

/// POST /writer
pub(crate) async fn handle_writer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<VerifiedClaims>,
    body: Bytes,
) -> Response {
    match state.writer.ingest(&body).await {
        Ok(receipt) => {
            tracing::info!(
                uid = %receipt.uid,
                activity_id = %receipt.activity_id,
                pushed_by = %claims.subject,
                "timeline write complete"
            );
            (StatusCode::OK, "OK").into_response()
        }
        Err(err) if err.is_retryable() => {
            tracing::error!(code = err.code(), error = %err, "timeline write failed; delivery will be retried");
            internal_error(&err).into_response()
        }
        Err(err) => {
            tracing::warn!(code = err.code(), error = %err, "delivery rejected");
            invalid_token(&err).into_response()
        }
    }
}
