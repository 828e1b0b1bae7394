//! HTTP middleware: push-delivery authentication.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::state::AppState;

/// Authenticate a push delivery before its body is handed to the writer.
///
/// On success the verified claims are attached to the request extensions.
/// Any failure is a 400 so the delivery infrastructure does not redeliver.
pub(crate) async fn push_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default());

    match state.authenticator.authenticate(header).await {
        Ok(claims) => {
            tracing::debug!(subject = %claims.subject, issuer = %claims.issuer, "push delivery authenticated");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(code = err.code(), error = %err, "push delivery rejected");
            super::invalid_token(&err).into_response()
        }
    }
}
