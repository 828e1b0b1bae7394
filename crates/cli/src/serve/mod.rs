//! `timeline serve` -- HTTP endpoint for push deliveries.
//!
//! Endpoints:
//! - GET  /        - Liveness check (unauthenticated)
//! - POST /writer  - Authenticated push delivery; upserts one timeline entry
//!
//! Status codes double as delivery acknowledgements: 200 acks the message,
//! 400 drops it as undeliverable, 5xx asks the push infrastructure to
//! redeliver later.

mod handlers;
mod middleware;
mod state;

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use timeline_core::{JwksVerifier, PushAuthenticator, TimelineWriter};
use timeline_storage::{DocumentStore, FirestoreStore, InMemoryDocumentStore};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use self::handlers::{handle_health, handle_not_found, handle_writer};
use self::middleware::push_auth_middleware;
use self::state::AppState;
use crate::config::{ConfigError, ServiceConfig, StoreBackend};

/// Maximum request body size: 1 MiB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// 400 response for deliveries that will never succeed.
fn invalid_token(detail: &dyn Display) -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, format!("Invalid token: {}", detail))
}

/// 500 response for deliveries worth retrying.
fn internal_error(detail: &dyn Display) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("An internal error occurred: {}", detail),
    )
}

fn build_state(config: &ServiceConfig) -> Result<Arc<AppState>, ConfigError> {
    let store: Arc<dyn DocumentStore> = match config.store {
        StoreBackend::Firestore => Arc::new(FirestoreStore::new(config.firestore()?)),
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; timeline entries are lost on restart");
            Arc::new(InMemoryDocumentStore::new())
        }
    };
    let verifier = Arc::new(JwksVerifier::new(config.key_source()));

    Ok(Arc::new(AppState {
        authenticator: PushAuthenticator::new(
            verifier,
            config.token_audience.clone(),
            config.admin_uid.clone(),
        ),
        writer: TimelineWriter::new(store).with_write_timeout(config.write_timeout),
    }))
}

fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    // route_layer keeps unmatched methods on /writer a plain 405.
    let writer = Router::new()
        .route("/writer", post(handle_writer))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            push_auth_middleware,
        ));

    Router::new()
        .route("/", get(handle_health))
        .merge(writer)
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        // 503, not 408: a request that ran out of time should be redelivered.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::SERVICE_UNAVAILABLE,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C or SIGTERM.
pub async fn start_server(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config)?;
    let app = build_router(state, config.request_timeout);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        store = ?config.store,
        audience = %config.token_audience,
        "timeline writer listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("received shutdown signal, draining connections");
}
