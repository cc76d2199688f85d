//! Web server module for handling inbound U7BUY webhooks.
//!
//! This module provides a thin, fast web server that:
//! - Receives webhooks from U7BUY
//! - Verifies the HMAC signature when a secret is configured
//! - Answers `200 OK` immediately
//! - Forwards a summary to Discord in the background

pub mod ack;
pub mod handlers;
pub mod signature;

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

pub use handlers::{health, u7buy_webhook, AppState, HealthResponse};
pub use signature::{
    compute_signature, is_signature_verification_enabled, verify, VerificationResult,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(u7buy_webhook))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn a handler panic into a 500 so the connection is never left hanging.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "request_handler_panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, handlers::INTERNAL_ERROR_BODY).into_response()
}
