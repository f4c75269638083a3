//! Shared-secret check for the read-only API.
//!
//! When no `API_KEY` is configured every request passes. Otherwise the
//! configured header must be present (401) and equal to the key (403).

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::handlers::public_api::v1_error;
use crate::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };
    let header_name = state.config.api_key_header_name.as_str();

    let Some(provided) = request.headers().get(header_name) else {
        warn!(
            subsystem = "api",
            component = "api_key",
            path = %request.uri().path(),
            "Request without API key"
        );
        return v1_error(
            StatusCode::UNAUTHORIZED,
            format!("API key required. Send it in the {} header.", header_name),
        );
    };

    if !keys_match(provided.as_bytes(), expected.as_bytes()) {
        warn!(
            subsystem = "api",
            component = "api_key",
            path = %request.uri().path(),
            "Request with invalid API key"
        );
        return v1_error(StatusCode::FORBIDDEN, "Invalid API key".to_string());
    }

    next.run(request).await
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
