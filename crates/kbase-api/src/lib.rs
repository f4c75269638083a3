//! kbase-api - HTTP API server for the kbase knowledge base
//!
//! The router, shared state and error type live here so the server binary,
//! the maintenance binary and the integration tests build the same app.

pub mod audit;
pub mod config;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod query_types;
pub mod services;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::error;
use uuid::Uuid;

use kbase_core::defaults::CORS_MAX_AGE_SECS;
use kbase_core::IdentityConfig;
use kbase_db::{Database, FileStorage};

use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::handlers::{admin, articles, attachments, comments, likes, public_api};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    /// Header name, fallback identity and pattern for `CurrentUser`.
    pub identity: Arc<IdentityConfig>,
    pub audit: AuditLog,
}

impl AppState {
    /// Fails if the configured user id pattern does not compile.
    pub fn new(db: Database, config: AppConfig, audit: AuditLog) -> kbase_core::Result<Self> {
        let identity = config.identity()?;
        Ok(Self {
            db,
            config: Arc::new(config),
            identity: Arc::new(identity),
            audit,
        })
    }

    /// Attachment storage, or a 500 if the server was started without it.
    pub fn storage(&self) -> Result<&FileStorage, ApiError> {
        Ok(self.db.file_storage()?)
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the full router with middleware.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    let api_v1 = Router::new()
        .route("/articles/latest", get(public_api::latest_articles))
        .route("/articles/popular", get(public_api::popular_articles))
        .route("/articles/:id", get(public_api::get_article))
        .route("/tags", get(public_api::list_tags))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key::require_api_key,
        ))
        .route("/health", get(public_api::health));

    // Shares the /api/v1 key; open when no key is set. A cleanup run is
    // idempotent and only removes what the retention windows allow.
    let admin_routes = Router::new()
        .route("/cleanup", post(admin::run_cleanup_now))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key::require_api_key,
        ));

    Router::new()
        .route("/health", get(health_check))
        // Articles
        .route(
            "/articles",
            get(articles::list_articles).post(articles::create_article),
        )
        .route("/drafts", get(articles::list_drafts))
        .route(
            "/articles/:id",
            get(articles::get_article)
                .put(articles::update_article)
                .delete(articles::delete_article),
        )
        // Comments and likes
        .route("/articles/:id/comments", post(comments::create_comment))
        .route("/comments/:id", delete(comments::delete_comment))
        .route("/articles/:id/like", post(likes::toggle_article_like))
        .route("/comments/:id/like", post(likes::toggle_comment_like))
        // Attachments
        .route(
            "/articles/:id/attachments",
            post(attachments::upload_to_article),
        )
        .route("/uploads", post(attachments::upload_pending))
        .route("/attachments/:id/download", get(attachments::download))
        .route("/attachments/:id", delete(attachments::delete_attachment))
        .nest("/api/v1", api_v1)
        .nest("/admin", admin_routes)
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(&config))
        .layer(DefaultBodyLimit::max(config.body_limit()))
        .layer(RequestBodyLimitLayer::new(config.body_limit()))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let mut allowed_headers = vec![header::CONTENT_TYPE, header::ACCEPT];
    for name in [&config.user_id_header_name, &config.api_key_header_name] {
        match HeaderName::from_bytes(name.as_bytes()) {
            Ok(h) => allowed_headers.push(h),
            Err(e) => tracing::warn!("Invalid header name '{}' for CORS: {}", name, e),
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.cors_origins()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(allowed_headers)
        .allow_credentials(true)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Database(kbase_core::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    PayloadTooLarge(String),
}

impl From<kbase_core::Error> for ApiError {
    fn from(err: kbase_core::Error) -> Self {
        use kbase_core::Error;

        if err.is_unique_violation() {
            return ApiError::Conflict(err.to_string());
        }
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            Error::Forbidden(msg) => ApiError::Forbidden(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Database(other),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(format!("Failed to read upload: {}", err.body_text()))
        }
    }
}

impl ApiError {
    /// Status code and client-facing message.
    pub fn into_parts(self) -> (StatusCode, String) {
        match self {
            ApiError::Database(err) => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = self.into_parts();

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
