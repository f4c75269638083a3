//! Shared helpers for kbase-api integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use kbase_api::audit::AuditLog;
use kbase_api::config::AppConfig;
use kbase_api::{app, AppState};
use kbase_db::test_fixtures::{test_database, test_database_url};
use kbase_db::{create_lazy_pool, Database, PoolConfig};

/// Configuration from explicit key/value pairs, defaults for the rest.
pub fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(move |key| map.get(key).cloned())
}

/// State over a pool that never connects. Only routes that answer before
/// touching the database can be exercised with it.
pub fn offline_state(pairs: &[(&str, &str)]) -> AppState {
    let config = config_from(pairs);
    let pool = create_lazy_pool(&test_database_url(), PoolConfig::new().min_connections(0))
        .expect("lazy pool");
    let db = Database::new(pool);
    AppState::new(db, config, AuditLog::disabled()).expect("state")
}

pub fn offline_app(pairs: &[(&str, &str)]) -> Router {
    app(offline_state(pairs))
}

/// App over the migrated test database with uploads in `upload_dir`.
pub async fn database_app(upload_dir: &std::path::Path, pairs: &[(&str, &str)]) -> Router {
    audited_database_app(upload_dir, AuditLog::disabled(), pairs).await
}

/// Same as [`database_app`] but recording to `audit`.
pub async fn audited_database_app(
    upload_dir: &std::path::Path,
    audit: AuditLog,
    pairs: &[(&str, &str)],
) -> Router {
    let config = config_from(pairs);
    let db = test_database()
        .await
        .expect("test database")
        .with_filesystem_storage(upload_dir.to_path_buf(), config.file_rules());
    app(AppState::new(db, config, audit).expect("state"))
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("infallible router")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(
        app,
        Request::get(uri).body(Body::empty()).expect("request"),
    )
    .await
}

/// JSON request as `user`.
pub fn json_request(method: &str, uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Bodiless request as `user`.
pub fn user_request(method: &str, uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user)
        .body(Body::empty())
        .expect("request")
}

/// Multipart body with one `file` part per `(filename, bytes)`.
pub fn multipart_request(uri: &str, user: &str, files: &[(&str, &[u8])]) -> Request<Body> {
    let boundary = "kbase-test-boundary";
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .header("content-length", body.len())
        .header("x-user-id", user)
        .body(Body::from(body))
        .expect("request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
