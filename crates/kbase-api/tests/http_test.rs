//! Router behaviour that does not need a database: health, API key gate,
//! request ids, CORS, body limits and identity resolution.

mod common;

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::{Request, StatusCode};
use uuid::Uuid;

use common::{body_json, get, offline_app, offline_state, send};
use kbase_api::audit::AuditLog;
use kbase_api::extractors::CurrentUser;
use kbase_api::AppState;

#[tokio::test]
async fn test_health_reports_version() {
    let response = get(offline_app(&[]), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_api_health_is_open_even_with_key() {
    let app = offline_app(&[("API_KEY", "secret"), ("SYSTEM_TITLE", "Team Wiki")]);
    let response = get(app, "/api/v1/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["message"], "Team Wiki API is running");
}

#[tokio::test]
async fn test_missing_api_key_is_401() {
    let app = offline_app(&[("API_KEY", "secret")]);
    let response = get(app, "/api/v1/tags").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
    assert!(json["message"].as_str().unwrap().contains("X-API-Key"));
}

#[tokio::test]
async fn test_wrong_api_key_is_403() {
    let app = offline_app(&[("API_KEY", "secret")]);
    let request = Request::get("/api/v1/articles/latest")
        .header("x-api-key", "guess")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn test_admin_cleanup_is_behind_api_key() {
    let app = offline_app(&[("API_KEY", "secret")]);
    let request = Request::post("/admin/cleanup").body(Body::empty()).unwrap();
    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_correct_key_reaches_handler() {
    // The handler rejects the date before any query runs.
    let app = offline_app(&[("API_KEY", "secret")]);
    let request = Request::get("/api/v1/articles/latest?since=yesterday")
        .header("x-api-key", "secret")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
    assert!(json["message"].as_str().unwrap().contains("YYYY-MM-DD"));
}

#[tokio::test]
async fn test_no_key_configured_means_open() {
    let response = get(offline_app(&[]), "/api/v1/articles/latest?since=not-a-date").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_responses_carry_v7_request_id() {
    let response = get(offline_app(&[]), "/health").await;
    let id = response
        .headers()
        .get("x-request-id")
        .expect("x-request-id header")
        .to_str()
        .unwrap();
    let parsed: Uuid = id.parse().unwrap();
    assert_eq!(parsed.get_version_num(), 7);
}

#[tokio::test]
async fn test_incoming_request_id_is_propagated() {
    let request = Request::get("/health")
        .header("x-request-id", "trace-me-123")
        .body(Body::empty())
        .unwrap();
    let response = send(offline_app(&[]), request).await;
    assert_eq!(response.headers()["x-request-id"], "trace-me-123");
}

#[tokio::test]
async fn test_cors_preflight_allows_identity_header() {
    let app = offline_app(&[("ALLOWED_ORIGINS", "https://wiki.example")]);
    let request = Request::options("/articles")
        .header("origin", "https://wiki.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "x-user-id")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://wiki.example"
    );
    let allowed = response.headers()["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("x-user-id"));
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let app = offline_app(&[("MAX_FILE_SIZE_MB", "1")]);
    let big = vec![b'a'; 3 * 1024 * 1024];
    let request = common::multipart_request("/uploads", "alice", &[("big.txt", big.as_slice())]);
    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

async fn resolve(state: &AppState, header: Option<&[u8]>) -> CurrentUser {
    let mut builder = Request::get("/");
    if let Some(value) = header {
        builder = builder.header("x-user-id", value);
    }
    let (mut parts, _) = builder.body(()).unwrap().into_parts();
    match CurrentUser::from_request_parts(&mut parts, state).await {
        Ok(user) => user,
        Err(never) => match never {},
    }
}

#[tokio::test]
async fn test_identity_header_resolution() {
    let state = offline_state(&[]);

    let valid = resolve(&state, Some(&b"alice_01"[..])).await;
    assert!(valid.identity.is_validated());
    assert_eq!(valid.user_id(), "alice_01");

    let missing = resolve(&state, None).await;
    assert_eq!(missing.user_id(), "anonymous");
    assert_eq!(missing.identity.rejected(), None);

    let invalid = resolve(&state, Some(&b"no spaces allowed"[..])).await;
    assert_eq!(invalid.user_id(), "anonymous");
    assert_eq!(invalid.identity.rejected(), Some("no spaces allowed"));

    let binary = resolve(&state, Some(&[0xff_u8, 0xfe, b'a'][..])).await;
    assert_eq!(binary.user_id(), "anonymous");
    assert!(binary.identity.rejected().is_some());
}

#[tokio::test]
async fn test_invalid_identity_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = offline_state(&[]);
    state.audit = AuditLog::open(dir.path(), "audit.log").unwrap();

    resolve(&state, Some(&b"x"[..])).await;
    drop(state);

    let log = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
    assert!(log.contains(" - WARNING - Invalid user ID format: 'x' - Pattern: "));
}
