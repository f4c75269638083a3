//! End-to-end flows through the router against the test database.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    audited_database_app, body_json, database_app, get, json_request, multipart_request, send,
    user_request,
};
use kbase_api::audit::AuditLog;
use kbase_db::test_fixtures::{unique_tag, unique_user};

async fn create_article(
    app: axum::Router,
    author: &str,
    title: &str,
    tags: &str,
    is_draft: bool,
) -> serde_json::Value {
    let response = send(
        app,
        json_request(
            "POST",
            "/articles",
            author,
            json!({ "title": title, "content": "body text", "tags": tags, "is_draft": is_draft }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_create_edit_delete_permissions() {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir().unwrap();
    let app = database_app(dir.path(), &[]).await;
    let author = unique_user("author");
    let other = unique_user("other");
    let tag = unique_tag("flow");

    let created = create_article(app.clone(), &author, "Flow", &tag, false).await;
    let id = created["article"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["tags"].as_array().unwrap().len(), 1);

    let edit = json!({ "title": "Hijacked", "content": "x" });
    let response = send(
        app.clone(),
        json_request("PUT", &format!("/articles/{}", id), &other, edit.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        app.clone(),
        json_request("PUT", &format!("/articles/{}", id), &author, edit),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["article"]["title"], "Hijacked");

    // Blank tags on edit leave the existing association alone.
    let response = send(
        app.clone(),
        user_request("GET", &format!("/articles/{}", id), &author),
    )
    .await;
    let detail = body_json(response).await;
    assert_eq!(detail["tags"][0]["name"], tag.as_str());

    let response = send(
        app.clone(),
        user_request("DELETE", &format!("/articles/{}", id), &other),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        app.clone(),
        user_request("DELETE", &format!("/articles/{}", id), &author),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(app, &format!("/api/v1/articles/{}", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_drafts_are_private() {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir().unwrap();
    let app = database_app(dir.path(), &[]).await;
    let author = unique_user("drafter");
    let reader = unique_user("reader");

    let created = create_article(app.clone(), &author, "Secret", "", true).await;
    let id = created["article"]["id"].as_str().unwrap().to_string();

    let request = user_request("GET", &format!("/articles/{}", id), &reader);
    assert_eq!(send(app.clone(), request).await.status(), StatusCode::NOT_FOUND);

    let request = user_request("GET", &format!("/articles/{}", id), &author);
    let response = send(app.clone(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["can_edit"], true);

    let response = get(app, &format!("/api/v1/articles/{}", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_like_toggle_and_self_like() {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir().unwrap();
    let app = database_app(dir.path(), &[]).await;
    let author = unique_user("author");
    let fan = unique_user("fan");

    let created = create_article(app.clone(), &author, "Likeable", "", false).await;
    let uri = format!("/articles/{}/like", created["article"]["id"].as_str().unwrap());

    let response = send(app.clone(), user_request("POST", &uri, &author)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(app.clone(), user_request("POST", &uri, &fan)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let liked = body_json(response).await;
    assert_eq!(liked["outcome"], "liked");
    assert_eq!(liked["like_count"], 1);

    let response = send(app, user_request("POST", &uri, &fan)).await;
    let unliked = body_json(response).await;
    assert_eq!(unliked["outcome"], "unliked");
    assert_eq!(unliked["like_count"], 0);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_pending_upload_is_claimed_on_save() {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir().unwrap();
    let app = database_app(dir.path(), &[]).await;
    let author = unique_user("writer");

    let response = send(
        app.clone(),
        multipart_request("/uploads", &author, &[("diagram.png", &b"\x89PNG"[..])]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let upload = body_json(response).await;
    assert!(upload["markdown"].as_str().unwrap().starts_with("![diagram.png]("));

    let created = create_article(app.clone(), &author, "With image", "", false).await;
    assert_eq!(created["claimed_attachments"], 1);

    let response = get(app, upload["url"].as_str().unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_article_upload_reports_rejections() {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir().unwrap();
    let app = database_app(dir.path(), &[]).await;
    let author = unique_user("uploader");

    let created = create_article(app.clone(), &author, "Files", "", false).await;
    let uri = format!(
        "/articles/{}/attachments",
        created["article"]["id"].as_str().unwrap()
    );

    let response = send(
        app,
        multipart_request(
            &uri,
            &author,
            &[("notes.txt", &b"hello"[..]), ("tool.exe", &b"MZ"[..])],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["stored"].as_array().unwrap().len(), 1);
    assert_eq!(report["rejected"][0]["filename"], "tool.exe");
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_upload_by_non_author_is_403_and_audited() {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();
    let audit = AuditLog::open(logs.path(), "audit.log").unwrap();
    let app = audited_database_app(dir.path(), audit, &[]).await;
    let author = unique_user("owner");
    let intruder = unique_user("intruder");

    let created = create_article(app.clone(), &author, "Mine", "", false).await;
    let id = created["article"]["id"].as_str().unwrap().to_string();

    let response = send(
        app.clone(),
        multipart_request(
            &format!("/articles/{}/attachments", id),
            &intruder,
            &[("notes.txt", &b"hello"[..])],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    drop(app);

    let log = std::fs::read_to_string(logs.path().join("audit.log")).unwrap();
    let expected = format!(
        " - WARNING - Unauthorized upload attempt - User:{}, Article ID:{}, Owner:{}",
        intruder, id, author
    );
    assert!(log.contains(&expected), "audit log was: {}", log);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_popular_ranks_by_recent_likes() {
    dotenvy::dotenv().ok();
    let dir = tempfile::tempdir().unwrap();
    let app = database_app(dir.path(), &[]).await;
    let author = unique_user("popular");
    let fans: Vec<String> = (0..3).map(|_| unique_user("fan")).collect();

    let created = create_article(app.clone(), &author, "Crowd favourite", "", false).await;
    let id = created["article"]["id"].as_str().unwrap().to_string();
    for fan in &fans {
        let response = send(
            app.clone(),
            user_request("POST", &format!("/articles/{}/like", id), fan),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = get(app, "/api/v1/articles/popular?limit=1000&days=7").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["limit"], 100);
    assert_eq!(json["data"]["period_days"], 7);

    let entry = json["data"]["top_by_likes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["id"] == id.as_str())
        .expect("article ranked by likes");
    assert_eq!(entry["recent_likes"], 3);
    assert_eq!(entry["like_count"], 3);
}
