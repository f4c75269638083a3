//! Integration tests for bulk engagement aggregation.
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database.
//! Run migrations first: `sqlx migrate run`

use chrono::{Duration, Utc};
use kbase_db::test_fixtures::{test_database, unique_user, ArticleBuilder};
use kbase_db::{CommentRepository, Database, EngagementRepository, LikeRepository, ViewRepository};
use uuid::Uuid;

async fn setup() -> Database {
    dotenvy::dotenv().ok();
    test_database().await.expect("Failed to connect to test database")
}

/// Like `article_id` from `count` fresh users, backdated by `age`.
async fn add_likes(db: &Database, article_id: Uuid, count: usize, age: Duration) {
    for _ in 0..count {
        let user = unique_user("liker");
        db.likes
            .toggle_article_like(&user, article_id)
            .await
            .expect("like");
        sqlx::query("UPDATE article_like SET created_at = $1 WHERE user_id = $2")
            .bind(Utc::now() - age)
            .bind(&user)
            .execute(db.pool())
            .await
            .expect("backdate like");
    }
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_window_counts_only_recent_likes() {
    let db = setup().await;
    let article = ArticleBuilder::new(&unique_user("author"))
        .create(&db)
        .await
        .unwrap();

    add_likes(&db, article.id, 2, Duration::days(40)).await;
    add_likes(&db, article.id, 3, Duration::days(5)).await;

    let windowed = db
        .engagement
        .get_bulk_engagement_stats(&[article.id], Some(30))
        .await
        .unwrap();
    assert_eq!(windowed[&article.id].likes, 3);

    let all_time = db
        .engagement
        .get_bulk_engagement_stats(&[article.id], None)
        .await
        .unwrap();
    assert_eq!(all_time[&article.id].likes, 5);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_every_requested_id_is_present() {
    let db = setup().await;
    let busy = ArticleBuilder::new(&unique_user("author"))
        .create(&db)
        .await
        .unwrap();
    let quiet = ArticleBuilder::new(&unique_user("author"))
        .create(&db)
        .await
        .unwrap();
    let missing = Uuid::now_v7();

    db.comments
        .insert(busy.id, &unique_user("reader"), "Nice")
        .await
        .unwrap();
    db.views
        .record_view_at(&unique_user("reader"), busy.id, Utc::now())
        .await
        .unwrap();

    let stats = db
        .engagement
        .get_bulk_engagement_stats(&[busy.id, quiet.id, missing], None)
        .await
        .unwrap();

    assert_eq!(stats.len(), 3);
    assert_eq!(stats[&busy.id].comments, 1);
    assert_eq!(stats[&busy.id].views, 1);
    assert_eq!(stats[&quiet.id].views, 0);
    assert_eq!(stats[&quiet.id].likes, 0);
    assert_eq!(stats[&missing].comments, 0);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_window_on_views_uses_viewed_at() {
    let db = setup().await;
    let article = ArticleBuilder::new(&unique_user("author"))
        .create(&db)
        .await
        .unwrap();

    db.views
        .record_view_at(&unique_user("reader"), article.id, Utc::now() - Duration::days(10))
        .await
        .unwrap();
    db.views
        .record_view_at(&unique_user("reader"), article.id, Utc::now())
        .await
        .unwrap();

    let week = db
        .engagement
        .get_bulk_engagement_stats(&[article.id], Some(7))
        .await
        .unwrap();
    assert_eq!(week[&article.id].views, 1);

    let month = db
        .engagement
        .get_bulk_engagement_stats(&[article.id], Some(30))
        .await
        .unwrap();
    assert_eq!(month[&article.id].views, 2);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_repeated_calls_are_stable() {
    let db = setup().await;
    let article = ArticleBuilder::new(&unique_user("author"))
        .create(&db)
        .await
        .unwrap();
    add_likes(&db, article.id, 2, Duration::hours(1)).await;

    let first = db
        .engagement
        .get_bulk_engagement_stats(&[article.id], Some(30))
        .await
        .unwrap();
    let second = db
        .engagement
        .get_bulk_engagement_stats(&[article.id], Some(30))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_empty_input_returns_empty_map() {
    let db = setup().await;
    let stats = db
        .engagement
        .get_bulk_engagement_stats(&[], Some(30))
        .await
        .unwrap();
    assert!(stats.is_empty());
}
