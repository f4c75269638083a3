//! Article and comment like repository implementation.
//!
//! Toggles check for an existing row first. Two concurrent toggles can both
//! see no row; the loser then hits the unique constraint, which is reported
//! as [`LikeOutcome::AlreadyLiked`] instead of an error.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use kbase_core::{CommentLike, Error, Like, LikeOutcome, LikeRepository, Result};

/// Map a unique violation on insert to `AlreadyLiked`.
fn insert_outcome(result: std::result::Result<(), sqlx::Error>) -> Result<LikeOutcome> {
    match result {
        Ok(()) => Ok(LikeOutcome::Liked),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            debug!(
                subsystem = "db",
                component = "likes",
                "Concurrent like lost the race, reporting already liked"
            );
            Ok(LikeOutcome::AlreadyLiked)
        }
        Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
            Err(Error::NotFound("liked item no longer exists".to_string()))
        }
        Err(e) => Err(Error::Database(e)),
    }
}

/// PostgreSQL implementation of LikeRepository.
#[derive(Clone)]
pub struct PgLikeRepository {
    pool: Pool<Postgres>,
}

impl PgLikeRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LikeRepository for PgLikeRepository {
    async fn find_article_like(&self, user_id: &str, article_id: Uuid) -> Result<Option<Like>> {
        let row = sqlx::query(
            "SELECT id, user_id, article_id, created_at FROM article_like
             WHERE user_id = $1 AND article_id = $2",
        )
        .bind(user_id)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.map(|r| Like {
            id: r.get("id"),
            user_id: r.get("user_id"),
            article_id: r.get("article_id"),
            created_at: r.get("created_at"),
        }))
    }

    async fn toggle_article_like(&self, user_id: &str, article_id: Uuid) -> Result<LikeOutcome> {
        if let Some(existing) = self.find_article_like(user_id, article_id).await? {
            sqlx::query("DELETE FROM article_like WHERE id = $1")
                .bind(existing.id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
            return Ok(LikeOutcome::Unliked);
        }

        let result = sqlx::query(
            "INSERT INTO article_like (id, user_id, article_id, created_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(article_id)
        .execute(&self.pool)
        .await
        .map(|_| ());
        insert_outcome(result)
    }

    async fn count_article_likes(&self, article_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM article_like WHERE article_id = $1")
            .bind(article_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("count"))
    }

    async fn find_comment_like(
        &self,
        user_id: &str,
        comment_id: Uuid,
    ) -> Result<Option<CommentLike>> {
        let row = sqlx::query(
            "SELECT id, user_id, comment_id, created_at FROM comment_like
             WHERE user_id = $1 AND comment_id = $2",
        )
        .bind(user_id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.map(|r| CommentLike {
            id: r.get("id"),
            user_id: r.get("user_id"),
            comment_id: r.get("comment_id"),
            created_at: r.get("created_at"),
        }))
    }

    async fn toggle_comment_like(&self, user_id: &str, comment_id: Uuid) -> Result<LikeOutcome> {
        if let Some(existing) = self.find_comment_like(user_id, comment_id).await? {
            sqlx::query("DELETE FROM comment_like WHERE id = $1")
                .bind(existing.id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
            return Ok(LikeOutcome::Unliked);
        }

        let result = sqlx::query(
            "INSERT INTO comment_like (id, user_id, comment_id, created_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(comment_id)
        .execute(&self.pool)
        .await
        .map(|_| ());
        insert_outcome(result)
    }

    async fn count_comment_likes(&self, comment_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM comment_like WHERE comment_id = $1")
            .bind(comment_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("count"))
    }

    async fn liked_comment_ids(&self, user_id: &str, article_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query(
            "SELECT cl.comment_id FROM comment_like cl
             JOIN comment c ON c.id = cl.comment_id
             WHERE cl.user_id = $1 AND c.article_id = $2",
        )
        .bind(user_id)
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| r.get("comment_id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_insert_is_liked() {
        assert_eq!(insert_outcome(Ok(())).unwrap(), LikeOutcome::Liked);
    }

    #[test]
    fn test_other_errors_propagate() {
        let err = insert_outcome(Err(sqlx::Error::PoolTimedOut)).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
