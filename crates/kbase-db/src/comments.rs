//! Comment repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use kbase_core::{Comment, CommentRepository, Error, Result};

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        article_id: row.get("article_id"),
        content: row.get("content"),
        author: row.get("author"),
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL implementation of CommentRepository.
#[derive(Clone)]
pub struct PgCommentRepository {
    pool: Pool<Postgres>,
}

impl PgCommentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn insert(&self, article_id: Uuid, author: &str, content: &str) -> Result<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("Comment must not be empty".to_string()));
        }

        let row = sqlx::query(
            "INSERT INTO comment (id, article_id, content, author, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             RETURNING id, article_id, content, author, created_at",
        )
        .bind(Uuid::now_v7())
        .bind(article_id)
        .bind(content)
        .bind(author)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Error::NotFound(format!("article {}", article_id))
            }
            other => Error::Database(other),
        })?;
        Ok(comment_from_row(&row))
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, article_id, content, author, created_at FROM comment WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(comment_from_row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comment WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_article(&self, article_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, article_id, content, author, created_at
             FROM comment
             WHERE article_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(comment_from_row).collect())
    }

    async fn like_counts(&self, comment_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        if comment_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT comment_id, COUNT(*) AS n FROM comment_like
             WHERE comment_id = ANY($1)
             GROUP BY comment_id",
        )
        .bind(comment_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<Uuid, _>("comment_id"), r.get::<i64, _>("n")))
            .collect())
    }
}
