//! Daily-deduplicated view recording.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use kbase_core::{Error, Result, ViewHistory, ViewRepository};

/// PostgreSQL implementation of ViewRepository.
#[derive(Clone)]
pub struct PgViewRepository {
    pool: Pool<Postgres>,
}

impl PgViewRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ViewRepository for PgViewRepository {
    async fn record_view_at(
        &self,
        user_id: &str,
        article_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<ViewHistory>> {
        // unique_daily_view turns the second view of the day into a no-op.
        let row = sqlx::query(
            "INSERT INTO view_history (id, user_id, article_id, viewed_at, viewed_on)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT ON CONSTRAINT unique_daily_view DO NOTHING
             RETURNING id, user_id, article_id, viewed_at",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(article_id)
        .bind(at)
        .bind(at.date_naive())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| ViewHistory {
            id: r.get("id"),
            user_id: r.get("user_id"),
            article_id: r.get("article_id"),
            viewed_at: r.get("viewed_at"),
        }))
    }
}
