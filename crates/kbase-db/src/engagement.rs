//! Bulk engagement statistics.
//!
//! One grouped query per metric, whatever the number of articles, so list
//! and ranking pages never issue a query per row.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use kbase_core::engagement::{merge_grouped_counts, window_start};
use kbase_core::{EngagementMap, EngagementRepository, Error, Result};

/// PostgreSQL implementation of EngagementRepository.
#[derive(Clone)]
pub struct PgEngagementRepository {
    pool: Pool<Postgres>,
}

impl PgEngagementRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Same as the trait method with an explicit clock.
    pub async fn get_bulk_engagement_stats_at(
        &self,
        article_ids: &[Uuid],
        days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<EngagementMap> {
        let since = window_start(days, now)?;
        if article_ids.is_empty() {
            return Ok(EngagementMap::new());
        }

        let start = Instant::now();
        let views = self
            .grouped_counts("view_history", "viewed_at", article_ids, since)
            .await?;
        let likes = self
            .grouped_counts("article_like", "created_at", article_ids, since)
            .await?;
        let comments = self
            .grouped_counts("comment", "created_at", article_ids, since)
            .await?;

        let map = merge_grouped_counts(article_ids, views, likes, comments);
        debug!(
            subsystem = "db",
            component = "engagement",
            op = "bulk_stats",
            article_count = map.len(),
            days = ?days,
            duration_ms = start.elapsed().as_millis() as u64,
            "Computed bulk engagement stats"
        );
        Ok(map)
    }

    /// `table` and `time_column` are fixed identifiers from this module,
    /// never user input.
    async fn grouped_counts(
        &self,
        table: &str,
        time_column: &str,
        article_ids: &[Uuid],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Uuid, i64)>> {
        let sql = format!(
            "SELECT article_id, COUNT(*) AS n FROM {table}
             WHERE article_id = ANY($1)
               AND ($2::timestamptz IS NULL OR {time_column} >= $2)
             GROUP BY article_id"
        );
        let rows = sqlx::query(&sql)
            .bind(article_ids)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<Uuid, _>("article_id"), r.get::<i64, _>("n")))
            .collect())
    }
}

#[async_trait]
impl EngagementRepository for PgEngagementRepository {
    async fn get_bulk_engagement_stats(
        &self,
        article_ids: &[Uuid],
        days: Option<i64>,
    ) -> Result<EngagementMap> {
        self.get_bulk_engagement_stats_at(article_ids, days, Utc::now())
            .await
    }
}
