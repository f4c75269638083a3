//! Tag repository implementation and the tag associator.
//!
//! An article's tags are replaced wholesale on every save that carries a
//! non-blank tag string. Each save that includes a tag bumps its
//! `usage_count`; nothing ever decrements it, so the count reads as "saves
//! that used this tag" rather than a live association count.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use kbase_core::defaults::TAG_COLOR;
use kbase_core::tags::{is_noop, parse_tag_list, tag_key};
use kbase_core::{Error, Result, Tag, TagRepository};

const TAG_COLUMNS: &str =
    "id, name, color, COALESCE(usage_count, 0) AS usage_count, created_by, created_at";

fn tag_from_row(row: &PgRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        color: row.get("color"),
        usage_count: row.get("usage_count"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}

/// What a tag associator call did.
#[derive(Debug, Clone, Default)]
pub struct AppliedTags {
    /// Blank input: existing associations were left alone.
    pub untouched: bool,
    /// Tags now associated, in input order.
    pub tags: Vec<Tag>,
    /// Names skipped for being too long.
    pub rejected: Vec<String>,
}

/// PostgreSQL implementation of TagRepository.
#[derive(Clone)]
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Replace an article's tags from a raw comma-separated string.
    ///
    /// Runs inside the caller's transaction and commits nothing itself.
    /// Blank input is a no-op. Otherwise every existing association is
    /// removed, then each accepted name is upserted (new tags are credited
    /// to `acting_user` and start at a usage count of 1, existing ones are
    /// incremented) and linked to the article.
    pub async fn handle_tags_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        article_id: Uuid,
        raw: &str,
        acting_user: &str,
    ) -> Result<AppliedTags> {
        if is_noop(raw) {
            return Ok(AppliedTags {
                untouched: true,
                ..AppliedTags::default()
            });
        }

        let parsed = parse_tag_list(raw);
        for name in &parsed.rejected {
            warn!(
                subsystem = "db",
                component = "tags",
                op = "handle_tags",
                article_id = %article_id,
                tag_length = name.chars().count(),
                "Skipping over-long tag name"
            );
        }

        sqlx::query("DELETE FROM article_tag WHERE article_id = $1")
            .bind(article_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        let mut applied = Vec::with_capacity(parsed.accepted.len());
        for name in &parsed.accepted {
            // Unique index on the folded key makes this one round trip even
            // when two saves create the same tag concurrently.
            let row = sqlx::query(&format!(
                "INSERT INTO tag (id, name, name_key, color, usage_count, created_by, created_at)
                 VALUES ($1, $2, $3, $4, 1, $5, NOW())
                 ON CONFLICT (name_key)
                 DO UPDATE SET usage_count = COALESCE(tag.usage_count, 0) + 1
                 RETURNING {}",
                TAG_COLUMNS
            ))
            .bind(Uuid::now_v7())
            .bind(name)
            .bind(tag_key(name))
            .bind(TAG_COLOR)
            .bind(acting_user)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;
            let tag = tag_from_row(&row);

            if applied.iter().any(|t: &Tag| t.id == tag.id) {
                continue;
            }

            sqlx::query(
                "INSERT INTO article_tag (article_id, tag_id, position, created_at)
                 VALUES ($1, $2, $3, NOW())
                 ON CONFLICT DO NOTHING",
            )
            .bind(article_id)
            .bind(tag.id)
            .bind(applied.len() as i16)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

            applied.push(tag);
        }

        debug!(
            subsystem = "db",
            component = "tags",
            op = "handle_tags",
            article_id = %article_id,
            count = applied.len(),
            "Replaced article tags"
        );

        Ok(AppliedTags {
            untouched: false,
            tags: applied,
            rejected: parsed.rejected,
        })
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn list_all(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tag ORDER BY COALESCE(usage_count, 0) DESC, name",
            TAG_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(tag_from_row).collect())
    }

    async fn popular(&self, limit: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tag
             WHERE COALESCE(usage_count, 0) > 0
             ORDER BY usage_count DESC, name
             LIMIT $1",
            TAG_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(tag_from_row).collect())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tag WHERE name_key = $1",
            TAG_COLUMNS
        ))
        .bind(tag_key(name.trim()))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(tag_from_row))
    }
}
