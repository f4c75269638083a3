//! Attachment repository implementation.
//!
//! Rows move from pending (`article_id IS NULL`) to linked when their
//! uploader saves an article, or are purged once they go stale.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use kbase_core::{Attachment, AttachmentRepository, Error, NewAttachment, Result};

const ATTACHMENT_COLUMNS: &str =
    "id, filename, stored_filename, file_size, mime_type, article_id, uploaded_by, created_at";

pub(crate) fn attachment_from_row(row: &PgRow) -> Attachment {
    Attachment {
        id: row.get("id"),
        filename: row.get("filename"),
        stored_filename: row.get("stored_filename"),
        file_size: row.get("file_size"),
        mime_type: row.get("mime_type"),
        article_id: row.get("article_id"),
        uploaded_by: row.get("uploaded_by"),
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL implementation of AttachmentRepository.
#[derive(Clone)]
pub struct PgAttachmentRepository {
    pool: Pool<Postgres>,
}

impl PgAttachmentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Link every pending attachment of `uploaded_by` to `article_id` within
    /// the caller's transaction.
    pub async fn claim_pending_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uploaded_by: &str,
        article_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE attachment SET article_id = $2
             WHERE uploaded_by = $1 AND article_id IS NULL",
        )
        .bind(uploaded_by)
        .bind(article_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let claimed = result.rows_affected();
        if claimed > 0 {
            debug!(
                subsystem = "db",
                component = "attachments",
                op = "claim_pending",
                user_id = %uploaded_by,
                article_id = %article_id,
                count = claimed,
                "Linked pending attachments"
            );
        }
        Ok(claimed)
    }

    /// Stored filenames of an article's attachments, read before the article
    /// is deleted so the files can be removed afterwards.
    pub async fn stored_filenames_for_article(&self, article_id: Uuid) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT stored_filename FROM attachment WHERE article_id = $1")
            .bind(article_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| r.get("stored_filename")).collect())
    }
}

#[async_trait]
impl AttachmentRepository for PgAttachmentRepository {
    async fn insert(&self, new: NewAttachment) -> Result<Attachment> {
        let row = sqlx::query(&format!(
            "INSERT INTO attachment
                 (id, filename, stored_filename, file_size, mime_type, article_id, uploaded_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             RETURNING {}",
            ATTACHMENT_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(&new.filename)
        .bind(&new.stored_filename)
        .bind(new.file_size)
        .bind(&new.mime_type)
        .bind(new.article_id)
        .bind(&new.uploaded_by)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(attachment_from_row(&row))
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Attachment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM attachment WHERE id = $1",
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(attachment_from_row))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Attachment>> {
        let row = sqlx::query(&format!(
            "DELETE FROM attachment WHERE id = $1 RETURNING {}",
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(attachment_from_row))
    }

    async fn list_for_article(&self, article_id: Uuid) -> Result<Vec<Attachment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM attachment WHERE article_id = $1 ORDER BY created_at, id",
            ATTACHMENT_COLUMNS
        ))
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(attachment_from_row).collect())
    }

    async fn count_for(&self, article_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT article_id, COUNT(*) AS n FROM attachment
             WHERE article_id = ANY($1)
             GROUP BY article_id",
        )
        .bind(article_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<Uuid, _>("article_id"), r.get::<i64, _>("n")))
            .collect())
    }

    async fn claim_pending(&self, uploaded_by: &str, article_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let claimed = self.claim_pending_tx(&mut tx, uploaded_by, article_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(claimed)
    }

    async fn purge_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attachment>> {
        // One statement: a concurrent claim either links the row first and it
        // survives, or finds it already gone.
        let rows = sqlx::query(&format!(
            "DELETE FROM attachment
             WHERE article_id IS NULL AND created_at < $1
             RETURNING {}",
            ATTACHMENT_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(attachment_from_row).collect())
    }

    async fn stored_filenames(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT stored_filename FROM attachment")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| r.get("stored_filename")).collect())
    }
}
