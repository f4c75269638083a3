//! Article repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use kbase_core::tags::tag_key;
use kbase_core::{
    Article, ArticleRepository, CreateArticleRequest, Error, FeedQuery, Page, PublishedQuery,
    Result, TagRef, UpdateArticleRequest,
};

use crate::attachments::PgAttachmentRepository;
use crate::escape_like;
use crate::tags::{AppliedTags, PgTagRepository};

const ARTICLE_COLUMNS: &str =
    "a.id, a.title, a.content, a.author, a.is_draft, a.created_at, a.updated_at";

/// Maximum title length, matching the column width.
pub const MAX_TITLE_LEN: usize = 200;

fn article_from_row(row: &PgRow) -> Article {
    Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author: row.get("author"),
        is_draft: row.get("is_draft"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn validate_fields(title: &str, content: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::InvalidInput("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::InvalidInput(format!(
            "Title must be {} characters or less",
            MAX_TITLE_LEN
        )));
    }
    if content.trim().is_empty() {
        return Err(Error::InvalidInput("Content is required".to_string()));
    }
    Ok(())
}

/// `%term%` with LIKE wildcards in the term escaped.
fn contains_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("%{}%", escape_like(t)))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// $1 search pattern, $2 my_posts, $3 viewer, $4 liked_posts, $5 tag
const FEED_FILTER: &str = r#"
    NOT a.is_draft
    AND ($1::text IS NULL
         OR a.title ILIKE $1
         OR a.content ILIKE $1
         OR EXISTS (SELECT 1 FROM comment c WHERE c.article_id = a.id AND c.content ILIKE $1))
    AND (NOT $2::boolean OR a.author = $3)
    AND (NOT $4::boolean
         OR EXISTS (SELECT 1 FROM article_like l WHERE l.article_id = a.id AND l.user_id = $3)
         OR EXISTS (SELECT 1 FROM comment_like cl
                    JOIN comment c ON c.id = cl.comment_id
                    WHERE c.article_id = a.id AND cl.user_id = $3))
    AND ($5::text IS NULL
         OR EXISTS (SELECT 1 FROM article_tag at
                    JOIN tag t ON t.id = at.tag_id
                    WHERE at.article_id = a.id AND t.name_key = $5))
"#;

// $1 author, $2 tag, $3 since
const PUBLISHED_FILTER: &str = r#"
    NOT a.is_draft
    AND ($1::text IS NULL OR a.author = $1)
    AND ($2::text IS NULL
         OR EXISTS (SELECT 1 FROM article_tag at
                    JOIN tag t ON t.id = at.tag_id
                    WHERE at.article_id = a.id AND t.name_key = $2))
    AND ($3::timestamptz IS NULL OR a.updated_at >= $3)
"#;

/// Article plus what the save did to tags and pending uploads.
#[derive(Debug, Clone)]
pub struct SavedArticle {
    pub article: Article,
    pub tags: AppliedTags,
    /// Pending uploads linked by this save.
    pub claimed_attachments: u64,
}

/// PostgreSQL implementation of ArticleRepository.
#[derive(Clone)]
pub struct PgArticleRepository {
    pool: Pool<Postgres>,
    tags: PgTagRepository,
    attachments: PgAttachmentRepository,
}

impl PgArticleRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            tags: PgTagRepository::new(pool.clone()),
            attachments: PgAttachmentRepository::new(pool.clone()),
            pool,
        }
    }

    /// Insert an article, apply its tags and claim the author's pending
    /// uploads, all in one transaction.
    pub async fn save_new(&self, req: CreateArticleRequest) -> Result<SavedArticle> {
        validate_fields(&req.title, &req.content)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "INSERT INTO article AS a (id, title, content, author, is_draft, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
             RETURNING a.id, a.title, a.content, a.author, a.is_draft, a.created_at, a.updated_at",
        )
        .bind(Uuid::now_v7())
        .bind(req.title.trim())
        .bind(&req.content)
        .bind(&req.author)
        .bind(req.is_draft)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let article = article_from_row(&row);

        let tags = self
            .tags
            .handle_tags_tx(&mut tx, article.id, &req.tags, &req.author)
            .await?;
        let claimed_attachments = self
            .attachments
            .claim_pending_tx(&mut tx, &req.author, article.id)
            .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "articles",
            op = "create",
            article_id = %article.id,
            user_id = %article.author,
            is_draft = article.is_draft,
            "Article created"
        );

        Ok(SavedArticle {
            article,
            tags,
            claimed_attachments,
        })
    }

    /// Update an article, re-apply its tags and claim pending uploads, all in
    /// one transaction. Ownership is checked by the caller.
    pub async fn save_existing(&self, id: Uuid, req: UpdateArticleRequest) -> Result<SavedArticle> {
        validate_fields(&req.title, &req.content)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "UPDATE article AS a
             SET title = $2, content = $3, is_draft = $4, updated_at = NOW()
             WHERE a.id = $1
             RETURNING a.id, a.title, a.content, a.author, a.is_draft, a.created_at, a.updated_at",
        )
        .bind(id)
        .bind(req.title.trim())
        .bind(&req.content)
        .bind(req.is_draft)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("article {}", id)))?;
        let article = article_from_row(&row);

        let tags = self
            .tags
            .handle_tags_tx(&mut tx, id, &req.tags, &req.acting_user)
            .await?;
        let claimed_attachments = self
            .attachments
            .claim_pending_tx(&mut tx, &req.acting_user, id)
            .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "articles",
            op = "update",
            article_id = %id,
            user_id = %req.acting_user,
            "Article updated"
        );

        Ok(SavedArticle {
            article,
            tags,
            claimed_attachments,
        })
    }
}

#[async_trait]
impl ArticleRepository for PgArticleRepository {
    async fn create(&self, req: CreateArticleRequest) -> Result<Article> {
        Ok(self.save_new(req).await?.article)
    }

    async fn update(&self, id: Uuid, req: UpdateArticleRequest) -> Result<Article> {
        Ok(self.save_existing(id, req).await?.article)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Article>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM article a WHERE a.id = $1",
            ARTICLE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(article_from_row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM article WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_feed(&self, query: &FeedQuery) -> Result<Page<Article>> {
        let search = contains_pattern(query.search.as_deref());
        let tag = non_blank(query.tag.as_deref()).map(|t| tag_key(&t));

        let count_sql = format!("SELECT COUNT(*) AS count FROM article a WHERE {}", FEED_FILTER);
        let total: i64 = sqlx::query(&count_sql)
            .bind(&search)
            .bind(query.my_posts)
            .bind(&query.viewer)
            .bind(query.liked_posts)
            .bind(&tag)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?
            .get("count");

        let page_sql = format!(
            "SELECT {} FROM article a WHERE {}
             ORDER BY a.created_at DESC, a.id DESC
             LIMIT $6 OFFSET $7",
            ARTICLE_COLUMNS, FEED_FILTER
        );
        let rows = sqlx::query(&page_sql)
            .bind(&search)
            .bind(query.my_posts)
            .bind(&query.viewer)
            .bind(query.liked_posts)
            .bind(&tag)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(Page {
            items: rows.iter().map(article_from_row).collect(),
            total,
        })
    }

    async fn list_drafts(&self, author: &str, limit: i64, offset: i64) -> Result<Page<Article>> {
        let total = self.count_drafts(author).await?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM article a
             WHERE a.is_draft AND a.author = $1
             ORDER BY a.updated_at DESC, a.id DESC
             LIMIT $2 OFFSET $3",
            ARTICLE_COLUMNS
        ))
        .bind(author)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(Page {
            items: rows.iter().map(article_from_row).collect(),
            total,
        })
    }

    async fn count_drafts(&self, author: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM article WHERE is_draft AND author = $1",
        )
        .bind(author)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.get("count"))
    }

    async fn list_published(&self, query: &PublishedQuery) -> Result<Page<Article>> {
        let author = non_blank(query.author.as_deref());
        let tag = non_blank(query.tag.as_deref()).map(|t| tag_key(&t));

        let count_sql = format!(
            "SELECT COUNT(*) AS count FROM article a WHERE {}",
            PUBLISHED_FILTER
        );
        let total: i64 = sqlx::query(&count_sql)
            .bind(&author)
            .bind(&tag)
            .bind(query.since)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?
            .get("count");

        let page_sql = format!(
            "SELECT {} FROM article a WHERE {}
             ORDER BY a.updated_at DESC, a.id DESC
             LIMIT $4 OFFSET $5",
            ARTICLE_COLUMNS, PUBLISHED_FILTER
        );
        let rows = sqlx::query(&page_sql)
            .bind(&author)
            .bind(&tag)
            .bind(query.since)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(Page {
            items: rows.iter().map(article_from_row).collect(),
            total,
        })
    }

    async fn published_ids(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM article WHERE NOT is_draft ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM article a WHERE a.id = ANY($1)",
            ARTICLE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(article_from_row).collect())
    }

    async fn tags_for(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TagRef>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT at.article_id, t.id, t.name, t.color
             FROM article_tag at
             JOIN tag t ON t.id = at.tag_id
             WHERE at.article_id = ANY($1)
             ORDER BY at.article_id, at.position",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut map: HashMap<Uuid, Vec<TagRef>> = HashMap::new();
        for row in rows {
            map.entry(row.get("article_id")).or_default().push(TagRef {
                id: row.get("id"),
                name: row.get("name"),
                color: row.get("color"),
            });
        }
        Ok(map)
    }
}
