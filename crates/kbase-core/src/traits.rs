//! Core traits for kbase storage abstractions.
//!
//! These traits define the interfaces the PostgreSQL layer implements, so
//! the reconciler and the HTTP layer can be exercised against in-memory
//! doubles.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engagement::EngagementMap;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// SHARED
// =============================================================================

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

// =============================================================================
// ARTICLE REPOSITORY
// =============================================================================

/// Request for creating an article.
#[derive(Debug, Clone)]
pub struct CreateArticleRequest {
    pub title: String,
    pub content: String,
    pub author: String,
    pub is_draft: bool,
    /// Raw comma-separated tag string.
    pub tags: String,
}

/// Request for editing an article. The author never changes.
#[derive(Debug, Clone)]
pub struct UpdateArticleRequest {
    pub title: String,
    pub content: String,
    pub is_draft: bool,
    /// Raw comma-separated tag string; blank leaves tags untouched.
    pub tags: String,
    /// Identity doing the edit, credited as creator of new tags and owner
    /// of pending uploads to claim.
    pub acting_user: String,
}

/// Web feed filters. Only published articles are listed.
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    /// Identity evaluating `my_posts` and `liked_posts`.
    pub viewer: String,
    /// Case-insensitive match on title, content or comment text.
    pub search: Option<String>,
    pub my_posts: bool,
    /// Articles the viewer liked, or whose comments the viewer liked.
    pub liked_posts: bool,
    /// Tag name, matched case-insensitively.
    pub tag: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Filters for the read-only API listing. Only published articles.
#[derive(Debug, Clone, Default)]
pub struct PublishedQuery {
    pub author: Option<String>,
    pub tag: Option<String>,
    /// Lower bound on `updated_at`.
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// Repository for articles.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert the article, apply its tags and claim the author's pending
    /// uploads in one transaction.
    async fn create(&self, req: CreateArticleRequest) -> Result<Article>;

    /// Update the article, re-apply tags and claim pending uploads in one
    /// transaction.
    async fn update(&self, id: Uuid, req: UpdateArticleRequest) -> Result<Article>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Article>>;

    /// Delete the article. Comments, likes, attachment rows, tag links and
    /// views go with it. Returns false if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Published articles for the web feed, newest first.
    async fn list_feed(&self, query: &FeedQuery) -> Result<Page<Article>>;

    /// An author's drafts, most recently updated first.
    async fn list_drafts(&self, author: &str, limit: i64, offset: i64) -> Result<Page<Article>>;

    async fn count_drafts(&self, author: &str) -> Result<i64>;

    /// Published articles for the API, most recently updated first.
    async fn list_published(&self, query: &PublishedQuery) -> Result<Page<Article>>;

    /// Ids of every published article.
    async fn published_ids(&self) -> Result<Vec<Uuid>>;

    /// Articles for the given ids, in no particular order.
    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Article>>;

    /// Tags per article for the given ids, ordered by name.
    async fn tags_for(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TagRef>>>;
}

// =============================================================================
// COMMENTS, LIKES, VIEWS
// =============================================================================

/// Repository for comments.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn insert(&self, article_id: Uuid, author: &str, content: &str) -> Result<Comment>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Comment>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Comments on an article, newest first.
    async fn list_for_article(&self, article_id: Uuid) -> Result<Vec<Comment>>;

    /// Like count per comment for the given ids.
    async fn like_counts(&self, comment_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>>;
}

/// Repository for article and comment likes.
#[async_trait]
pub trait LikeRepository: Send + Sync {
    async fn find_article_like(&self, user_id: &str, article_id: Uuid) -> Result<Option<Like>>;

    /// Remove the like if present, otherwise insert it.
    async fn toggle_article_like(&self, user_id: &str, article_id: Uuid) -> Result<LikeOutcome>;

    async fn count_article_likes(&self, article_id: Uuid) -> Result<i64>;

    async fn find_comment_like(
        &self,
        user_id: &str,
        comment_id: Uuid,
    ) -> Result<Option<CommentLike>>;

    async fn toggle_comment_like(&self, user_id: &str, comment_id: Uuid) -> Result<LikeOutcome>;

    async fn count_comment_likes(&self, comment_id: Uuid) -> Result<i64>;

    /// Comments on `article_id` liked by `user_id`.
    async fn liked_comment_ids(&self, user_id: &str, article_id: Uuid) -> Result<HashSet<Uuid>>;
}

/// Repository for daily-deduplicated article views.
#[async_trait]
pub trait ViewRepository: Send + Sync {
    /// Record a view at `at`. Returns `None` if the user already viewed the
    /// article on the same UTC day.
    async fn record_view_at(
        &self,
        user_id: &str,
        article_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<ViewHistory>>;
}

/// Bulk engagement statistics.
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    /// View, like and comment counts for every id in `article_ids`, using at
    /// most one grouped query per metric. With `days`, only activity in the
    /// trailing window counts.
    async fn get_bulk_engagement_stats(
        &self,
        article_ids: &[Uuid],
        days: Option<i64>,
    ) -> Result<EngagementMap>;
}

// =============================================================================
// TAGS
// =============================================================================

/// Read side of tags. Writes happen inside article transactions.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// All tags, most used first.
    async fn list_all(&self) -> Result<Vec<Tag>>;

    /// Most used tags with a positive usage count.
    async fn popular(&self, limit: i64) -> Result<Vec<Tag>>;

    /// Case-insensitive lookup.
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Repository for attachment rows. File bytes are handled by the storage
/// backend.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn insert(&self, new: NewAttachment) -> Result<Attachment>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Attachment>>;

    /// Delete a row, returning it if it existed.
    async fn delete(&self, id: Uuid) -> Result<Option<Attachment>>;

    /// Linked attachments of an article, oldest first.
    async fn list_for_article(&self, article_id: Uuid) -> Result<Vec<Attachment>>;

    /// Attachment count per article for the given ids.
    async fn count_for(&self, article_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>>;

    /// Link every pending attachment of `uploaded_by` to `article_id`.
    /// Returns the number of rows claimed.
    async fn claim_pending(&self, uploaded_by: &str, article_id: Uuid) -> Result<u64>;

    /// Delete every pending row created before `cutoff`, returning them.
    async fn purge_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attachment>>;

    /// Stored filenames of every row, pending or linked.
    async fn stored_filenames(&self) -> Result<HashSet<String>>;
}
