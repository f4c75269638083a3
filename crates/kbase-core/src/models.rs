//! Core data models for kbase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ARTICLES
// =============================================================================

/// A user-authored post with markdown content, draft or published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    /// Markdown source.
    pub content: String,
    /// Header-supplied identity of the author.
    pub author: String,
    pub is_draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Drafts are visible to their author only.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        !self.is_draft || self.author == user_id
    }

    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author == user_id
    }
}

/// Article row decorated with counts and tags for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleCard {
    #[serde(flatten)]
    pub article: Article,
    pub tags: Vec<TagRef>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub attachment_count: i64,
}

// =============================================================================
// COMMENTS & LIKES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub article_id: Uuid,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// At most one per (user_id, article_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: Uuid,
    pub user_id: String,
    pub article_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// At most one per (user_id, comment_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentLike {
    pub id: Uuid,
    pub user_id: String,
    pub comment_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
    Liked,
    Unliked,
    /// A concurrent request inserted the same like first.
    AlreadyLiked,
}

impl LikeOutcome {
    pub fn is_liked(self) -> bool {
        !matches!(self, LikeOutcome::Unliked)
    }
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Uploaded file metadata. The bytes live in the storage backend under
/// `stored_filename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    /// Sanitized original filename, used for downloads.
    pub filename: String,
    /// `<uuid hex>.<ext>` name on disk.
    pub stored_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    /// `None` while the upload waits for its article to be saved.
    pub article_id: Option<Uuid>,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle position of an attachment row. Purged attachments have no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "article_id")]
pub enum AttachmentState {
    Pending,
    Linked(Uuid),
}

impl Attachment {
    pub fn state(&self) -> AttachmentState {
        match self.article_id {
            Some(id) => AttachmentState::Linked(id),
            None => AttachmentState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.article_id.is_none()
    }

    /// Uploader can always delete; a linked file may also be deleted by the
    /// article's author.
    pub fn can_be_deleted_by(&self, user_id: &str, article_author: Option<&str>) -> bool {
        self.uploaded_by == user_id || article_author == Some(user_id)
    }
}

/// Input for an attachment insert.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub filename: String,
    pub stored_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub article_id: Option<Uuid>,
    pub uploaded_by: String,
}

// =============================================================================
// TAGS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    /// Number of article saves that included this tag. Never decremented.
    pub usage_count: i32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// The slice of a tag shown alongside an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

impl From<&Tag> for TagRef {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            color: tag.color.clone(),
        }
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// One row per (user_id, article_id, UTC calendar day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewHistory {
    pub id: Uuid,
    pub user_id: String,
    pub article_id: Uuid,
    pub viewed_at: DateTime<Utc>,
}
