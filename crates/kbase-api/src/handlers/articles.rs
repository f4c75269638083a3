//! Article web routes: feed, drafts, detail, create, edit and delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use kbase_core::defaults::{FEED_PAGE_SIZE, POPULAR_TAGS_COUNT};
use kbase_core::{
    Article, ArticleCard, ArticleRepository, Attachment, AttachmentRepository, Comment,
    CommentRepository, CreateArticleRequest, FeedQuery, LikeRepository, Tag, TagRef,
    TagRepository, UpdateArticleRequest, ViewRepository,
};
use kbase_db::SavedArticle;

use super::{decorate_articles, visible_article};
use crate::audit::AuditEvent;
use crate::extractors::CurrentUser;
use crate::query_types::{flag, lenient_i64, page_offset};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ArticleForm {
    pub title: String,
    pub content: String,
    /// Comma-separated tag names. Blank leaves tags untouched on edit.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub is_draft: bool,
}

#[derive(Debug, Serialize)]
pub struct SavedArticleResponse {
    pub article: Article,
    pub tags: Vec<TagRef>,
    /// Blank tag input left the previous tags in place.
    pub tags_untouched: bool,
    pub rejected_tags: Vec<String>,
    pub claimed_attachments: u64,
}

impl From<SavedArticle> for SavedArticleResponse {
    fn from(saved: SavedArticle) -> Self {
        Self {
            tags: saved.tags.tags.iter().map(TagRef::from).collect(),
            tags_untouched: saved.tags.untouched,
            rejected_tags: saved.tags.rejected,
            claimed_attachments: saved.claimed_attachments,
            article: saved.article,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub search: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub my_posts: bool,
    #[serde(default, deserialize_with = "flag")]
    pub liked_posts: bool,
    pub tag: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    fn new(page: Option<i64>, total: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: FEED_PAGE_SIZE,
            total,
            pages: (total + FEED_PAGE_SIZE - 1) / FEED_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub articles: Vec<ArticleCard>,
    pub pagination: Pagination,
    pub popular_tags: Vec<Tag>,
    pub draft_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DraftsResponse {
    pub articles: Vec<ArticleCard>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub like_count: i64,
    pub liked: bool,
}

#[derive(Debug, Serialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub card: ArticleCard,
    pub comments: Vec<CommentView>,
    pub attachments: Vec<Attachment>,
    pub liked: bool,
    pub can_edit: bool,
}

/// Published feed with filters, paginated newest first.
pub async fn list_articles(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedResponse>, ApiError> {
    let query = FeedQuery {
        viewer: user.user_id().to_string(),
        search: params.search,
        my_posts: params.my_posts,
        liked_posts: params.liked_posts,
        tag: params.tag,
        limit: FEED_PAGE_SIZE,
        offset: page_offset(params.page, FEED_PAGE_SIZE),
    };

    let page = state.db.articles.list_feed(&query).await?;
    let articles = decorate_articles(&state, page.items).await?;
    let popular_tags = state.db.tags.popular(POPULAR_TAGS_COUNT).await?;
    let draft_count = state.db.articles.count_drafts(user.user_id()).await?;

    Ok(Json(FeedResponse {
        articles,
        pagination: Pagination::new(params.page, page.total),
        popular_tags,
        draft_count,
    }))
}

/// The caller's drafts, most recently updated first.
pub async fn list_drafts(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<DraftsResponse>, ApiError> {
    let page = state
        .db
        .articles
        .list_drafts(
            user.user_id(),
            FEED_PAGE_SIZE,
            page_offset(params.page, FEED_PAGE_SIZE),
        )
        .await?;
    let articles = decorate_articles(&state, page.items).await?;

    Ok(Json(DraftsResponse {
        articles,
        pagination: Pagination::new(params.page, page.total),
    }))
}

pub async fn create_article(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<ArticleForm>,
) -> Result<(StatusCode, Json<SavedArticleResponse>), ApiError> {
    let saved = state
        .db
        .articles
        .save_new(CreateArticleRequest {
            title: form.title,
            content: form.content,
            author: user.user_id().to_string(),
            is_draft: form.is_draft,
            tags: form.tags,
        })
        .await?;

    state.audit.record(AuditEvent::ArticleInserted {
        user: user.user_id(),
        article_id: saved.article.id,
        title: &saved.article.title,
    });

    Ok((StatusCode::CREATED, Json(saved.into())))
}

/// Article with comments, attachments and the caller's like state.
/// Viewing records at most one view per caller per day.
pub async fn get_article(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ArticleDetail>, ApiError> {
    let user_id = user.user_id();
    let article = visible_article(&state, id, user_id).await?;

    state
        .db
        .views
        .record_view_at(user_id, id, Utc::now())
        .await?;

    let comments = state.db.comments.list_for_article(id).await?;
    let comment_ids: Vec<Uuid> = comments.iter().map(|c| c.id).collect();
    let like_counts = state.db.comments.like_counts(&comment_ids).await?;
    let liked_comments = state.db.likes.liked_comment_ids(user_id, id).await?;
    let liked = state.db.likes.find_article_like(user_id, id).await?.is_some();
    let attachments = state.db.attachments.list_for_article(id).await?;
    let can_edit = article.is_authored_by(user_id);

    let card = decorate_articles(&state, vec![article])
        .await?
        .pop()
        .ok_or_else(|| ApiError::NotFound(format!("Article {} not found", id)))?;

    let comments = comments
        .into_iter()
        .map(|comment| CommentView {
            like_count: like_counts.get(&comment.id).copied().unwrap_or(0),
            liked: liked_comments.contains(&comment.id),
            comment,
        })
        .collect();

    Ok(Json(ArticleDetail {
        card,
        comments,
        attachments,
        liked,
        can_edit,
    }))
}

pub async fn update_article(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(form): Json<ArticleForm>,
) -> Result<Json<SavedArticleResponse>, ApiError> {
    let user_id = user.user_id();
    let existing = visible_article(&state, id, user_id).await?;

    if !existing.is_authored_by(user_id) {
        state.audit.record(AuditEvent::UnauthorizedEdit {
            user: user_id,
            article_id: id,
            owner: &existing.author,
        });
        return Err(ApiError::Forbidden(
            "Only the author can edit this article".to_string(),
        ));
    }

    let saved = state
        .db
        .articles
        .save_existing(
            id,
            UpdateArticleRequest {
                title: form.title,
                content: form.content,
                is_draft: form.is_draft,
                tags: form.tags,
                acting_user: user_id.to_string(),
            },
        )
        .await?;

    state.audit.record(AuditEvent::ArticleUpdated {
        user: user_id,
        article_id: id,
        title: &saved.article.title,
    });

    Ok(Json(saved.into()))
}

/// Delete an article and, best-effort, its attachment files.
pub async fn delete_article(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.user_id();
    let article = visible_article(&state, id, user_id).await?;

    if !article.is_authored_by(user_id) {
        state.audit.record(AuditEvent::UnauthorizedDelete {
            user: user_id,
            resource: "article",
            id,
            owner: &article.author,
        });
        return Err(ApiError::Forbidden(
            "Only the author can delete this article".to_string(),
        ));
    }

    let storage = state.storage()?;
    let stored = state
        .db
        .attachments
        .stored_filenames_for_article(id)
        .await?;

    if !state.db.articles.delete(id).await? {
        return Err(ApiError::NotFound(format!("Article {} not found", id)));
    }

    let failures = storage.remove_files(&stored).await;
    if failures > 0 {
        state.audit.record(AuditEvent::FilesNotRemoved {
            user: user_id,
            resource: "article",
            id,
            failures,
        });
    }

    info!(
        subsystem = "api",
        component = "articles",
        op = "delete",
        article_id = %id,
        files = stored.len(),
        "Article deleted"
    );
    state.audit.record(AuditEvent::ArticleDeleted {
        user: user_id,
        article_id: id,
        title: &article.title,
    });

    Ok(StatusCode::NO_CONTENT)
}
