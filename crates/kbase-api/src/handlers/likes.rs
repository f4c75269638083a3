//! Like toggles for articles and comments.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use kbase_core::engagement::ensure_not_self_like;
use kbase_core::{CommentRepository, LikeOutcome, LikeRepository};

use super::visible_article;
use crate::audit::AuditEvent;
use crate::extractors::CurrentUser;
use crate::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub outcome: LikeOutcome,
    pub liked: bool,
    pub like_count: i64,
}

pub async fn toggle_article_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeResponse>, ApiError> {
    let user_id = user.user_id();
    let article = visible_article(&state, id, user_id).await?;

    if let Err(e) = ensure_not_self_like(&article.author, user_id) {
        state.audit.record(AuditEvent::SelfLike {
            user: user_id,
            resource: "article",
            id,
        });
        return Err(e.into());
    }

    let outcome = state.db.likes.toggle_article_like(user_id, id).await?;
    match outcome {
        LikeOutcome::Liked => state.audit.record(AuditEvent::ArticleLiked {
            user: user_id,
            article_id: id,
        }),
        LikeOutcome::Unliked => state.audit.record(AuditEvent::ArticleUnliked {
            user: user_id,
            article_id: id,
        }),
        LikeOutcome::AlreadyLiked => {}
    }

    let like_count = state.db.likes.count_article_likes(id).await?;
    Ok(Json(LikeResponse {
        outcome,
        liked: outcome.is_liked(),
        like_count,
    }))
}

pub async fn toggle_comment_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeResponse>, ApiError> {
    let user_id = user.user_id();
    let comment = state
        .db
        .comments
        .fetch(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Comment {} not found", id)))?;
    visible_article(&state, comment.article_id, user_id).await?;

    if let Err(e) = ensure_not_self_like(&comment.author, user_id) {
        state.audit.record(AuditEvent::SelfLike {
            user: user_id,
            resource: "comment",
            id,
        });
        return Err(e.into());
    }

    let outcome = state.db.likes.toggle_comment_like(user_id, id).await?;
    match outcome {
        LikeOutcome::Liked => state.audit.record(AuditEvent::CommentLiked {
            user: user_id,
            comment_id: id,
        }),
        LikeOutcome::Unliked => state.audit.record(AuditEvent::CommentUnliked {
            user: user_id,
            comment_id: id,
        }),
        LikeOutcome::AlreadyLiked => {}
    }

    let like_count = state.db.likes.count_comment_likes(id).await?;
    Ok(Json(LikeResponse {
        outcome,
        liked: outcome.is_liked(),
        like_count,
    }))
}
