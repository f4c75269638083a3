//! Comment routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use kbase_core::{Comment, CommentRepository};

use super::visible_article;
use crate::audit::AuditEvent;
use crate::extractors::CurrentUser;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub content: String,
}

pub async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(article_id): Path<Uuid>,
    Json(form): Json<CommentForm>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let user_id = user.user_id();
    let content = form.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest(
            "Comment content must not be empty".to_string(),
        ));
    }

    visible_article(&state, article_id, user_id).await?;

    let comment = state
        .db
        .comments
        .insert(article_id, user_id, content)
        .await?;

    state.audit.record(AuditEvent::CommentInserted {
        user: user_id,
        comment_id: comment.id,
        article_id,
    });

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Only the comment's author may delete it.
pub async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.user_id();
    let comment = state
        .db
        .comments
        .fetch(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Comment {} not found", id)))?;

    if comment.author != user_id {
        state.audit.record(AuditEvent::UnauthorizedDelete {
            user: user_id,
            resource: "comment",
            id,
            owner: &comment.author,
        });
        return Err(ApiError::Forbidden(
            "Only the author can delete this comment".to_string(),
        ));
    }

    state.db.comments.delete(id).await?;
    state.audit.record(AuditEvent::CommentDeleted {
        user: user_id,
        comment_id: id,
        article_id: comment.article_id,
    });

    Ok(StatusCode::NO_CONTENT)
}
