//! HTTP handlers for kbase-api.
//!
//! Web routes render `{"error": ...}` on failure; the read-only `/api/v1`
//! routes use the `{"status": ..., "data"|"message": ...}` envelope from
//! [`public_api`].

pub mod admin;
pub mod articles;
pub mod attachments;
pub mod comments;
pub mod likes;
pub mod public_api;

use kbase_core::{
    Article, ArticleCard, ArticleRepository, AttachmentRepository, EngagementRepository,
};
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Decorate articles with tags, attachment counts and lifetime engagement
/// counts, using one aggregator call for the whole batch.
pub(crate) async fn decorate_articles(
    state: &AppState,
    articles: Vec<Article>,
) -> Result<Vec<ArticleCard>, ApiError> {
    if articles.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = articles.iter().map(|a| a.id).collect();
    let stats = state
        .db
        .engagement
        .get_bulk_engagement_stats(&ids, None)
        .await?;
    let mut tags = state.db.articles.tags_for(&ids).await?;
    let attachments = state.db.attachments.count_for(&ids).await?;

    let cards = articles
        .into_iter()
        .map(|article| {
            let counts = stats.get(&article.id).copied().unwrap_or_default();
            ArticleCard {
                tags: tags.remove(&article.id).unwrap_or_default(),
                view_count: counts.views,
                like_count: counts.likes,
                comment_count: counts.comments,
                attachment_count: attachments.get(&article.id).copied().unwrap_or(0),
                article,
            }
        })
        .collect();

    Ok(cards)
}

/// Fetch an article the caller is allowed to see, or 404.
pub(crate) async fn visible_article(
    state: &AppState,
    id: Uuid,
    user_id: &str,
) -> Result<Article, ApiError> {
    state
        .db
        .articles
        .fetch(id)
        .await?
        .filter(|article| article.is_visible_to(user_id))
        .ok_or_else(|| ApiError::NotFound(format!("Article {} not found", id)))
}
