//! Read-only `/api/v1` routes over published articles.
//!
//! Responses use a status envelope: `{"status": "success", "data": ...}` or
//! `{"status": "error", "message": ...}`. Timestamps are rendered as
//! `YYYY-MM-DD HH:MM:SS` in the configured display offset.

use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use kbase_core::defaults::{
    API_PAGE_LIMIT, API_PAGE_LIMIT_MAX, PAGE_OFFSET, POPULAR_DAYS, POPULAR_DAYS_MAX,
};
use kbase_core::engagement::top_by;
use kbase_core::{
    ArticleCard, ArticleRepository, EngagementRepository, Metric, PublishedQuery, TagRef,
    TagRepository,
};

use super::decorate_articles;
use crate::query_types::{clamp_or, lenient_i64, parse_since};
use crate::{ApiError, AppState};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// ENVELOPE
// =============================================================================

/// `{"status": "error", "message": ...}` with the given status code.
pub fn v1_error(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(json!({
            "status": "error",
            "message": message,
        })),
    )
        .into_response()
}

fn success<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": data,
    }))
}

/// [`ApiError`] rendered in the `/api/v1` envelope.
#[derive(Debug)]
pub struct V1Error(ApiError);

impl From<ApiError> for V1Error {
    fn from(err: ApiError) -> Self {
        V1Error(err)
    }
}

impl From<kbase_core::Error> for V1Error {
    fn from(err: kbase_core::Error) -> Self {
        V1Error(err.into())
    }
}

impl IntoResponse for V1Error {
    fn into_response(self) -> Response {
        let (status, message) = self.0.into_parts();
        v1_error(status, message)
    }
}

type V1Result = Result<Json<serde_json::Value>, V1Error>;

// =============================================================================
// SERIALIZATION
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ArticleJson {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_at: String,
    pub updated_at: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub attachment_count: i64,
    pub tags: Vec<TagRef>,
    pub is_draft: bool,
}

fn display(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format(DISPLAY_FORMAT).to_string()
}

impl ArticleJson {
    pub fn from_card(card: ArticleCard, offset: FixedOffset) -> Self {
        let article = card.article;
        Self {
            id: article.id,
            title: article.title,
            content: article.content,
            author: article.author,
            created_at: display(article.created_at, offset),
            updated_at: display(article.updated_at, offset),
            like_count: card.like_count,
            comment_count: card.comment_count,
            attachment_count: card.attachment_count,
            tags: card.tags,
            is_draft: article.is_draft,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PopularArticleJson {
    #[serde(flatten)]
    pub article: ArticleJson,
    pub recent_views: i64,
    pub recent_likes: i64,
    pub recent_comments: i64,
}

#[derive(Debug, Serialize)]
pub struct TagJson {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub usage_count: i32,
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub offset: Option<i64>,
    pub author: Option<String>,
    pub tag: Option<String>,
    pub since: Option<String>,
}

/// Published articles, most recently updated first.
pub async fn latest_articles(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> V1Result {
    let since = parse_since(params.since.as_deref()).map_err(ApiError::BadRequest)?;
    let limit = clamp_or(params.limit, API_PAGE_LIMIT, 1, API_PAGE_LIMIT_MAX);
    let offset = params.offset.unwrap_or(PAGE_OFFSET).max(0);

    let page = state
        .db
        .articles
        .list_published(&PublishedQuery {
            author: params.author,
            tag: params.tag,
            since,
            limit,
            offset,
        })
        .await?;

    let offset_tz = state.config.display_offset();
    let articles: Vec<ArticleJson> = decorate_articles(&state, page.items)
        .await?
        .into_iter()
        .map(|card| ArticleJson::from_card(card, offset_tz))
        .collect();

    Ok(success(json!({
        "articles": articles,
        "pagination": {
            "total": page.total,
            "limit": limit,
            "offset": offset,
            "has_more": offset + limit < page.total,
        },
    })))
}

/// One published article. Drafts are reported as missing.
pub async fn get_article(State(state): State<AppState>, Path(id): Path<Uuid>) -> V1Result {
    let article = state
        .db
        .articles
        .fetch(id)
        .await?
        .filter(|article| !article.is_draft)
        .ok_or_else(|| ApiError::NotFound("Article not found".to_string()))?;

    let card = decorate_articles(&state, vec![article])
        .await?
        .pop()
        .ok_or_else(|| ApiError::NotFound("Article not found".to_string()))?;

    Ok(success(ArticleJson::from_card(
        card,
        state.config.display_offset(),
    )))
}

pub async fn list_tags(State(state): State<AppState>) -> V1Result {
    let tags: Vec<TagJson> = state
        .db
        .tags
        .list_all()
        .await?
        .into_iter()
        .map(|tag| TagJson {
            id: tag.id,
            name: tag.name,
            color: tag.color,
            usage_count: tag.usage_count,
        })
        .collect();

    Ok(success(json!({ "tags": tags })))
}

#[derive(Debug, Deserialize)]
pub struct PopularParams {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub days: Option<i64>,
}

/// Top published articles by views, likes and comments over the last
/// `days` days, each list ranked independently.
pub async fn popular_articles(
    State(state): State<AppState>,
    Query(params): Query<PopularParams>,
) -> V1Result {
    let default_limit = i64::try_from(state.config.popular_articles_count).unwrap_or(i64::MAX);
    let limit = clamp_or(params.limit, default_limit, 1, API_PAGE_LIMIT_MAX);
    let days = clamp_or(params.days, POPULAR_DAYS, 1, POPULAR_DAYS_MAX);
    let top_n = usize::try_from(limit).unwrap_or(0);

    let ids = state.db.articles.published_ids().await?;
    let stats = state
        .db
        .engagement
        .get_bulk_engagement_stats(&ids, Some(days))
        .await?;

    let rankings = [Metric::Views, Metric::Likes, Metric::Comments]
        .map(|metric| top_by(&ids, &stats, metric, top_n));

    let mut wanted: Vec<Uuid> = Vec::new();
    let mut seen = HashSet::new();
    for (id, _) in rankings.iter().flatten() {
        if seen.insert(*id) {
            wanted.push(*id);
        }
    }

    let offset_tz = state.config.display_offset();
    let articles = state.db.articles.fetch_many(&wanted).await?;
    let by_id: HashMap<Uuid, ArticleJson> = decorate_articles(&state, articles)
        .await?
        .into_iter()
        .map(|card| (card.article.id, ArticleJson::from_card(card, offset_tz)))
        .collect();

    let [by_views, by_likes, by_comments] = rankings.map(|ranked| {
        ranked
            .into_iter()
            .filter_map(|(id, recent)| {
                by_id.get(&id).map(|article| PopularArticleJson {
                    article: article.clone(),
                    recent_views: recent.views,
                    recent_likes: recent.likes,
                    recent_comments: recent.comments,
                })
            })
            .collect::<Vec<_>>()
    });

    Ok(success(json!({
        "top_by_views": by_views,
        "top_by_likes": by_likes,
        "top_by_comments": by_comments,
        "period_days": days,
        "limit": limit,
    })))
}

/// Liveness probe. Never requires the API key.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "message": format!("{} API is running", state.config.system_title),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kbase_core::Article;

    fn card() -> ArticleCard {
        let ts = Utc.with_ymd_and_hms(2026, 3, 10, 22, 15, 0).unwrap();
        ArticleCard {
            article: Article {
                id: Uuid::nil(),
                title: "Title".to_string(),
                content: "Body".to_string(),
                author: "alice".to_string(),
                is_draft: false,
                created_at: ts,
                updated_at: ts,
            },
            tags: vec![],
            view_count: 4,
            like_count: 2,
            comment_count: 1,
            attachment_count: 0,
        }
    }

    #[test]
    fn test_article_json_uses_display_offset() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let json = ArticleJson::from_card(card(), tokyo);
        assert_eq!(json.created_at, "2026-03-11 07:15:00");
        assert_eq!(json.like_count, 2);
        assert!(!json.is_draft);
    }

    #[test]
    fn test_popular_item_flattens_article() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let item = PopularArticleJson {
            article: ArticleJson::from_card(card(), utc),
            recent_views: 3,
            recent_likes: 1,
            recent_comments: 0,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["title"], "Title");
        assert_eq!(value["recent_views"], 3);
        assert_eq!(value["updated_at"], "2026-03-10 22:15:00");
    }

    #[test]
    fn test_v1_error_envelope_status() {
        let response = V1Error::from(ApiError::NotFound("gone".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
