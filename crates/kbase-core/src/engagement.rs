//! Engagement statistics: per-article view, like and comment counts.
//!
//! The store runs one grouped query per metric; the helpers here turn those
//! grouped rows into a map keyed by every requested article id and rank
//! articles by a single metric.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// View, like and comment counts for one article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementStats {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

/// Engagement per article id.
pub type EngagementMap = HashMap<Uuid, EngagementStats>;

/// Metric used for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Views,
    Likes,
    Comments,
}

impl EngagementStats {
    pub fn get(&self, metric: Metric) -> i64 {
        match metric {
            Metric::Views => self.views,
            Metric::Likes => self.likes,
            Metric::Comments => self.comments,
        }
    }
}

/// Lower bound of a trailing window of `days` days ending at `now`.
///
/// `None` means unbounded. Non-positive windows are rejected.
pub fn window_start(days: Option<i64>, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    match days {
        None => Ok(None),
        Some(d) if d <= 0 => Err(Error::InvalidInput(format!(
            "days must be positive, got {}",
            d
        ))),
        Some(d) => Duration::try_days(d)
            .and_then(|span| now.checked_sub_signed(span))
            .map(Some)
            .ok_or_else(|| Error::InvalidInput(format!("days out of range: {}", d))),
    }
}

/// Build the result map from grouped `(article_id, count)` rows.
///
/// Every id in `ids` appears exactly once, defaulting to zero counts. Rows
/// for ids that were not requested are ignored and negative counts clamp
/// to zero.
pub fn merge_grouped_counts<V, L, C>(ids: &[Uuid], views: V, likes: L, comments: C) -> EngagementMap
where
    V: IntoIterator<Item = (Uuid, i64)>,
    L: IntoIterator<Item = (Uuid, i64)>,
    C: IntoIterator<Item = (Uuid, i64)>,
{
    let mut map: EngagementMap = ids
        .iter()
        .map(|id| (*id, EngagementStats::default()))
        .collect();

    for (id, n) in views {
        if let Some(stats) = map.get_mut(&id) {
            stats.views = n.max(0);
        }
    }
    for (id, n) in likes {
        if let Some(stats) = map.get_mut(&id) {
            stats.likes = n.max(0);
        }
    }
    for (id, n) in comments {
        if let Some(stats) = map.get_mut(&id) {
            stats.comments = n.max(0);
        }
    }

    map
}

/// Rank `ids` by one metric, highest first, keeping input order on ties,
/// and keep the first `limit`.
pub fn top_by(
    ids: &[Uuid],
    stats: &EngagementMap,
    metric: Metric,
    limit: usize,
) -> Vec<(Uuid, EngagementStats)> {
    let mut ranked: Vec<(Uuid, EngagementStats)> = ids
        .iter()
        .map(|id| (*id, stats.get(id).copied().unwrap_or_default()))
        .collect();
    ranked.sort_by(|a, b| b.1.get(metric).cmp(&a.1.get(metric)));
    ranked.truncate(limit);
    ranked
}

/// Authors may not like their own articles or comments.
pub fn ensure_not_self_like(author: &str, user_id: &str) -> Result<()> {
    if author == user_id {
        return Err(Error::Forbidden(
            "You cannot like your own content".to_string(),
        ));
    }
    Ok(())
}
