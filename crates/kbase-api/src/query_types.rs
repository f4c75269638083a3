//! Query parameter helpers with forgiving parsing.
//!
//! Numeric and flag parameters never fail a request: anything unparseable is
//! treated as absent and the handler applies its default. Dates are strict
//! and come back with a message listing the accepted formats.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Formats accepted for `since`, tried in order.
const SINCE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const SINCE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Deserialize an integer parameter, treating malformed input as absent.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct Params {
///     #[serde(default, deserialize_with = "lenient_i64")]
///     limit: Option<i64>,
/// }
/// ```
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

/// Deserialize a checkbox-style flag: `1`, `true`, `on` or `yes`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|s| is_truthy(&s)).unwrap_or(false))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// `value` or `default`, clamped to `min..=max`.
pub fn clamp_or(value: Option<i64>, default: i64, min: i64, max: i64) -> i64 {
    value.unwrap_or(default).clamp(min, max)
}

/// Offset for a 1-based page number. Pages below 1 mean the first page.
pub fn page_offset(page: Option<i64>, per_page: i64) -> i64 {
    page.unwrap_or(1).max(1).saturating_sub(1).saturating_mul(per_page)
}

/// Parse a `since` filter value as a UTC instant.
///
/// Date-only forms mean midnight. Blank input means no filter.
pub fn parse_since(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    let s = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };

    for fmt in SINCE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Some(dt.and_utc()));
        }
    }

    for fmt in SINCE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(Some(midnight.and_utc()));
            }
        }
    }

    Err(format!(
        "Invalid date format for 'since': '{}'. Supported formats: YYYY-MM-DD, \
         YYYY-MM-DD HH:MM:SS, YYYY-MM-DD HH:MM, YYYY/MM/DD, YYYYMMDD",
        s
    ))
}
