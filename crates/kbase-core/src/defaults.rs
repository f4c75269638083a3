//! Centralized default constants for kbase.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// PAGINATION
// =============================================================================

/// Articles per page on the web feed and the drafts list.
pub const FEED_PAGE_SIZE: i64 = 10;

/// Default page size for `/api/v1/articles/latest`.
pub const API_PAGE_LIMIT: i64 = 10;

/// Upper bound for any `/api/v1` `limit` parameter.
pub const API_PAGE_LIMIT_MAX: i64 = 100;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;

// =============================================================================
// ENGAGEMENT
// =============================================================================

/// Default size of each popularity ranking.
pub const POPULAR_ARTICLES_COUNT: usize = 5;

/// Default lookback window for popularity rankings, in days.
pub const POPULAR_DAYS: i64 = 30;

/// Longest lookback window accepted by the popularity endpoint, in days.
pub const POPULAR_DAYS_MAX: i64 = 365;

/// Number of tags shown in the feed's popular tag list.
pub const POPULAR_TAGS_COUNT: i64 = 10;

// =============================================================================
// TAGS
// =============================================================================

/// Longest accepted tag name, in characters.
pub const MAX_TAG_NAME_LEN: usize = 50;

/// Colour assigned to newly created tags.
pub const TAG_COLOR: &str = "#007bff";

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Age after which a never-linked upload is purged, in hours.
pub const PENDING_RETENTION_HOURS: i64 = 24;

/// Age after which a file with no database row is deleted, in days.
pub const DANGLING_RETENTION_DAYS: i64 = 7;

/// Default per-file upload limit, in megabytes.
pub const MAX_FILE_SIZE_MB: u64 = 16;

/// Default comma-separated extension allow-list.
pub const ALLOWED_FILE_EXTENSIONS: &str =
    "txt,pdf,doc,docx,xls,xlsx,ppt,pptx,png,jpg,jpeg,gif,svg,webp,zip,rar,7z,csv,json,xml,md";

/// MIME type used when the extension gives no better answer.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Seconds between background reconciliation passes.
pub const CLEANUP_INTERVAL_SECS: u64 = 3600;

// =============================================================================
// IDENTITY
// =============================================================================

/// Header carrying the caller's identity.
pub const USER_ID_HEADER_NAME: &str = "X-User-ID";

/// Identity used when the header is absent or invalid.
pub const DEFAULT_USER_ID: &str = "anonymous";

/// Accepted identity format.
pub const USER_ID_PATTERN: &str = r"^[a-zA-Z0-9_-]{3,20}$";

/// Header carrying the shared secret for `/api/v1`.
pub const API_KEY_HEADER_NAME: &str = "X-API-Key";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default CORS max-age in seconds.
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Default system title shown in API health responses.
pub const SYSTEM_TITLE: &str = "Knowledge Base";

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Maximum pool connections.
pub const POOL_MAX_CONNECTIONS: u32 = 20;

/// Minimum idle connections kept open.
pub const POOL_MIN_CONNECTIONS: u32 = 2;

/// Connection acquire timeout, in seconds.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connection timeout, in seconds.
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;

/// Maximum connection lifetime, in seconds.
pub const POOL_MAX_LIFETIME_SECS: u64 = 1800;
