//! Server configuration loaded from the environment.
//!
//! `AppConfig::from_env` reads the process environment (after `.env` has been
//! loaded by the binary). `AppConfig::from_lookup` takes any lookup function so
//! parsing can be tested without touching process state.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

use kbase_core::defaults;
use kbase_core::{FileRules, IdentityConfig, Result};

/// Multipart framing allowance on top of the per-file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Runtime configuration for the server and the maintenance binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub system_title: String,
    pub upload_dir: PathBuf,
    pub max_file_size_mb: u64,
    /// Comma-separated extension allow-list.
    pub allowed_file_extensions: String,
    pub user_id_header_name: String,
    pub default_user_id: String,
    pub user_id_pattern: String,
    /// `None` leaves `/api/v1` open.
    pub api_key: Option<String>,
    pub api_key_header_name: String,
    pub popular_articles_count: usize,
    pub audit_log_dir: PathBuf,
    pub audit_log_filename: String,
    /// Zero disables the background cleanup task.
    pub cleanup_interval_secs: u64,
    pub display_utc_offset_hours: i32,
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Missing or malformed values fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let api_key = lookup("API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let allowed_origins = string("ALLOWED_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            database_url: string("DATABASE_URL", "postgres://localhost/kbase"),
            host: string("HOST", "0.0.0.0"),
            port: parse_or(&lookup, "PORT", defaults::SERVER_PORT),
            system_title: string("SYSTEM_TITLE", defaults::SYSTEM_TITLE),
            upload_dir: PathBuf::from(string("UPLOAD_DIR", "./uploads")),
            max_file_size_mb: parse_or(&lookup, "MAX_FILE_SIZE_MB", defaults::MAX_FILE_SIZE_MB),
            allowed_file_extensions: string(
                "ALLOWED_FILE_EXTENSIONS",
                defaults::ALLOWED_FILE_EXTENSIONS,
            ),
            user_id_header_name: string("USER_ID_HEADER_NAME", defaults::USER_ID_HEADER_NAME),
            default_user_id: string("DEFAULT_USER_ID", defaults::DEFAULT_USER_ID),
            user_id_pattern: string("USER_ID_PATTERN", defaults::USER_ID_PATTERN),
            api_key,
            api_key_header_name: string("API_KEY_HEADER_NAME", defaults::API_KEY_HEADER_NAME),
            popular_articles_count: parse_or(
                &lookup,
                "POPULAR_ARTICLES_COUNT",
                defaults::POPULAR_ARTICLES_COUNT,
            ),
            audit_log_dir: PathBuf::from(string("AUDIT_LOG_DIR", "./logs")),
            audit_log_filename: string("AUDIT_LOG_FILENAME", "audit.log"),
            cleanup_interval_secs: parse_or(
                &lookup,
                "CLEANUP_INTERVAL_SECS",
                defaults::CLEANUP_INTERVAL_SECS,
            ),
            display_utc_offset_hours: parse_or(&lookup, "DISPLAY_UTC_OFFSET_HOURS", 0),
            allowed_origins,
        }
    }

    /// Identity resolution settings. Fails if the pattern is not a valid regex.
    pub fn identity(&self) -> Result<IdentityConfig> {
        IdentityConfig::new(
            &self.user_id_header_name,
            &self.default_user_id,
            &self.user_id_pattern,
        )
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn file_rules(&self) -> FileRules {
        FileRules::new(&self.allowed_file_extensions, self.max_file_bytes())
    }

    /// Largest accepted request body.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_file_bytes())
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD_BYTES)
    }

    /// Offset used for `/api/v1` timestamp strings. Out-of-range values mean UTC.
    pub fn display_offset(&self) -> FixedOffset {
        self.display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }

    /// CORS allow-list. Unparseable origins are skipped with a warning.
    pub fn cors_origins(&self) -> Vec<HeaderValue> {
        self.allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", origin, e);
                    None
                }
            })
            .collect()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring malformed configuration value");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.user_id_header_name, "X-User-ID");
        assert_eq!(config.default_user_id, "anonymous");
        assert_eq!(config.api_key, None);
        assert_eq!(config.api_key_header_name, "X-API-Key");
        assert_eq!(config.popular_articles_count, 5);
        assert_eq!(config.max_file_bytes(), 16 * 1024 * 1024);
        assert_eq!(config.cleanup_interval(), Some(Duration::from_secs(3600)));
        assert_eq!(config.system_title, "Knowledge Base");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("API_KEY", "secret"),
            ("MAX_FILE_SIZE_MB", "2"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("CLEANUP_INTERVAL_SECS", "0"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.max_file_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.cleanup_interval(), None);
    }

    #[test]
    fn test_malformed_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("POPULAR_ARTICLES_COUNT", "-3")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.popular_articles_count, 5);
    }

    #[test]
    fn test_blank_api_key_means_open() {
        let config = config_from(&[("API_KEY", "   ")]);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = config_from(&[("USER_ID_PATTERN", "([a-z")]);
        assert!(config.identity().is_err());
    }

    #[test]
    fn test_display_offset() {
        let tokyo = config_from(&[("DISPLAY_UTC_OFFSET_HOURS", "9")]);
        assert_eq!(tokyo.display_offset().local_minus_utc(), 9 * 3600);

        let silly = config_from(&[("DISPLAY_UTC_OFFSET_HOURS", "40")]);
        assert_eq!(silly.display_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_body_limit_exceeds_file_limit() {
        let config = AppConfig::default();
        assert!(config.body_limit() as u64 > config.max_file_bytes());
    }
}
