//! Header-derived caller identity.
//!
//! There is no login flow: a trusted proxy puts the user id in a header.
//! [`IdentityConfig::resolve`] validates the raw value and always yields a
//! usable identity, falling back to the configured default.

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::defaults;
use crate::{Error, Result};

/// A user id that passed validation or is the configured default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of resolving the identity header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIdentity {
    /// Header present and matched the pattern.
    Validated(UserId),
    /// Header absent (`rejected == None`) or invalid (`rejected == Some(raw)`).
    Fallback {
        user: UserId,
        rejected: Option<String>,
    },
}

impl ResolvedIdentity {
    pub fn user(&self) -> &UserId {
        match self {
            ResolvedIdentity::Validated(user) => user,
            ResolvedIdentity::Fallback { user, .. } => user,
        }
    }

    pub fn into_user(self) -> UserId {
        match self {
            ResolvedIdentity::Validated(user) => user,
            ResolvedIdentity::Fallback { user, .. } => user,
        }
    }

    pub fn is_validated(&self) -> bool {
        matches!(self, ResolvedIdentity::Validated(_))
    }

    /// The raw header value that failed validation, if any.
    pub fn rejected(&self) -> Option<&str> {
        match self {
            ResolvedIdentity::Fallback { rejected, .. } => rejected.as_deref(),
            ResolvedIdentity::Validated(_) => None,
        }
    }
}

/// Identity header name, default identity and accepted format.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    header_name: String,
    default_user_id: String,
    pattern: Regex,
}

impl IdentityConfig {
    /// Fails with [`Error::Config`] when `pattern` is not a valid regex.
    pub fn new(
        header_name: impl Into<String>,
        default_user_id: impl Into<String>,
        pattern: &str,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid user id pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            header_name: header_name.into(),
            default_user_id: default_user_id.into(),
            pattern,
        })
    }

    /// Built-in header, default id and pattern.
    pub fn standard() -> Result<Self> {
        Self::new(
            defaults::USER_ID_HEADER_NAME,
            defaults::DEFAULT_USER_ID,
            defaults::USER_ID_PATTERN,
        )
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn default_user_id(&self) -> &str {
        &self.default_user_id
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// The default id is accepted even if it does not match the pattern.
    pub fn is_valid(&self, candidate: &str) -> bool {
        candidate == self.default_user_id || self.pattern.is_match(candidate)
    }

    pub fn resolve(&self, raw: Option<&str>) -> ResolvedIdentity {
        match raw {
            None => ResolvedIdentity::Fallback {
                user: self.default_user(),
                rejected: None,
            },
            Some(value) if self.is_valid(value) => {
                ResolvedIdentity::Validated(UserId(value.to_string()))
            }
            Some(value) => ResolvedIdentity::Fallback {
                user: self.default_user(),
                rejected: Some(value.to_string()),
            },
        }
    }

    fn default_user(&self) -> UserId {
        UserId(self.default_user_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IdentityConfig {
        IdentityConfig::standard().unwrap()
    }

    #[test]
    fn test_valid_header_is_validated() {
        let resolved = config().resolve(Some("alice_01"));
        assert!(resolved.is_validated());
        assert_eq!(resolved.user().as_str(), "alice_01");
        assert_eq!(resolved.rejected(), None);
    }

    #[test]
    fn test_missing_header_falls_back_without_rejection() {
        let resolved = config().resolve(None);
        assert!(!resolved.is_validated());
        assert_eq!(resolved.user().as_str(), "anonymous");
        assert_eq!(resolved.rejected(), None);
    }

    #[test]
    fn test_invalid_header_falls_back_and_reports_value() {
        for raw in ["ab", "has space", "x".repeat(21).as_str(), "semi;colon", ""] {
            let resolved = config().resolve(Some(raw));
            assert_eq!(resolved.user().as_str(), "anonymous", "raw = {:?}", raw);
            assert_eq!(resolved.rejected(), Some(raw));
        }
    }

    #[test]
    fn test_boundary_lengths() {
        let cfg = config();
        assert!(cfg.is_valid("abc"));
        assert!(cfg.is_valid(&"z".repeat(20)));
        assert!(!cfg.is_valid(&"z".repeat(21)));
    }

    #[test]
    fn test_default_id_accepted_even_if_pattern_rejects_it() {
        let cfg = IdentityConfig::new("X-User", "guest user", r"^[a-z]+$").unwrap();
        assert!(cfg.resolve(Some("guest user")).is_validated());
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = IdentityConfig::new("X-User-ID", "anonymous", "([unclosed").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_into_user() {
        let user = config().resolve(Some("bob_smith")).into_user();
        assert_eq!(user.to_string(), "bob_smith");
    }
}
