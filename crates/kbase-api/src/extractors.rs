//! Request extractors.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use kbase_core::ResolvedIdentity;

use crate::audit::AuditEvent;
use crate::AppState;

/// Caller identity taken from the configured user id header.
///
/// Never rejects: an absent or malformed header resolves to the default
/// user. Malformed values are logged and written to the audit trail.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: ResolvedIdentity,
}

impl CurrentUser {
    pub fn user_id(&self) -> &str {
        self.identity.user().as_str()
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let config = &state.identity;
        let identity = match parts.headers.get(config.header_name()) {
            None => config.resolve(None),
            Some(value) => match value.to_str() {
                Ok(raw) => config.resolve(Some(raw)),
                Err(_) => ResolvedIdentity::Fallback {
                    user: config.resolve(None).into_user(),
                    rejected: Some(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                },
            },
        };

        if let Some(rejected) = identity.rejected() {
            warn!(
                subsystem = "api",
                component = "identity",
                header = config.header_name(),
                "Invalid user ID format, falling back to default"
            );
            state.audit.record(AuditEvent::InvalidUserId {
                value: rejected,
                pattern: config.pattern(),
            });
        }

        Ok(Self { identity })
    }
}
