//! Auth token domain type

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque bearer token, with an optional expiry.
///
/// The `Bearer ` prefix is stripped on ingest, matching how the value is
/// attached to outgoing requests. `Debug` is hand-written so the token
/// never appears in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthToken {
    token: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AuthToken {
    /// Builds a token from raw input, stripping a leading `Bearer ` prefix
    /// if present and rejecting empty tokens.
    pub fn new(raw: impl Into<String>, expires_at: Option<chrono::DateTime<chrono::Utc>>) -> Self {
        let raw = raw.into();
        let token = raw
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .unwrap_or(raw);
        Self { token, expires_at }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }

    /// Whether the token is expired at `now`, or will be within `skew`.
    pub fn expires_within(&self, now: chrono::DateTime<chrono::Utc>, skew: chrono::Duration) -> bool {
        match self.expires_at {
            Some(exp) => now + skew >= exp,
            None => false,
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bearer_prefix() {
        let token = AuthToken::new("Bearer abc123", None);
        assert_eq!(token.as_str(), "abc123");
    }

    #[test]
    fn leaves_bare_token_untouched() {
        let token = AuthToken::new("abc123", None);
        assert_eq!(token.as_str(), "abc123");
    }

    #[test]
    fn debug_never_prints_token() {
        let token = AuthToken::new("super-secret", None);
        assert!(!format!("{:?}", token).contains("super-secret"));
    }

    #[test]
    fn expires_within_skew_window() {
        let now = chrono::Utc::now();
        let token = AuthToken::new("x", Some(now + chrono::Duration::seconds(30)));
        assert!(token.expires_within(now, chrono::Duration::minutes(1)));
        assert!(!token.expires_within(now, chrono::Duration::seconds(5)));
    }
}
