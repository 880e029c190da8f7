//! Authentication providers for the Orchestrator Client.
//!
//! Two modes are supported, selected by configuration:
//! - Static: a fixed API key, or a token re-read from a file on disk.
//! - Self-signed JWT: the agent mints and signs its own bearer token with
//!   a shared secret, caching it until shortly before expiry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use stavily_core::domain::auth::AuthToken;
use tokio::sync::RwLock;

use crate::error::{ClientError, Result};

/// Skew window before expiry at which a cached JWT is recomputed.
const JWT_REFRESH_SKEW_SECS: i64 = 60;

/// Supplies the bearer token attached to every outbound request.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn token(&self) -> Result<AuthToken>;
}

/// A fixed API key, or a token re-read from a file path on every call.
pub enum StaticTokenProvider {
    ApiKey(String),
    TokenFile(PathBuf),
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn token(&self) -> Result<AuthToken> {
        match self {
            StaticTokenProvider::ApiKey(key) => Ok(AuthToken::new(key.clone(), None)),
            StaticTokenProvider::TokenFile(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ClientError::AuthFailure(format!(
                        "failed to read token file {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(AuthToken::new(contents.trim().to_string(), None))
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    aud: String,
    tenant: String,
    iat: i64,
    nbf: i64,
    exp: i64,
}

/// Mints a self-signed HS/RS-family JWT for each request, recomputing it
/// only once the cached token is within [`JWT_REFRESH_SKEW_SECS`] of
/// expiry. A `tokio::sync::RwLock` guards the cache with the standard
/// double-checked read-then-write pattern.
pub struct SelfSignedJwtProvider {
    agent_id: String,
    tenant_id: String,
    audience: String,
    algorithm: Algorithm,
    key: EncodingKey,
    ttl_secs: i64,
    cached: RwLock<Option<AuthToken>>,
}

impl SelfSignedJwtProvider {
    /// `audience` identifies the Orchestrator this token is minted for
    /// (its base URL); `iss`/`sub` are both the agent id, since the agent
    /// signs its own token.
    pub fn new(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        audience: impl Into<String>,
        algorithm: Algorithm,
        secret: &[u8],
        ttl_secs: i64,
    ) -> Self {
        let key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                EncodingKey::from_secret(secret)
            }
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                EncodingKey::from_rsa_pem(secret).expect("valid RSA PEM key")
            }
            other => panic!("unsupported JWT algorithm: {other:?}"),
        };
        Self {
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            audience: audience.into(),
            algorithm,
            key,
            ttl_secs,
            cached: RwLock::new(None),
        }
    }

    fn mint(&self) -> Result<AuthToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClientError::AuthFailure(e.to_string()))?
            .as_secs() as i64;
        let claims = Claims {
            iss: self.agent_id.clone(),
            sub: self.agent_id.clone(),
            aud: self.audience.clone(),
            tenant: self.tenant_id.clone(),
            iat: now,
            nbf: now,
            exp: now + self.ttl_secs,
        };
        let header = Header::new(self.algorithm);
        let token = encode(&header, &claims, &self.key)
            .map_err(|e| ClientError::AuthFailure(format!("jwt signing failed: {e}")))?;
        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0);
        Ok(AuthToken::new(token, expires_at))
    }
}

#[async_trait]
impl AuthProvider for SelfSignedJwtProvider {
    async fn token(&self) -> Result<AuthToken> {
        let now = chrono::Utc::now();
        {
            let guard = self.cached.read().await;
            if let Some(tok) = guard.as_ref() {
                if !tok.expires_within(now, chrono::Duration::seconds(JWT_REFRESH_SKEW_SECS)) {
                    return Ok(tok.clone());
                }
            }
        }

        let mut guard = self.cached.write().await;
        if let Some(tok) = guard.as_ref() {
            if !tok.expires_within(now, chrono::Duration::seconds(JWT_REFRESH_SKEW_SECS)) {
                return Ok(tok.clone());
            }
        }
        let fresh = self.mint()?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }
}

/// Builds the configured [`AuthProvider`]. A `token_file` setting takes
/// precedence over JWT configuration; configuring both is a config error
/// surfaced by the caller, not silently resolved here.
pub type SharedAuthProvider = Arc<dyn AuthProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_api_key_is_returned_verbatim() {
        let provider = StaticTokenProvider::ApiKey("secret-key".to_string());
        let token = provider.token().await.unwrap();
        assert_eq!(token.as_str(), "secret-key");
    }

    #[tokio::test]
    async fn jwt_provider_caches_until_near_expiry() {
        let provider = SelfSignedJwtProvider::new(
            "agent-1",
            "tenant-1",
            "https://orchestrator.test",
            Algorithm::HS256,
            b"test-secret",
            3600,
        );
        let first = provider.token().await.unwrap();
        let second = provider.token().await.unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[tokio::test]
    async fn jwt_provider_recomputes_near_expiry() {
        let provider = SelfSignedJwtProvider::new(
            "agent-1",
            "tenant-1",
            "https://orchestrator.test",
            Algorithm::HS256,
            b"secret",
            30,
        );
        let first = provider.token().await.unwrap();
        let second = provider.token().await.unwrap();
        // ttl 30s < 60s skew, so every call is within the refresh window
        // and must mint a fresh token each time (signatures embed `iat`).
        assert_ne!(first.as_str(), second.as_str());
    }

    #[tokio::test]
    async fn jwt_carries_standard_claims() {
        let provider = SelfSignedJwtProvider::new(
            "agent-1",
            "tenant-1",
            "https://orchestrator.test",
            Algorithm::HS256,
            b"test-secret",
            3600,
        );
        let token = provider.token().await.unwrap();

        let mut validation = jsonwebtoken::Validation::new(Algorithm::HS256);
        validation.set_audience(&["https://orchestrator.test"]);
        let decoded = jsonwebtoken::decode::<Claims>(
            token.as_str(),
            &jsonwebtoken::DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.iss, "agent-1");
        assert_eq!(decoded.claims.sub, "agent-1");
        assert_eq!(decoded.claims.aud, "https://orchestrator.test");
        assert_eq!(decoded.claims.tenant, "tenant-1");
        assert!(decoded.claims.nbf <= decoded.claims.iat);
        assert!(decoded.claims.exp > decoded.claims.iat);
    }
}
