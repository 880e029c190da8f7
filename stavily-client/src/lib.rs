//! Stavily Orchestrator Client
//!
//! A type-safe HTTP client for the agent's communication with the
//! Orchestrator: heartbeats, instruction polling, result submission, and
//! the legacy task-API aliases kept for older deployments.
//!
//! # Example
//!
//! ```no_run
//! use stavily_client::{OrchestratorClient, OrchestratorClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new(OrchestratorClientConfig::default())?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod error;
pub mod heartbeat;
pub mod instructions;
pub mod legacy;
pub mod rate_limit;
pub mod tls;
pub mod transport;

pub use auth::{AuthProvider, SelfSignedJwtProvider, SharedAuthProvider, StaticTokenProvider};
pub use error::{ClientError, Result};
pub use rate_limit::RateLimiter;
pub use tls::TlsConfig;
pub use transport::{RetryPolicy, Transport};

use std::sync::Arc;

use reqwest::ClientBuilder;
use stavily_core::domain::identity::Environment;

/// Construction parameters for an [`OrchestratorClient`].
pub struct OrchestratorClientConfig {
    pub base_url: String,
    pub agent_id: String,
    pub environment: Environment,
    pub rate_limit_per_sec: f64,
    pub retry: RetryPolicy,
    pub tls: TlsConfig,
    pub auth: SharedAuthProvider,
}

impl Default for OrchestratorClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8443".to_string(),
            agent_id: String::new(),
            environment: Environment::Dev,
            rate_limit_per_sec: 10.0,
            retry: RetryPolicy::default(),
            tls: TlsConfig::default(),
            auth: Arc::new(StaticTokenProvider::ApiKey(String::new())),
        }
    }
}

/// HTTP client for the Orchestrator API.
///
/// Wraps a [`Transport`] with the configured rate limiter, retry policy,
/// auth provider and TLS settings, and exposes the endpoint groups:
/// heartbeats, instruction polling/reporting, and legacy task aliases.
#[derive(Clone)]
pub struct OrchestratorClient {
    transport: Transport,
    agent_id: String,
}

impl OrchestratorClient {
    pub fn new(config: OrchestratorClientConfig) -> Result<Self> {
        let builder = config.tls.apply(ClientBuilder::new(), config.environment)?;
        let http = builder.build().map_err(ClientError::TransportIO)?;
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_sec));
        let transport = Transport::new(
            http,
            config.base_url,
            rate_limiter,
            config.auth,
            config.retry,
        );
        Ok(Self {
            transport,
            agent_id: config.agent_id,
        })
    }

    /// Builds a client around an already-configured `Transport`, used by
    /// tests that need to point at an `httpmock` server.
    pub fn with_transport(transport: Transport, agent_id: impl Into<String>) -> Self {
        Self {
            transport,
            agent_id: agent_id.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Builds an `/agents/v1/{agent_id}/...`-scoped path.
    pub(crate) fn agent_path(&self, suffix: &str) -> String {
        format!("/agents/v1/{}{suffix}", self.agent_id)
    }
}
