//! Agent identity domain types
//!
//! Identifies a single agent process to the orchestrator. Loaded once at
//! startup from configuration and never mutated afterwards.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static AGENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]{2,63}$").unwrap());
static TENANT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{2,63}$").unwrap());

/// The kind of work an agent is configured to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Sensor,
    Action,
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentType::Sensor => write!(f, "sensor"),
            AgentType::Action => write!(f, "action"),
        }
    }
}

/// Deployment environment the agent is running in.
///
/// `Prod` is special-cased by the transport layer: insecure TLS
/// verification is refused outright when this is the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => write!(f, "dev"),
            Environment::Staging => write!(f, "staging"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

/// Errors produced validating an [`AgentIdentity`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("agent id '{0}' does not match the required pattern")]
    InvalidAgentId(String),
    #[error("tenant id '{0}' does not match the required pattern")]
    InvalidTenantId(String),
    #[error("agent id and tenant id must not be equal")]
    IdEqualsTenant,
}

/// Immutable identity of this agent, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub tenant_id: String,
    pub agent_type: AgentType,
    pub environment: Environment,
    pub version: String,
}

impl AgentIdentity {
    /// Builds an identity, enforcing the invariants of the data model:
    /// the id and tenant id must each match their regex, and must differ.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        agent_type: AgentType,
        environment: Environment,
        version: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let id = id.into();
        let tenant_id = tenant_id.into();

        if !AGENT_ID_RE.is_match(&id) {
            return Err(IdentityError::InvalidAgentId(id));
        }
        if !TENANT_ID_RE.is_match(&tenant_id) {
            return Err(IdentityError::InvalidTenantId(tenant_id));
        }
        if id == tenant_id {
            return Err(IdentityError::IdEqualsTenant);
        }

        Ok(Self {
            id,
            tenant_id,
            agent_type,
            environment,
            version: version.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identity() {
        let identity = AgentIdentity::new(
            "agent-001",
            "tenant-acme",
            AgentType::Action,
            Environment::Prod,
            "1.0.0",
        )
        .unwrap();
        assert_eq!(identity.id, "agent-001");
    }

    #[test]
    fn rejects_short_agent_id() {
        let err =
            AgentIdentity::new("ab", "tenant-acme", AgentType::Sensor, Environment::Dev, "1.0.0")
                .unwrap_err();
        assert_eq!(err, IdentityError::InvalidAgentId("ab".to_string()));
    }

    #[test]
    fn rejects_tenant_id_with_underscore() {
        let err = AgentIdentity::new(
            "agent-001",
            "tenant_acme",
            AgentType::Sensor,
            Environment::Dev,
            "1.0.0",
        )
        .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidTenantId(_)));
    }

    #[test]
    fn rejects_id_equal_to_tenant() {
        let err = AgentIdentity::new(
            "same-name",
            "same-name",
            AgentType::Sensor,
            Environment::Dev,
            "1.0.0",
        )
        .unwrap_err();
        assert_eq!(err, IdentityError::IdEqualsTenant);
    }
}
