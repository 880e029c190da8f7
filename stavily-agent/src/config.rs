//! Agent configuration
//!
//! A single YAML document with sections `agent`, `api`,
//! `security.{tls,auth,sandbox,audit}`, `plugins`, `logging`, `metrics`,
//! `health`. Environment variables prefixed `STAVILY_` override file
//! values using `__` as the path separator, e.g.
//! `STAVILY_AGENT__HEARTBEAT=30s`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stavily_core::domain::identity::{AgentType, Environment};

fn default_heartbeat() -> Duration {
    Duration::from_secs(30)
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_max_concurrent_tasks() -> usize {
    5
}
fn default_rate_limit_rps() -> f64 {
    10.0
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> Duration {
    Duration::from_millis(500)
}
fn default_git_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_max_concurrent_installs() -> usize {
    4
}
fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub tenant_id: String,
    pub environment: Environment,
    #[serde(default = "default_heartbeat", with = "humantime_seconds")]
    pub heartbeat: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_seconds")]
    pub poll_interval: Duration,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default)]
    pub supported_instruction_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay", with = "humantime_millis")]
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    ApiKey,
    Jwt,
    Certificate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    pub method: Option<AuthMethod>,
    pub api_key: Option<String>,
    pub token_file: Option<PathBuf>,
    pub jwt_secret_path: Option<PathBuf>,
    pub jwt_algorithm: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsSection {
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
    #[serde(default)]
    pub server_name_override: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSection {
    #[serde(default)]
    pub max_memory_bytes: Option<u64>,
    #[serde(default)]
    pub max_cpu_millis: Option<u32>,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default)]
    pub disable_network: bool,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            max_memory_bytes: None,
            max_cpu_millis: None,
            max_output_bytes: default_max_output_bytes(),
            disable_network: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default)]
    pub tls: TlsSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub audit: AuditSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsSection {
    pub base_folder: PathBuf,
    #[serde(default = "default_git_timeout", with = "humantime_seconds")]
    pub git_timeout: Duration,
    #[serde(default = "default_max_concurrent_installs")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub listen_addr: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub listen_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentSection,
    pub api: ApiSection,
    #[serde(default)]
    pub security: SecuritySection,
    pub plugins: PluginsSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub health: HealthSection,
}

mod humantime_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

mod humantime_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{0}")]
    Validation(String),
}

impl Config {
    /// Loads the YAML document at `path`, then applies `STAVILY_`
    /// environment overrides, then validates.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = serde_yaml::from_str(&text)?;
        config.apply_env_overrides(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Applies `STAVILY_`-prefixed environment overrides for the handful
    /// of fields deployments most commonly need to override without
    /// editing the file: base URL, api key, and heartbeat/poll cadence.
    fn apply_env_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        let overrides: HashMap<String, String> = vars
            .filter_map(|(k, v)| k.strip_prefix("STAVILY_").map(|k| (k.to_string(), v)))
            .collect();

        if let Some(v) = overrides.get("API__BASE_URL") {
            self.api.base_url = v.clone();
        }
        if let Some(v) = overrides.get("SECURITY__AUTH__API_KEY") {
            self.security.auth.api_key = Some(v.clone());
        }
        if let Some(v) = overrides.get("AGENT__HEARTBEAT") {
            if let Ok(secs) = v.parse() {
                self.agent.heartbeat = Duration::from_secs(secs);
            }
        }
        if let Some(v) = overrides.get("AGENT__POLL_INTERVAL") {
            if let Ok(secs) = v.parse() {
                self.agent.poll_interval = Duration::from_secs(secs);
            }
        }
    }

    /// Validates required fields and the configured numeric/duration
    /// ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use stavily_core::domain::identity::AgentIdentity;

        AgentIdentity::new(
            self.agent.id.clone(),
            self.agent.tenant_id.clone(),
            self.agent.agent_type,
            self.agent.environment,
            env!("CARGO_PKG_VERSION"),
        )
        .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.agent.name.is_empty() {
            return Err(ConfigError::Validation("agent.name must not be empty".to_string()));
        }

        if self.agent.environment == Environment::Prod && !self.api.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "api.base_url must use https:// in prod".to_string(),
            ));
        }

        let heartbeat_secs = self.agent.heartbeat.as_secs();
        if !(10..=300).contains(&heartbeat_secs) {
            return Err(ConfigError::Validation(
                "agent.heartbeat must be between 10s and 300s".to_string(),
            ));
        }

        let poll_secs = self.agent.poll_interval.as_secs();
        if !(5..=300).contains(&poll_secs) {
            return Err(ConfigError::Validation(
                "agent.poll_interval must be between 5s and 300s".to_string(),
            ));
        }

        if !(1..=100).contains(&self.agent.max_concurrent_tasks) {
            return Err(ConfigError::Validation(
                "agent.max_concurrent_tasks must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
agent:
  id: agent-one
  name: Agent One
  type: sensor
  tenant_id: tenant-one
  environment: dev
api:
  base_url: http://localhost:8080
plugins:
  base_folder: /var/lib/stavily/plugins
"#
    }

    #[test]
    fn parses_minimal_document_with_defaults() {
        let config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.agent.heartbeat, Duration::from_secs(30));
        assert_eq!(config.agent.max_concurrent_tasks, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_prod_with_plain_http() {
        let mut config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        config.agent.environment = Environment::Prod;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_replaces_base_url() {
        let mut config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        config.apply_env_overrides(
            vec![("STAVILY_API__BASE_URL".to_string(), "https://orc.example.test".to_string())]
                .into_iter(),
        );
        assert_eq!(config.api.base_url, "https://orc.example.test");
    }

    #[test]
    fn rejects_out_of_range_heartbeat() {
        let mut config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        config.agent.heartbeat = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }
}
