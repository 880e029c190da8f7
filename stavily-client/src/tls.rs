//! TLS policy for the Orchestrator Client.
//!
//! Minimum protocol version defaults to TLS 1.3, client certificates and
//! CA pinning are supported, and `insecure_skip_verify` is refused
//! outside the `dev` environment.

use std::path::{Path, PathBuf};

use reqwest::{Certificate, ClientBuilder, Identity};
use stavily_core::domain::identity::Environment;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinTlsVersion {
    Tls12,
    Tls13,
}

impl Default for MinTlsVersion {
    fn default() -> Self {
        MinTlsVersion::Tls13
    }
}

/// TLS settings parsed from the `security.tls` config section.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub min_version: MinTlsVersion,
    pub ca_cert_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub server_name_override: Option<String>,
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Applies this policy to a `reqwest::ClientBuilder`.
    ///
    /// Refuses `insecure_skip_verify` unless `environment` is `Dev`.
    pub fn apply(&self, mut builder: ClientBuilder, environment: Environment) -> Result<ClientBuilder> {
        if self.insecure_skip_verify {
            if environment != Environment::Dev {
                return Err(ClientError::AuthFailure(
                    "insecure_skip_verify is forbidden outside the dev environment".to_string(),
                ));
            }
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder = match self.min_version {
            MinTlsVersion::Tls12 => builder.min_tls_version(reqwest::tls::Version::TLS_1_2),
            MinTlsVersion::Tls13 => builder.min_tls_version(reqwest::tls::Version::TLS_1_3),
        };

        if let Some(ca_path) = &self.ca_cert_path {
            let cert = load_certificate(ca_path)?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&self.client_cert_path, &self.client_key_path) {
            let identity = load_identity(cert_path, key_path)?;
            builder = builder.identity(identity);
        }

        if let Some(sni) = &self.server_name_override {
            builder = builder.resolve(sni, "127.0.0.1:443".parse().unwrap());
        }

        Ok(builder)
    }
}

fn load_certificate(path: &Path) -> Result<Certificate> {
    let bytes = std::fs::read(path)
        .map_err(|e| ClientError::AuthFailure(format!("failed to read CA cert {}: {e}", path.display())))?;
    Certificate::from_pem(&bytes)
        .map_err(|e| ClientError::AuthFailure(format!("invalid CA cert {}: {e}", path.display())))
}

fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity> {
    let mut pem = std::fs::read(cert_path)
        .map_err(|e| ClientError::AuthFailure(format!("failed to read client cert {}: {e}", cert_path.display())))?;
    let mut key = std::fs::read(key_path)
        .map_err(|e| ClientError::AuthFailure(format!("failed to read client key {}: {e}", key_path.display())))?;
    pem.push(b'\n');
    pem.append(&mut key);
    Identity::from_pem(&pem)
        .map_err(|e| ClientError::AuthFailure(format!("invalid client identity: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_skip_verify_is_rejected_outside_dev() {
        let cfg = TlsConfig {
            insecure_skip_verify: true,
            ..Default::default()
        };
        let err = cfg.apply(ClientBuilder::new(), Environment::Prod).unwrap_err();
        assert!(matches!(err, ClientError::AuthFailure(_)));
    }

    #[test]
    fn insecure_skip_verify_is_allowed_in_dev() {
        let cfg = TlsConfig {
            insecure_skip_verify: true,
            ..Default::default()
        };
        assert!(cfg.apply(ClientBuilder::new(), Environment::Dev).is_ok());
    }

    #[test]
    fn default_min_version_is_tls13() {
        assert_eq!(TlsConfig::default().min_version, MinTlsVersion::Tls13);
    }
}
