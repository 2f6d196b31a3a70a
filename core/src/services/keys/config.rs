//! Configuration for the key rotation manager

use std::time::Duration as StdDuration;

use chrono::Duration;

use ks_shared::config::{AppConfig, KeyRotationConfig, KeySourceConfig, SecretBackendConfig};

use crate::domain::entities::keys::KeyClass;

/// Configuration for the key rotation manager
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// Rotation interval for access token secrets
    pub access_interval: Duration,
    /// Rotation interval for refresh token secrets
    pub refresh_interval: Duration,
    /// Rotation interval for the RSA keypair
    pub rsa_interval: Duration,
    /// Bound on the backend probe and on every backend read
    pub backend_timeout: StdDuration,
    /// Bound on persisting rotated material
    pub persist_timeout: StdDuration,
    /// Backend path of the symmetric secrets bundle
    pub jwt_path: String,
    /// Backend path of the RSA bundle
    pub rsa_path: String,
    /// Generate an RSA pair when no stored or configured one exists
    pub generate_rsa_if_missing: bool,
    /// Environment-supplied material and local key file locations
    pub sources: KeySourceConfig,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self::from_parts(
            &KeyRotationConfig::default(),
            &SecretBackendConfig::default(),
            &KeySourceConfig::default(),
        )
    }
}

impl KeyManagerConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self::from_parts(&config.rotation, &config.secrets, &config.keys)
    }

    pub fn from_parts(
        rotation: &KeyRotationConfig,
        secrets: &SecretBackendConfig,
        sources: &KeySourceConfig,
    ) -> Self {
        Self {
            access_interval: Duration::days(rotation.access_interval_days),
            refresh_interval: Duration::days(rotation.refresh_interval_days),
            rsa_interval: Duration::days(rotation.rsa_interval_days),
            backend_timeout: secrets.timeout(),
            persist_timeout: StdDuration::from_secs(rotation.persist_timeout_secs.max(1)),
            jwt_path: secrets.jwt_path(),
            rsa_path: secrets.rsa_path(),
            generate_rsa_if_missing: rotation.generate_rsa_if_missing,
            sources: sources.clone(),
        }
    }

    /// Rotation interval for `class`
    pub fn interval(&self, class: KeyClass) -> Duration {
        match class {
            KeyClass::AccessSecret => self.access_interval,
            KeyClass::RefreshSecret => self.refresh_interval,
            KeyClass::RsaPair => self.rsa_interval,
        }
    }

    pub fn with_sources(mut self, sources: KeySourceConfig) -> Self {
        self.sources = sources;
        self
    }

    pub fn without_rsa_generation(mut self) -> Self {
        self.generate_rsa_if_missing = false;
        self
    }
}
