//! Configuration module with business-specific sub-modules
//!
//! This module organizes configuration into logical areas:
//! - `auth` - Token lifetimes and environment-supplied signing material
//! - `cache` - Revocation store selection and Redis settings
//! - `environment` - Environment detection and logging configuration
//! - `rotation` - Key rotation intervals and scheduler cadence
//! - `secrets` - Remote secret backend connection settings

pub mod auth;
pub mod cache;
pub mod environment;
pub mod rotation;
pub mod secrets;

use std::path::Path;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use auth::{JwtConfig, KeySourceConfig};
pub use cache::{CacheConfig, RevocationBackend};
pub use environment::{Environment, LogFormat, LoggingConfig};
pub use rotation::KeyRotationConfig;
pub use secrets::SecretBackendConfig;

/// Prefix for environment overrides when loading from a file (`KS__ROTATION__ENABLED`)
pub const ENV_PREFIX: &str = "KS";

/// Complete application configuration combining all sub-configurations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Environment configuration
    #[serde(default)]
    pub environment: Environment,

    /// Token lifetimes
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Environment-supplied signing material
    #[serde(default)]
    pub keys: KeySourceConfig,

    /// Key rotation configuration
    #[serde(default)]
    pub rotation: KeyRotationConfig,

    /// Secret backend configuration
    #[serde(default)]
    pub secrets: SecretBackendConfig,

    /// Revocation store configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables, reading `.env` first if present
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let environment = Environment::from_env();
        Self {
            environment,
            jwt: JwtConfig::from_env(),
            keys: KeySourceConfig::from_env(),
            rotation: KeyRotationConfig::from_env(),
            secrets: SecretBackendConfig::from_env(),
            cache: CacheConfig::from_env(),
            logging: LoggingConfig::from_env(environment),
        }
    }

    /// Load configuration from a TOML file layered with `KS__` environment overrides
    ///
    /// A missing file is not an error; every section falls back to its defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ::config::ConfigError> {
        ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
