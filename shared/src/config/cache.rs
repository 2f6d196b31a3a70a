//! Revocation storage configuration

use serde::{Deserialize, Serialize};

/// Where revoked tokens are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationBackend {
    /// In-process maps; correct only for a single instance
    Memory,
    /// Shared Redis keyspace for multi-instance deployments
    Redis,
}

impl Default for RevocationBackend {
    fn default() -> Self {
        RevocationBackend::Memory
    }
}

impl std::str::FromStr for RevocationBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" | "local" => Ok(RevocationBackend::Memory),
            "redis" => Ok(RevocationBackend::Redis),
            _ => Err(format!("Invalid revocation backend: {}", s)),
        }
    }
}

/// Redis cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which revocation store to build
    #[serde(default)]
    pub revocation_backend: RevocationBackend,

    /// Redis connection URL
    pub url: String,

    /// Connection timeout in seconds
    pub connection_timeout: u64,

    /// Key prefix for every revocation entry
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Maximum connection attempts before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            revocation_backend: RevocationBackend::default(),
            url: String::from("redis://localhost:6379"),
            connection_timeout: 5,
            key_prefix: default_key_prefix(),
            max_retries: default_max_retries(),
        }
    }
}

impl CacheConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let revocation_backend = std::env::var("REVOCATION_BACKEND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());

        Self {
            revocation_backend,
            url,
            ..Default::default()
        }
    }

    /// Create a Redis-backed configuration with URL
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            revocation_backend: RevocationBackend::Redis,
            url: url.into(),
            ..Default::default()
        }
    }
}

fn default_key_prefix() -> String {
    String::from("ks:revoked")
}

fn default_max_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.revocation_backend, RevocationBackend::Memory);
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.key_prefix, "ks:revoked");
    }

    #[test]
    fn test_revocation_backend_from_str() {
        assert_eq!("redis".parse::<RevocationBackend>().unwrap(), RevocationBackend::Redis);
        assert_eq!("Memory".parse::<RevocationBackend>().unwrap(), RevocationBackend::Memory);
        assert!("postgres".parse::<RevocationBackend>().is_err());
    }

    #[test]
    fn test_redis_constructor() {
        let config = CacheConfig::redis("redis://cache:6379/2");
        assert_eq!(config.revocation_backend, RevocationBackend::Redis);
        assert_eq!(config.url, "redis://cache:6379/2");
    }
}
