//! Signing key rotation configuration

use serde::{Deserialize, Serialize};

/// How often each key class rotates and how the scheduler behaves
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyRotationConfig {
    /// Whether the background scheduler should run at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Access token secret rotation interval in days
    #[serde(default = "default_access_days")]
    pub access_interval_days: i64,

    /// Refresh token secret rotation interval in days
    #[serde(default = "default_refresh_days")]
    pub refresh_interval_days: i64,

    /// RSA keypair rotation interval in days
    #[serde(default = "default_rsa_days")]
    pub rsa_interval_days: i64,

    /// How often the scheduler checks whether a rotation is due (seconds)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Timeout applied to each persistence write during rotation (seconds)
    #[serde(default = "default_persist_timeout")]
    pub persist_timeout_secs: u64,

    /// RSA modulus size for generated keypairs
    #[serde(default = "default_rsa_bits")]
    pub rsa_key_bits: usize,

    /// Generate an RSA keypair at startup when none can be found
    #[serde(default = "default_enabled")]
    pub generate_rsa_if_missing: bool,
}

impl Default for KeyRotationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            access_interval_days: default_access_days(),
            refresh_interval_days: default_refresh_days(),
            rsa_interval_days: default_rsa_days(),
            check_interval_secs: default_check_interval(),
            persist_timeout_secs: default_persist_timeout(),
            rsa_key_bits: default_rsa_bits(),
            generate_rsa_if_missing: true,
        }
    }
}

impl KeyRotationConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_or("KEY_ROTATION_ENABLED", defaults.enabled),
            access_interval_days: env_or("KEY_ROTATION_ACCESS_DAYS", defaults.access_interval_days),
            refresh_interval_days: env_or(
                "KEY_ROTATION_REFRESH_DAYS",
                defaults.refresh_interval_days,
            ),
            rsa_interval_days: env_or("KEY_ROTATION_RSA_DAYS", defaults.rsa_interval_days),
            check_interval_secs: env_or(
                "KEY_ROTATION_CHECK_INTERVAL_SECS",
                defaults.check_interval_secs,
            ),
            persist_timeout_secs: env_or(
                "KEY_ROTATION_PERSIST_TIMEOUT_SECS",
                defaults.persist_timeout_secs,
            ),
            rsa_key_bits: env_or("KEY_ROTATION_RSA_BITS", defaults.rsa_key_bits),
            generate_rsa_if_missing: env_or(
                "KEY_ROTATION_GENERATE_RSA",
                defaults.generate_rsa_if_missing,
            ),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

fn default_enabled() -> bool {
    true
}

fn default_access_days() -> i64 {
    30
}

fn default_refresh_days() -> i64 {
    90
}

fn default_rsa_days() -> i64 {
    180
}

fn default_check_interval() -> u64 {
    86400 // once a day
}

fn default_persist_timeout() -> u64 {
    10
}

fn default_rsa_bits() -> usize {
    2048
}
