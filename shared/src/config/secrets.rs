//! Remote secret backend configuration

use serde::{Deserialize, Serialize};

/// Connection settings for the remote secret backend (Vault KV v2 compatible)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecretBackendConfig {
    /// Whether to try the remote backend at all
    #[serde(default)]
    pub enabled: bool,

    /// Backend base address, e.g. `http://127.0.0.1:8200`
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Access token sent with every request
    #[serde(default)]
    pub token: Option<String>,

    /// KV mount name
    #[serde(default = "default_mount")]
    pub mount: String,

    /// Application name used as the path prefix (`<app>/jwt`, `<app>/rsa`)
    #[serde(default = "default_app")]
    pub app_name: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SecretBackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_addr(),
            token: None,
            mount: default_mount(),
            app_name: default_app(),
            timeout_secs: default_timeout(),
        }
    }
}

impl SecretBackendConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("SECRET_BACKEND_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            addr: std::env::var("SECRET_BACKEND_ADDR").unwrap_or(defaults.addr),
            token: std::env::var("SECRET_BACKEND_TOKEN").ok().filter(|t| !t.is_empty()),
            mount: std::env::var("SECRET_BACKEND_MOUNT").unwrap_or(defaults.mount),
            app_name: std::env::var("SECRET_BACKEND_APP").unwrap_or(defaults.app_name),
            timeout_secs: std::env::var("SECRET_BACKEND_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Path holding the symmetric token secrets
    pub fn jwt_path(&self) -> String {
        format!("{}/jwt", self.app_name)
    }

    /// Path holding the RSA keypair
    pub fn rsa_path(&self) -> String {
        format!("{}/rsa", self.app_name)
    }

    /// Request timeout, clamped to the supported 1..=10 second window
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.clamp(1, 10))
    }
}

fn default_addr() -> String {
    String::from("http://127.0.0.1:8200")
}

fn default_mount() -> String {
    String::from("secret")
}

fn default_app() -> String {
    String::from("ks")
}

fn default_timeout() -> u64 {
    5
}
