//! Token lifetime and signing key source configuration

use serde::{Deserialize, Serialize};

/// JWT token configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Access token expiry time in seconds
    pub access_token_expiry: i64,

    /// Refresh token expiry time in seconds
    pub refresh_token_expiry: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            access_token_expiry: 900,     // 15 minutes
            refresh_token_expiry: 604800, // 7 days
        }
    }
}

impl JwtConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            access_token_expiry: std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.access_token_expiry),
            refresh_token_expiry: std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_token_expiry),
        }
    }

    /// Set access token expiry in minutes
    pub fn with_access_expiry_minutes(mut self, minutes: i64) -> Self {
        self.access_token_expiry = minutes * 60;
        self
    }

    /// Set refresh token expiry in days
    pub fn with_refresh_expiry_days(mut self, days: i64) -> Self {
        self.refresh_token_expiry = days * 86400;
        self
    }
}

/// Signing material supplied by the deployment environment.
///
/// These values are only consulted when the secret backend is disabled or
/// holds nothing for this application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeySourceConfig {
    /// Primary access token secret (used for signing)
    #[serde(default)]
    pub access_secret: Option<String>,

    /// Additional verification-only access token secrets
    #[serde(default)]
    pub access_additional_secrets: Vec<String>,

    /// Primary refresh token secret (used for signing)
    #[serde(default)]
    pub refresh_secret: Option<String>,

    /// Additional verification-only refresh token secrets
    #[serde(default)]
    pub refresh_additional_secrets: Vec<String>,

    /// PEM-encoded RSA public key
    #[serde(default)]
    pub rsa_public_key: Option<String>,

    /// PEM-encoded RSA private key
    #[serde(default)]
    pub rsa_private_key: Option<String>,

    /// Local file holding the RSA private key when no backend is available
    #[serde(default = "default_private_key_path")]
    pub private_key_path: String,

    /// Local file holding the RSA public key when no backend is available
    #[serde(default = "default_public_key_path")]
    pub public_key_path: String,
}

impl Default for KeySourceConfig {
    fn default() -> Self {
        Self {
            access_secret: None,
            access_additional_secrets: Vec::new(),
            refresh_secret: None,
            refresh_additional_secrets: Vec::new(),
            rsa_public_key: None,
            rsa_private_key: None,
            private_key_path: default_private_key_path(),
            public_key_path: default_public_key_path(),
        }
    }
}

impl KeySourceConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self {
            access_secret: non_empty_var("JWT_SECRET"),
            access_additional_secrets: non_empty_var("JWT_ADDITIONAL_SECRETS")
                .map(|v| parse_secret_list(&v))
                .unwrap_or_default(),
            refresh_secret: non_empty_var("JWT_REFRESH_SECRET"),
            refresh_additional_secrets: non_empty_var("JWT_REFRESH_ADDITIONAL_SECRETS")
                .map(|v| parse_secret_list(&v))
                .unwrap_or_default(),
            rsa_public_key: non_empty_var("JWT_PUBLIC_KEY").map(|v| normalize_pem(&v)),
            rsa_private_key: non_empty_var("JWT_PRIVATE_KEY").map(|v| normalize_pem(&v)),
            private_key_path: std::env::var("JWT_PRIVATE_KEY_PATH")
                .unwrap_or_else(|_| default_private_key_path()),
            public_key_path: std::env::var("JWT_PUBLIC_KEY_PATH")
                .unwrap_or_else(|_| default_public_key_path()),
        }
    }

    /// Access secrets in signing order: primary first, then the extras
    pub fn access_secrets(&self) -> Vec<String> {
        ordered_secrets(self.access_secret.as_deref(), &self.access_additional_secrets)
    }

    /// Refresh secrets in signing order: primary first, then the extras
    pub fn refresh_secrets(&self) -> Vec<String> {
        ordered_secrets(self.refresh_secret.as_deref(), &self.refresh_additional_secrets)
    }

    /// Both halves of the RSA pair, if the environment supplied them
    pub fn rsa_pair(&self) -> Option<(&str, &str)> {
        match (&self.rsa_private_key, &self.rsa_public_key) {
            (Some(private), Some(public)) => Some((private.as_str(), public.as_str())),
            _ => None,
        }
    }
}

/// Split a comma-separated secret list, dropping blanks
pub fn parse_secret_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn escaped `\n` sequences (common in env files) back into newlines
pub fn normalize_pem(raw: &str) -> String {
    raw.trim().replace("\\n", "\n")
}

fn ordered_secrets(primary: Option<&str>, additional: &[String]) -> Vec<String> {
    // Extras without a primary are not promoted to signing keys.
    match primary {
        Some(primary) => std::iter::once(primary.to_string())
            .chain(additional.iter().filter(|s| s.as_str() != primary).cloned())
            .collect(),
        None => Vec::new(),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn default_private_key_path() -> String {
    String::from("keys/jwt_private_key.pem")
}

fn default_public_key_path() -> String {
    String::from("keys/jwt_public_key.pem")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_config_default() {
        let config = JwtConfig::default();
        assert_eq!(config.access_token_expiry, 900);
        assert_eq!(config.refresh_token_expiry, 604800);
    }

    #[test]
    fn test_jwt_config_builder() {
        let config = JwtConfig::default()
            .with_access_expiry_minutes(30)
            .with_refresh_expiry_days(14);

        assert_eq!(config.access_token_expiry, 1800);
        assert_eq!(config.refresh_token_expiry, 1209600);
    }

    #[test]
    fn test_parse_secret_list() {
        assert_eq!(parse_secret_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_secret_list(" , ").is_empty());
    }

    #[test]
    fn test_secret_ordering() {
        let config = KeySourceConfig {
            access_secret: Some("primary".to_string()),
            access_additional_secrets: vec!["old".to_string(), "primary".to_string()],
            ..Default::default()
        };
        assert_eq!(config.access_secrets(), vec!["primary", "old"]);

        let config = KeySourceConfig {
            refresh_additional_secrets: vec!["orphan".to_string()],
            ..Default::default()
        };
        assert!(config.refresh_secrets().is_empty());
    }

    #[test]
    fn test_normalize_pem() {
        let pem = normalize_pem("-----BEGIN PUBLIC KEY-----\\nABC\\n-----END PUBLIC KEY-----\n");
        assert_eq!(pem, "-----BEGIN PUBLIC KEY-----\nABC\n-----END PUBLIC KEY-----");
    }

    #[test]
    fn test_rsa_pair_requires_both_halves() {
        let mut config = KeySourceConfig {
            rsa_public_key: Some("public".to_string()),
            ..Default::default()
        };
        assert!(config.rsa_pair().is_none());

        config.rsa_private_key = Some("private".to_string());
        assert_eq!(config.rsa_pair(), Some(("private", "public")));
    }
}
