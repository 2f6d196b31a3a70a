//! Vault KV v2 secret store
//!
//! Talks to the backend over plain HTTP(S):
//! - `GET  /v1/sys/health` to probe availability
//! - `GET  /v1/<mount>/data/<path>` to read a bundle
//! - `POST /v1/<mount>/data/<path>` with `{"data": {...}}` to write one
//!
//! Every request carries `X-Vault-Token` and is bounded by the configured
//! timeout. Secrets never appear in log lines; paths do.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ks_core::{SecretBackendStatus, SecretBundle, SecretStore, SecretStoreError};
use ks_shared::config::SecretBackendConfig;

use crate::InfrastructureError;

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Debug, Deserialize)]
struct KvReadData {
    /// `null` when the latest version has been deleted
    data: Option<SecretBundle>,
}

#[derive(Debug, Serialize)]
struct KvWriteRequest<'a> {
    data: &'a SecretBundle,
}

/// Secret store speaking the Vault KV v2 HTTP protocol
pub struct VaultSecretStore {
    client: Client,
    addr: String,
    mount: String,
    token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for VaultSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretStore")
            .field("addr", &self.addr)
            .field("mount", &self.mount)
            .field("token", &self.token.as_ref().map(|_| "****"))
            .finish()
    }
}

impl VaultSecretStore {
    /// Build a client for the backend described by `config`
    pub fn new(config: &SecretBackendConfig) -> Result<Self, InfrastructureError> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            addr: config.addr.trim_end_matches('/').to_string(),
            mount: config.mount.trim_matches('/').to_string(),
            token: config.token.clone(),
            timeout,
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}/data/{}",
            self.addr,
            self.mount,
            path.trim_start_matches('/')
        )
    }

    fn token(&self) -> Result<&str, SecretStoreError> {
        self.token.as_deref().ok_or_else(|| SecretStoreError::Unavailable {
            message: "no secret backend token configured".to_string(),
        })
    }

    fn request_error(&self, err: reqwest::Error) -> SecretStoreError {
        if err.is_timeout() {
            SecretStoreError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            SecretStoreError::Unavailable {
                message: err.to_string(),
            }
        }
    }
}

/// Map a non-success status to the matching store error
fn status_error(status: StatusCode, path: &str) -> SecretStoreError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => SecretStoreError::NotPermitted {
            path: path.to_string(),
        },
        status if status.is_server_error() => SecretStoreError::Unavailable {
            message: format!("backend returned {}", status),
        },
        status => SecretStoreError::InvalidResponse {
            message: format!("unexpected status {} for {}", status, path),
        },
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn initialize(&self) -> SecretBackendStatus {
        let Ok(token) = self.token() else {
            warn!("Secret backend enabled without a token, treating it as disabled");
            return SecretBackendStatus::Disabled;
        };

        let url = format!("{}/v1/sys/health", self.addr);
        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, token)
            .send()
            .await;

        match response {
            // 429 is a healthy standby node; reads are forwarded to the active one.
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                info!(addr = %self.addr, "Secret backend available");
                SecretBackendStatus::Enabled
            }
            Ok(resp) => {
                warn!(addr = %self.addr, status = %resp.status(), "Secret backend unhealthy");
                SecretBackendStatus::Disabled
            }
            Err(e) => {
                warn!(addr = %self.addr, error = %self.request_error(e), "Secret backend unreachable");
                SecretBackendStatus::Disabled
            }
        }
    }

    async fn read(&self, path: &str) -> Result<Option<SecretBundle>, SecretStoreError> {
        let response = self
            .client
            .get(self.data_url(path))
            .header(TOKEN_HEADER, self.token()?)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(path, "No secret stored");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, path));
        }

        let body: KvReadResponse = response.json().await.map_err(|e| {
            SecretStoreError::InvalidResponse {
                message: e.to_string(),
            }
        })?;

        let bundle = body.data.data.filter(|bundle| !bundle.is_empty());
        debug!(path, fields = bundle.as_ref().map_or(0, |b| b.len()), "Secret read");
        Ok(bundle)
    }

    async fn write(&self, path: &str, bundle: &SecretBundle) -> Result<(), SecretStoreError> {
        let response = self
            .client
            .post(self.data_url(path))
            .header(TOKEN_HEADER, self.token()?)
            .json(&KvWriteRequest { data: bundle })
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, path));
        }

        info!(path, fields = bundle.len(), "Secret written");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "vault"
    }
}
