//! Secret store used when no backend is configured.

use async_trait::async_trait;

use crate::domain::entities::secret::{SecretBackendStatus, SecretBundle};
use crate::errors::SecretStoreError;

use super::r#trait::SecretStore;

/// Always reports `Disabled`; reads find nothing and writes are refused
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSecretStore;

#[async_trait]
impl SecretStore for DisabledSecretStore {
    async fn initialize(&self) -> SecretBackendStatus {
        SecretBackendStatus::Disabled
    }

    async fn read(&self, _path: &str) -> Result<Option<SecretBundle>, SecretStoreError> {
        Ok(None)
    }

    async fn write(&self, path: &str, _bundle: &SecretBundle) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Unavailable {
            message: format!("no secret backend configured for {}", path),
        })
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}
