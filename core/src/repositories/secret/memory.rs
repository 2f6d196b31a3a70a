//! In-process secret store.
//!
//! Backs single-process deployments and tests. Availability, write failures
//! and latency can be toggled at runtime to exercise fallback paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::entities::secret::{SecretBackendStatus, SecretBundle};
use crate::errors::SecretStoreError;

use super::r#trait::SecretStore;

/// Secret store keeping bundles in a map
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    bundles: Arc<RwLock<HashMap<String, SecretBundle>>>,
    unavailable: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    latency_ms: AtomicUsize,
    writes: AtomicUsize,
}

impl MemorySecretStore {
    /// Create a new, reachable, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one bundle
    pub async fn with_bundle(self, path: &str, bundle: SecretBundle) -> Self {
        self.bundles.write().await.insert(path.to_string(), bundle);
        self
    }

    /// Make every call behave as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make reads fail while the health check and writes keep working
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make writes fail while reads keep working
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current bundle at `path`, bypassing availability toggles
    pub async fn peek(&self, path: &str) -> Option<SecretBundle> {
        self.bundles.read().await.get(path).cloned()
    }

    async fn simulate(&self) -> Result<(), SecretStoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SecretStoreError::Unavailable {
                message: "in-memory backend marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn initialize(&self) -> SecretBackendStatus {
        match self.simulate().await {
            Ok(()) => SecretBackendStatus::Enabled,
            Err(_) => SecretBackendStatus::Disabled,
        }
    }

    async fn read(&self, path: &str) -> Result<Option<SecretBundle>, SecretStoreError> {
        self.simulate().await?;

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SecretStoreError::Unavailable {
                message: format!("read of {} failed", path),
            });
        }
        Ok(self.bundles.read().await.get(path).cloned())
    }

    async fn write(&self, path: &str, bundle: &SecretBundle) -> Result<(), SecretStoreError> {
        self.simulate().await?;

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SecretStoreError::NotPermitted {
                path: path.to_string(),
            });
        }

        self.bundles
            .write()
            .await
            .insert(path.to_string(), bundle.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
