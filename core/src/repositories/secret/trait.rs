//! Secret store trait defining the interface to the remote secret backend.

use async_trait::async_trait;

use crate::domain::entities::secret::{SecretBackendStatus, SecretBundle};
use crate::errors::SecretStoreError;

/// Key/value secret backend holding signing material
///
/// The backend being absent is a supported configuration, not an error:
/// `initialize` reports `Disabled` and callers fall back to environment
/// material and local files.
///
/// # Example
/// ```no_run
/// # use ks_core::repositories::SecretStore;
/// # async fn example(store: &impl SecretStore) -> Result<(), Box<dyn std::error::Error>> {
/// if store.initialize().await.is_enabled() {
///     if let Some(bundle) = store.read("ks/jwt").await? {
///         println!("found {} fields", bundle.len());
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Probe the backend. Never fails; any problem is reported as `Disabled`.
    ///
    /// Implementations must bound the probe with their own timeout.
    async fn initialize(&self) -> SecretBackendStatus;

    /// Read the bundle stored at `path`
    ///
    /// # Returns
    /// * `Ok(Some(bundle))` - Material found
    /// * `Ok(None)` - Nothing stored at `path`
    /// * `Err(SecretStoreError)` - Connectivity or permission failure
    async fn read(&self, path: &str) -> Result<Option<SecretBundle>, SecretStoreError>;

    /// Replace the bundle stored at `path`
    ///
    /// Failures are surfaced to the caller and never retried here.
    async fn write(&self, path: &str, bundle: &SecretBundle) -> Result<(), SecretStoreError>;

    /// Short name for log lines
    fn backend_name(&self) -> &'static str;
}
