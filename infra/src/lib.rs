//! # Infrastructure Layer
//!
//! Concrete adapters for the Keystone credential services:
//! - **Secrets**: HTTP client for a Vault KV v2 compatible secret backend
//! - **Cache**: Redis client and the shared revocation store built on it
//! - **Logging**: `tracing-subscriber` setup driven by `LoggingConfig`
//!
//! [`initialize`] wires all of it, together with the core services, from an
//! [`AppConfig`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use ks_core::{
    Clock, DisabledSecretStore, InMemoryRevocationStore, KeyManagerConfig, KeyRotationManager,
    KeyRotationScheduler, OsKeyGenerator, RevocationRegistry, RevocationStore, SchedulerConfig,
    SecretStore, SystemClock, TokenService, TokenServiceConfig,
};
use ks_shared::config::{AppConfig, RevocationBackend};

/// Cache module - Redis client and revocation store
pub mod cache;

/// Structured logging initialisation
pub mod logging;

/// Secret backend clients
pub mod secrets;

pub use cache::{RedisClient, RedisRevocationStore};
pub use logging::init_logging;
pub use secrets::VaultSecretStore;

/// Fully wired credential services
pub struct CredentialServices {
    pub keys: Arc<KeyRotationManager>,
    pub revocations: Arc<RevocationRegistry>,
    pub tokens: Arc<TokenService>,
    pub scheduler: Arc<KeyRotationScheduler>,
    scheduler_handle: Option<JoinHandle<()>>,
}

impl CredentialServices {
    /// Whether the background rotation task was started
    pub fn scheduler_running(&self) -> bool {
        self.scheduler_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the background rotation task
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.scheduler_handle.take() {
            handle.abort();
            info!("Key rotation scheduler stopped");
        }
    }
}

impl Drop for CredentialServices {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Initialize the credential services from configuration
///
/// This function sets up:
/// - The secret backend client (or a disabled store)
/// - The revocation store (in-process or Redis)
/// - The key manager, loading or generating signing material
/// - The token service and, when enabled, the rotation scheduler
pub async fn initialize(config: &AppConfig) -> Result<CredentialServices, InfrastructureError> {
    info!(environment = %config.environment, "Initializing credential services...");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let secret_store = build_secret_store(config)?;
    let revocation_store = build_revocation_store(config, clock.clone()).await?;

    let keys = Arc::new(KeyRotationManager::new(
        secret_store,
        Arc::new(OsKeyGenerator::new(config.rotation.rsa_key_bits)),
        clock.clone(),
        KeyManagerConfig::from_app(config),
    ));
    let snapshot = keys.init().await?;
    info!(
        policy = ?snapshot.policy(),
        backend = ?keys.backend_status(),
        "Signing keys loaded"
    );

    let revocations = Arc::new(RevocationRegistry::new(revocation_store, clock.clone()));
    let tokens = Arc::new(TokenService::new(
        keys.clone(),
        revocations.clone(),
        clock,
        TokenServiceConfig::from(&config.jwt),
    ));

    let scheduler = Arc::new(
        KeyRotationScheduler::new(keys.clone(), SchedulerConfig::from(&config.rotation))
            .with_revocations(revocations.clone()),
    );
    let scheduler_handle = scheduler.clone().start_background_task();

    info!("Credential services initialized successfully");

    Ok(CredentialServices {
        keys,
        revocations,
        tokens,
        scheduler,
        scheduler_handle,
    })
}

fn build_secret_store(config: &AppConfig) -> Result<Arc<dyn SecretStore>, InfrastructureError> {
    if !config.secrets.enabled {
        info!("Secret backend disabled, using environment and local key files");
        return Ok(Arc::new(DisabledSecretStore));
    }
    Ok(Arc::new(VaultSecretStore::new(&config.secrets)?))
}

async fn build_revocation_store(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn RevocationStore>, InfrastructureError> {
    match config.cache.revocation_backend {
        RevocationBackend::Memory => {
            if config.environment.is_production() {
                warn!("In-process revocation store: revocations are not shared between instances");
            }
            Ok(Arc::new(InMemoryRevocationStore::new()))
        }
        RevocationBackend::Redis => {
            let client = RedisClient::new(config.cache.clone()).await?;
            if !client.health_check().await? {
                return Err(InfrastructureError::Config(
                    "Redis revocation store failed its health check".to_string(),
                ));
            }
            Ok(Arc::new(RedisRevocationStore::new(client, clock)))
        }
    }
}

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Redis cache error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// HTTP request error for the secret backend
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Key material could not be loaded
    #[error("Key error: {0}")]
    Key(#[from] ks_core::KeyError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
