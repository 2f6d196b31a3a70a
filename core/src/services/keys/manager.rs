//! Key rotation manager
//!
//! Owns the current and retained signing material for every key class and
//! publishes it as an immutable [`KeySnapshot`]. Readers clone an `Arc` and
//! never hold a lock across signing or verification.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::clock::Clock;
use crate::domain::entities::keys::{KeyClass, KeySnapshot, RsaKeyPair, SymmetricKeySet};
use crate::domain::entities::secret::{SecretBackendStatus, SecretBundle};
use crate::errors::KeyError;
use crate::repositories::SecretStore;

use super::bundle;
use super::config::KeyManagerConfig;
use super::generator::KeyMaterialGenerator;
use super::local_files::LocalKeyFiles;

/// Where a piece of key material came from at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialSource {
    Backend,
    Environment,
    LocalFiles,
    Generated,
}

impl MaterialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialSource::Backend => "backend",
            MaterialSource::Environment => "environment",
            MaterialSource::LocalFiles => "local_files",
            MaterialSource::Generated => "generated",
        }
    }
}

/// What a startup read of one backend path produced
enum StoredRead {
    Found(SecretBundle),
    Missing,
    Failed,
}

impl StoredRead {
    fn bundle(&self) -> Option<&SecretBundle> {
        match self {
            StoredRead::Found(bundle) => Some(bundle),
            StoredRead::Missing | StoredRead::Failed => None,
        }
    }
}

/// Decided once at init. A path is writable only when the backend was
/// enabled and the path was either empty or held usable material.
#[derive(Debug, Clone, Copy)]
struct LoadState {
    status: SecretBackendStatus,
    jwt_writable: bool,
    rsa_writable: bool,
}

impl LoadState {
    const DISABLED: LoadState = LoadState {
        status: SecretBackendStatus::Disabled,
        jwt_writable: false,
        rsa_writable: false,
    };
}

struct Resolved<T> {
    material: T,
    rotated_at: Option<DateTime<Utc>>,
    source: MaterialSource,
}

/// Result of a rotation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// This call advanced the class to `generation`
    Rotated {
        class: KeyClass,
        generation: u64,
        key_id: String,
    },
    /// A concurrent call already rotated the generation this call observed
    Superseded { class: KeyClass, generation: u64 },
}

impl RotationOutcome {
    pub fn class(&self) -> KeyClass {
        match self {
            RotationOutcome::Rotated { class, .. } | RotationOutcome::Superseded { class, .. } => {
                *class
            }
        }
    }

    /// Generation in force once the call returned
    pub fn generation(&self) -> u64 {
        match self {
            RotationOutcome::Rotated { generation, .. }
            | RotationOutcome::Superseded { generation, .. } => *generation,
        }
    }

    pub fn is_rotated(&self) -> bool {
        matches!(self, RotationOutcome::Rotated { .. })
    }
}

/// Manager for signing key material across all key classes
pub struct KeyRotationManager {
    store: Arc<dyn SecretStore>,
    generator: Arc<dyn KeyMaterialGenerator>,
    clock: Arc<dyn Clock>,
    config: KeyManagerConfig,
    local_files: LocalKeyFiles,
    backend: OnceCell<LoadState>,
    current: RwLock<Option<Arc<KeySnapshot>>>,
    access_rotation: Mutex<()>,
    refresh_rotation: Mutex<()>,
    rsa_rotation: Mutex<()>,
    publish: Mutex<()>,
}

impl std::fmt::Debug for KeyRotationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotationManager")
            .field("backend", &self.store.backend_name())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl KeyRotationManager {
    pub fn new(
        store: Arc<dyn SecretStore>,
        generator: Arc<dyn KeyMaterialGenerator>,
        clock: Arc<dyn Clock>,
        config: KeyManagerConfig,
    ) -> Self {
        let local_files = LocalKeyFiles::from_config(&config.sources);
        Self {
            store,
            generator,
            clock,
            config,
            local_files,
            backend: OnceCell::new(),
            current: RwLock::new(None),
            access_rotation: Mutex::new(()),
            refresh_rotation: Mutex::new(()),
            rsa_rotation: Mutex::new(()),
            publish: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &KeyManagerConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Load or create key material. Safe to call concurrently and repeatedly;
    /// exactly one load runs and every caller gets its snapshot.
    pub async fn init(&self) -> Result<Arc<KeySnapshot>, KeyError> {
        self.backend.get_or_try_init(|| self.load()).await?;
        self.snapshot()
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.initialized()
    }

    /// Backend status decided at init; `Disabled` before init
    pub fn backend_status(&self) -> SecretBackendStatus {
        self.load_state().status
    }

    fn load_state(&self) -> LoadState {
        self.backend.get().copied().unwrap_or(LoadState::DISABLED)
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Result<Arc<KeySnapshot>, KeyError> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().map(Arc::clone).ok_or(KeyError::NotInitialized)
    }

    fn publish_snapshot(&self, snapshot: Arc<KeySnapshot>) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(snapshot);
    }

    /// Whether `class` has outlived its rotation interval.
    ///
    /// A missing RSA pair counts as due when generation is enabled.
    pub fn is_rotation_due(&self, class: KeyClass) -> Result<bool, KeyError> {
        let snapshot = self.snapshot()?;
        if class == KeyClass::RsaPair && snapshot.rsa_pair().is_none() {
            return Ok(self.config.generate_rsa_if_missing);
        }

        let elapsed = self.clock.now() - snapshot.state(class).rotated_at;
        Ok(elapsed > self.config.interval(class))
    }

    /// Rotate `class` only when it is due
    pub async fn rotate_if_due(&self, class: KeyClass) -> Result<Option<RotationOutcome>, KeyError> {
        if !self.is_rotation_due(class)? {
            return Ok(None);
        }
        self.rotate(class).await.map(Some)
    }

    /// Replace the signing material of `class`.
    ///
    /// Symmetric classes gain a fresh secret at the front of their set; the RSA
    /// pair is replaced wholesale. New material is persisted before it is
    /// published; a failed persist leaves the previous material in force.
    pub async fn rotate(&self, class: KeyClass) -> Result<RotationOutcome, KeyError> {
        let observed = self.snapshot()?.state(class).generation;

        let _rotation = self.rotation_lock(class).lock().await;

        let current = self.snapshot()?;
        let generation = current.state(class).generation;
        if generation != observed {
            debug!(key_class = %class, generation, "Rotation already performed by a concurrent caller");
            return Ok(RotationOutcome::Superseded { class, generation });
        }

        let replacement = match class {
            KeyClass::AccessSecret | KeyClass::RefreshSecret => {
                let secret = self.generator.generate_secret()?;
                Replacement::Symmetric(symmetric_set(&current, class).rotated(secret)?)
            }
            KeyClass::RsaPair => Replacement::Rsa(self.generator.generate_rsa_pair().await?),
        };

        let _publish = self.publish.lock().await;

        // Other classes may have rotated since `current` was taken.
        let latest = self.snapshot()?;
        let now = self.clock.now();
        let next = match replacement {
            Replacement::Symmetric(keys) => latest.with_symmetric(class, keys, now),
            Replacement::Rsa(pair) => latest.with_rsa(pair, now),
        };

        if let Err(e) = self.persist(class, &next).await {
            warn!(key_class = %class, error = %e, "Rotation aborted, previous key material stays active");
            return Err(e);
        }

        let generation = next.state(class).generation;
        let key_id = match class {
            KeyClass::RsaPair => next.rsa_pair().map(|p| p.key_id().to_string()),
            _ => Some(symmetric_set(&next, class).signing_key().key_id().to_string()),
        }
        .unwrap_or_default();

        self.publish_snapshot(Arc::new(next));

        info!(key_class = %class, generation, key_id = %key_id, "Rotated signing key material");
        Ok(RotationOutcome::Rotated {
            class,
            generation,
            key_id,
        })
    }

    fn rotation_lock(&self, class: KeyClass) -> &Mutex<()> {
        match class {
            KeyClass::AccessSecret => &self.access_rotation,
            KeyClass::RefreshSecret => &self.refresh_rotation,
            KeyClass::RsaPair => &self.rsa_rotation,
        }
    }

    async fn persist(&self, class: KeyClass, snapshot: &KeySnapshot) -> Result<(), KeyError> {
        match timeout(self.config.persist_timeout, self.write_material(class, snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(KeyError::PersistenceFailure {
                message: format!(
                    "persisting {} timed out after {}s",
                    class,
                    self.config.persist_timeout.as_secs()
                ),
            }),
        }
    }

    async fn write_material(&self, class: KeyClass, snapshot: &KeySnapshot) -> Result<(), KeyError> {
        let state = self.load_state();
        let enabled = state.status.is_enabled();

        if class == KeyClass::RsaPair {
            let pair = snapshot.rsa_pair().ok_or_else(|| KeyError::KeyUnavailable {
                key_class: class.to_string(),
            })?;
            if !enabled {
                return self.local_files.store(pair).await.map_err(|e| {
                    KeyError::PersistenceFailure {
                        message: e.to_string(),
                    }
                });
            }
            ensure_writable(state.rsa_writable, &self.config.rsa_path)?;
            let rotated_at = snapshot.state(class).rotated_at;
            return self
                .write_bundle(&self.config.rsa_path, &bundle::rsa_bundle(pair, rotated_at))
                .await;
        }

        if !enabled {
            debug!(key_class = %class, "Secret backend disabled, rotated secrets kept in memory only");
            return Ok(());
        }
        ensure_writable(state.jwt_writable, &self.config.jwt_path)?;
        self.write_bundle(&self.config.jwt_path, &bundle::jwt_bundle(snapshot))
            .await
    }

    async fn write_bundle(&self, path: &str, bundle: &SecretBundle) -> Result<(), KeyError> {
        self.store
            .write(path, bundle)
            .await
            .map_err(|e| KeyError::PersistenceFailure {
                message: e.to_string(),
            })
    }

    async fn load(&self) -> Result<LoadState, KeyError> {
        let status = match timeout(self.config.backend_timeout, self.store.initialize()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    backend = self.store.backend_name(),
                    timeout_secs = self.config.backend_timeout.as_secs(),
                    "Secret backend probe timed out, falling back to local key sources"
                );
                SecretBackendStatus::Disabled
            }
        };
        let enabled = status.is_enabled();

        let (jwt_stored, rsa_stored) = if enabled {
            (
                self.read_bundle(&self.config.jwt_path).await,
                self.read_bundle(&self.config.rsa_path).await,
            )
        } else {
            (StoredRead::Missing, StoredRead::Missing)
        };

        // Unreadable or unusable stored material is still somebody's key
        // history; it is never replaced from this process.
        let jwt_writable = enabled
            && match &jwt_stored {
                StoredRead::Missing => true,
                StoredRead::Found(stored) => [KeyClass::AccessSecret, KeyClass::RefreshSecret]
                    .into_iter()
                    .all(|class| bundle::read_symmetric(stored, class).is_ok()),
                StoredRead::Failed => false,
            };
        let rsa_writable = enabled
            && match &rsa_stored {
                StoredRead::Missing => true,
                StoredRead::Found(stored) => bundle::read_rsa(stored).is_ok(),
                StoredRead::Failed => false,
            };
        for (path, writable) in [
            (&self.config.jwt_path, jwt_writable),
            (&self.config.rsa_path, rsa_writable),
        ] {
            if enabled && !writable {
                warn!(
                    path = %path,
                    "Stored key material unusable, running on fallback material without writing it back"
                );
            }
        }

        let access = self.resolve_symmetric(KeyClass::AccessSecret, jwt_stored.bundle())?;
        let refresh = self.resolve_symmetric(KeyClass::RefreshSecret, jwt_stored.bundle())?;
        let rsa = self.resolve_rsa(enabled, rsa_stored.bundle()).await;

        let now = self.clock.now();
        let seed_jwt = jwt_writable
            && (access.source != MaterialSource::Backend || refresh.source != MaterialSource::Backend);
        let seed_rsa = rsa_writable
            && rsa
                .as_ref()
                .map_or(false, |r| r.source != MaterialSource::Backend);
        let rsa_source = rsa.as_ref().map(|r| r.source);

        let mut snapshot = KeySnapshot::new(
            access.material,
            refresh.material,
            rsa.as_ref().map(|r| r.material.clone()),
            now,
        );
        for (class, rotated_at) in [
            (KeyClass::AccessSecret, access.rotated_at),
            (KeyClass::RefreshSecret, refresh.rotated_at),
            (KeyClass::RsaPair, rsa.as_ref().and_then(|r| r.rotated_at)),
        ] {
            if let Some(rotated_at) = rotated_at {
                snapshot = snapshot.with_rotated_at(class, rotated_at);
            }
        }

        if seed_jwt {
            self.seed(&self.config.jwt_path, bundle::jwt_bundle(&snapshot)).await;
        }
        if seed_rsa {
            if let Some(pair) = snapshot.rsa_pair() {
                let rotated_at = snapshot.state(KeyClass::RsaPair).rotated_at;
                self.seed(&self.config.rsa_path, bundle::rsa_bundle(pair, rotated_at))
                    .await;
            }
        }

        info!(
            backend = self.store.backend_name(),
            backend_enabled = enabled,
            access_source = access.source.as_str(),
            access_keys = snapshot.access_keys().len(),
            refresh_source = refresh.source.as_str(),
            refresh_keys = snapshot.refresh_keys().len(),
            rsa_source = rsa_source.map_or("none", |s| s.as_str()),
            signing_policy = ?snapshot.policy(),
            "Signing keys initialized"
        );

        self.publish_snapshot(Arc::new(snapshot));
        Ok(LoadState {
            status,
            jwt_writable,
            rsa_writable,
        })
    }

    async fn read_bundle(&self, path: &str) -> StoredRead {
        match timeout(self.config.backend_timeout, self.store.read(path)).await {
            Ok(Ok(Some(bundle))) => StoredRead::Found(bundle),
            Ok(Ok(None)) => StoredRead::Missing,
            Ok(Err(e)) => {
                warn!(path, error = %e, "Failed to read key material from secret backend");
                StoredRead::Failed
            }
            Err(_) => {
                warn!(path, "Secret backend read timed out");
                StoredRead::Failed
            }
        }
    }

    async fn seed(&self, path: &str, bundle: SecretBundle) {
        match timeout(self.config.persist_timeout, self.store.write(path, &bundle)).await {
            Ok(Ok(())) => info!(path, "Seeded secret backend with key material"),
            Ok(Err(e)) => warn!(path, error = %e, "Failed to seed secret backend"),
            Err(_) => warn!(path, "Seeding secret backend timed out"),
        }
    }

    fn resolve_symmetric(
        &self,
        class: KeyClass,
        stored: Option<&SecretBundle>,
    ) -> Result<Resolved<SymmetricKeySet>, KeyError> {
        if let Some(bundle) = stored {
            match bundle::read_symmetric(bundle, class) {
                Ok(Some(found)) => {
                    return Ok(Resolved {
                        material: found.keys,
                        rotated_at: found.rotated_at,
                        source: MaterialSource::Backend,
                    })
                }
                Ok(None) => {}
                Err(e) => warn!(key_class = %class, error = %e, "Ignoring invalid stored secrets"),
            }
        }

        let configured = match class {
            KeyClass::AccessSecret => self.config.sources.access_secrets(),
            _ => self.config.sources.refresh_secrets(),
        };
        if !configured.is_empty() {
            match SymmetricKeySet::new(configured) {
                Ok(keys) => {
                    return Ok(Resolved {
                        material: keys,
                        rotated_at: None,
                        source: MaterialSource::Environment,
                    })
                }
                Err(e) => warn!(key_class = %class, error = %e, "Ignoring invalid configured secrets"),
            }
        }

        let secret = self.generator.generate_secret()?;
        Ok(Resolved {
            material: SymmetricKeySet::new([secret])?,
            rotated_at: None,
            source: MaterialSource::Generated,
        })
    }

    async fn resolve_rsa(
        &self,
        enabled: bool,
        stored: Option<&SecretBundle>,
    ) -> Option<Resolved<RsaKeyPair>> {
        if let Some(bundle) = stored {
            match bundle::read_rsa(bundle) {
                Ok(Some((pair, rotated_at))) => {
                    return Some(Resolved {
                        material: pair,
                        rotated_at,
                        source: MaterialSource::Backend,
                    })
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ignoring invalid stored RSA keypair"),
            }
        }

        if let Some((private_pem, public_pem)) = self.config.sources.rsa_pair() {
            match RsaKeyPair::from_pem(private_pem, public_pem) {
                Ok(pair) => {
                    return Some(Resolved {
                        material: pair,
                        rotated_at: None,
                        source: MaterialSource::Environment,
                    })
                }
                Err(e) => warn!(error = %e, "Ignoring invalid configured RSA keypair"),
            }
        }

        if !enabled {
            match self.local_files.load().await {
                Ok(Some((pair, rotated_at))) => {
                    return Some(Resolved {
                        material: pair,
                        rotated_at: Some(rotated_at),
                        source: MaterialSource::LocalFiles,
                    })
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ignoring unreadable local RSA key files"),
            }
        }

        if !self.config.generate_rsa_if_missing {
            info!("No RSA keypair available, tokens will be signed with HS256");
            return None;
        }

        let pair = match self.generator.generate_rsa_pair().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "RSA keypair generation failed, tokens will be signed with HS256");
                return None;
            }
        };

        if !enabled {
            if let Err(e) = self.local_files.store(&pair).await {
                warn!(error = %e, "Failed to store generated RSA keypair locally");
            }
        }

        Some(Resolved {
            material: pair,
            rotated_at: None,
            source: MaterialSource::Generated,
        })
    }
}

enum Replacement {
    Symmetric(SymmetricKeySet),
    Rsa(RsaKeyPair),
}

fn ensure_writable(writable: bool, path: &str) -> Result<(), KeyError> {
    if writable {
        Ok(())
    } else {
        Err(KeyError::PersistenceFailure {
            message: format!(
                "stored material at {} was unusable at startup and is not overwritten",
                path
            ),
        })
    }
}

fn symmetric_set(snapshot: &KeySnapshot, class: KeyClass) -> &SymmetricKeySet {
    match class {
        KeyClass::RefreshSecret => snapshot.refresh_keys(),
        _ => snapshot.access_keys(),
    }
}
