//! Background key rotation scheduler
//!
//! Checks every key class on a fixed short interval, independent of the much
//! longer rotation intervals, and rotates whatever is due. The same tick purges
//! expired revocation entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ks_shared::config::KeyRotationConfig;

use crate::domain::entities::keys::KeyClass;
use crate::errors::DomainError;
use crate::services::revocation::RevocationRegistry;

use super::manager::{KeyRotationManager, RotationOutcome};

/// Configuration for the rotation scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to check for due rotations
    pub check_interval: Duration,
    /// Whether to run the background task at all
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(86_400), // Once a day
            enabled: true,
        }
    }
}

impl From<&KeyRotationConfig> for SchedulerConfig {
    fn from(config: &KeyRotationConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(config.check_interval_secs.max(1)),
            enabled: config.enabled,
        }
    }
}

/// Service that drives scheduled rotation and revocation cleanup
pub struct KeyRotationScheduler {
    manager: Arc<KeyRotationManager>,
    revocations: Option<Arc<RevocationRegistry>>,
    config: SchedulerConfig,
}

impl KeyRotationScheduler {
    pub fn new(manager: Arc<KeyRotationManager>, config: SchedulerConfig) -> Self {
        Self {
            manager,
            revocations: None,
            config,
        }
    }

    /// Also purge expired entries from `registry` on every tick
    pub fn with_revocations(mut self, registry: Arc<RevocationRegistry>) -> Self {
        self.revocations = Some(registry);
        self
    }

    /// Run a single check cycle
    ///
    /// Each class is handled independently; one failing class does not stop
    /// the others. Failures are recorded in the result and retried next tick.
    pub async fn run_cycle(&self) -> Result<RotationCycleResult, DomainError> {
        let mut result = RotationCycleResult::default();

        for class in KeyClass::ALL {
            match self.manager.rotate_if_due(class).await {
                Ok(Some(outcome)) => result.outcomes.push(outcome),
                Ok(None) => result.not_due.push(class),
                Err(e) => {
                    if e.is_retriable() {
                        warn!(key_class = %class, error = %e, "Rotation failed, will retry next cycle");
                    } else {
                        error!(key_class = %class, error = %e, "Rotation failed");
                    }
                    result.errors.push(format!("{}: {}", class, e));
                }
            }
        }

        if let Some(registry) = &self.revocations {
            match registry.purge_expired().await {
                Ok(count) => result.revocations_purged = count,
                Err(e) => {
                    error!(error = %e, "Failed to purge expired revocations");
                    result.errors.push(format!("Revocation purge error: {}", e));
                }
            }
        }

        info!(
            rotated = result.rotated_count(),
            not_due = result.not_due.len(),
            revocations_purged = result.revocations_purged,
            errors = result.errors.len(),
            "Key rotation cycle completed"
        );

        Ok(result)
    }

    /// Start the scheduler as a background task
    ///
    /// This spawns a tokio task that runs a cycle at every interval tick,
    /// starting immediately. Returns `None` when the scheduler is disabled.
    pub fn start_background_task(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            warn!("Key rotation scheduler is disabled");
            return None;
        }

        let handle = tokio::spawn(async move {
            info!(
                check_interval_secs = self.config.check_interval.as_secs(),
                "Key rotation scheduler started"
            );

            let mut interval_timer = tokio::time::interval(self.config.check_interval);

            loop {
                interval_timer.tick().await;

                match self.run_cycle().await {
                    Ok(result) => {
                        if !result.is_success() {
                            warn!("Rotation cycle completed with errors: {:?}", result.errors);
                        }
                    }
                    Err(e) => {
                        error!("Key rotation cycle failed: {}", e);
                    }
                }
            }
        });

        Some(handle)
    }
}

/// Result of one scheduler cycle
#[derive(Debug, Default)]
pub struct RotationCycleResult {
    /// Rotations attempted this cycle
    pub outcomes: Vec<RotationOutcome>,
    /// Classes that were not yet due
    pub not_due: Vec<KeyClass>,
    /// Number of expired revocation entries removed
    pub revocations_purged: usize,
    /// Any errors encountered during the cycle
    pub errors: Vec<String>,
}

impl RotationCycleResult {
    /// Check if the cycle was successful (no errors)
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of classes this cycle actually advanced
    pub fn rotated_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_rotated()).count()
    }

    /// Whether `class` was advanced this cycle
    pub fn rotated(&self, class: KeyClass) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.is_rotated() && o.class() == class)
    }
}
