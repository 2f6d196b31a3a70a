//! Revocation store trait defining the interface for revoked-token bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::revocation::{RevocationEntry, RevocationKind};
use crate::errors::DomainError;

/// Storage for revoked identifiers
///
/// Entries live until their `expires_at`; implementations evict expired
/// entries lazily on lookup and may also be purged in bulk. The in-process
/// implementation serves single-instance deployments; a shared store is
/// required for revocations to be seen across instances.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record a revocation. Re-inserting an identifier keeps the later expiry.
    async fn insert(&self, entry: RevocationEntry) -> Result<(), DomainError>;

    /// Whether `identifier` is currently revoked, evicting it if it has expired
    async fn contains(
        &self,
        kind: RevocationKind,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Remove every entry that expired before `now`
    ///
    /// # Returns
    /// Number of entries removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DomainError>;

    /// Short name for log lines
    fn store_name(&self) -> &'static str;
}
