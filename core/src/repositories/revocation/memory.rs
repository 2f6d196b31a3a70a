//! In-process revocation store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::entities::revocation::{RevocationEntry, RevocationKind};
use crate::errors::DomainError;

use super::r#trait::RevocationStore;

type ExpiryMap = HashMap<String, DateTime<Utc>>;

/// Revocation store with one lock-protected map per revocation kind
#[derive(Debug, Default, Clone)]
pub struct InMemoryRevocationStore {
    access: Arc<RwLock<ExpiryMap>>,
    refresh: Arc<RwLock<ExpiryMap>>,
}

impl InMemoryRevocationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: RevocationKind) -> &RwLock<ExpiryMap> {
        match kind {
            RevocationKind::Access => &self.access,
            RevocationKind::Refresh => &self.refresh,
        }
    }

    /// Entries currently held for `kind`, including ones not yet evicted
    pub async fn len(&self, kind: RevocationKind) -> usize {
        self.map(kind).read().await.len()
    }

    /// Whether no entries are held for `kind`
    pub async fn is_empty(&self, kind: RevocationKind) -> bool {
        self.len(kind).await == 0
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn insert(&self, entry: RevocationEntry) -> Result<(), DomainError> {
        let mut map = self.map(entry.kind).write().await;
        map.entry(entry.identifier)
            .and_modify(|expires_at| {
                if entry.expires_at > *expires_at {
                    *expires_at = entry.expires_at;
                }
            })
            .or_insert(entry.expires_at);
        Ok(())
    }

    async fn contains(
        &self,
        kind: RevocationKind,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let lock = self.map(kind);

        let expires_at = match lock.read().await.get(identifier) {
            Some(expires_at) => *expires_at,
            None => return Ok(false),
        };

        if now <= expires_at {
            return Ok(true);
        }

        // Expired: evict, re-checking in case a newer revocation landed meanwhile.
        let mut map = lock.write().await;
        match map.get(identifier) {
            Some(current) if now > *current => {
                map.remove(identifier);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut removed = 0;
        for lock in [&self.access, &self.refresh] {
            let mut map = lock.write().await;
            let before = map.len();
            map.retain(|_, expires_at| now <= *expires_at);
            removed += before - map.len();
        }
        Ok(removed)
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
