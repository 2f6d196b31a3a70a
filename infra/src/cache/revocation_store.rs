//! Redis-backed revocation store
//!
//! Shares revocations between instances. Each entry is a key
//! `<prefix>:<kind>:<sha256(identifier)>` whose Redis TTL is the remaining
//! lifetime of the revoked token, so Redis does the eviction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use ks_core::{Clock, DomainError, RevocationEntry, RevocationKind, RevocationStore};

use super::redis_client::RedisClient;
use crate::InfrastructureError;

/// Revocation store over a shared Redis keyspace
pub struct RedisRevocationStore {
    client: RedisClient,
    clock: Arc<dyn Clock>,
}

impl RedisRevocationStore {
    pub fn new(client: RedisClient, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    fn key(&self, kind: RevocationKind, identifier: &str) -> String {
        revocation_key(self.client.key_prefix(), kind, identifier)
    }
}

/// Redis key for a revoked identifier
pub fn revocation_key(prefix: &str, kind: RevocationKind, identifier: &str) -> String {
    let digest = hex::encode(Sha256::digest(identifier.as_bytes()));
    format!("{}:{}:{}", prefix, kind.as_str(), digest)
}

/// Whole seconds until `expires_at`, rounded up; `None` once it has passed
pub(crate) fn remaining_seconds(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let remaining = (expires_at - now).num_milliseconds();
    if remaining <= 0 {
        return None;
    }
    Some(((remaining + 999) / 1000) as u64)
}

fn storage_error(err: InfrastructureError) -> DomainError {
    DomainError::Storage {
        message: err.to_string(),
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn insert(&self, entry: RevocationEntry) -> Result<(), DomainError> {
        let Some(ttl) = remaining_seconds(entry.expires_at, self.clock.now()) else {
            debug!(kind = entry.kind.as_str(), "Revocation already lapsed, not stored");
            return Ok(());
        };
        let key = self.key(entry.kind, &entry.identifier);

        // Keep the later expiry when an identifier is revoked twice.
        if let Some(existing) = self.client.ttl(&key).await.map_err(storage_error)? {
            if existing >= ttl as i64 {
                return Ok(());
            }
        }

        self.client
            .set_with_expiry(&key, &entry.expires_at.to_rfc3339(), ttl)
            .await
            .map_err(storage_error)
    }

    async fn contains(
        &self,
        kind: RevocationKind,
        identifier: &str,
        _now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        self.client
            .exists(&self.key(kind, identifier))
            .await
            .map_err(storage_error)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, DomainError> {
        // Redis expires entries itself.
        Ok(0)
    }

    fn store_name(&self) -> &'static str {
        "redis"
    }
}
