//! Revocation registry
//!
//! Access tokens are revoked by value (stored as a fingerprint) and refresh
//! tokens by `jti`. Entries live until the token would have expired anyway.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info};

use crate::domain::clock::Clock;
use crate::domain::entities::revocation::{token_fingerprint, RevocationEntry, RevocationKind};
use crate::errors::{DomainError, TokenError};
use crate::repositories::RevocationStore;
use crate::services::token::unverified::{decode_unverified, UnverifiedClaims};

/// Registry of explicitly revoked tokens
pub struct RevocationRegistry {
    store: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RevocationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationRegistry")
            .field("store", &self.store.store_name())
            .finish()
    }
}

impl RevocationRegistry {
    pub fn new(store: Arc<dyn RevocationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Revoke an access token until its own expiry.
    ///
    /// The expiry is read without verifying the signature.
    ///
    /// # Returns
    /// * `Ok(DateTime)` - When the revocation entry lapses
    /// * `Err(DomainError::Token)` - The token could not be decoded
    pub async fn revoke_access(&self, token: &str) -> Result<DateTime<Utc>, DomainError> {
        let claims: UnverifiedClaims = decode_unverified(token)?;
        let expires_at = timestamp(claims.exp)?;
        let fingerprint = token_fingerprint(token);

        self.store
            .insert(RevocationEntry::new(RevocationKind::Access, fingerprint.as_str(), expires_at))
            .await?;

        info!(
            token_fingerprint = %&fingerprint[..16],
            expires_at = %expires_at,
            "Access token revoked"
        );
        Ok(expires_at)
    }

    /// Revoke a refresh token identifier for `ttl` from now
    pub async fn revoke_refresh(&self, jti: &str, ttl: Duration) -> Result<DateTime<Utc>, DomainError> {
        let expires_at = self.clock.now() + ttl;
        self.revoke_refresh_until(jti, expires_at).await?;
        Ok(expires_at)
    }

    /// Revoke a refresh token identifier until `expires_at`
    pub async fn revoke_refresh_until(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if jti.is_empty() {
            return Err(DomainError::Validation {
                message: "refresh token identifier must not be empty".to_string(),
            });
        }

        self.store
            .insert(RevocationEntry::new(RevocationKind::Refresh, jti, expires_at))
            .await?;

        info!(jti, expires_at = %expires_at, "Refresh token revoked");
        Ok(())
    }

    /// Whether `token` has been revoked and has not yet expired
    pub async fn is_access_revoked(&self, token: &str) -> Result<bool, DomainError> {
        self.store
            .contains(
                RevocationKind::Access,
                &token_fingerprint(token),
                self.clock.now(),
            )
            .await
    }

    /// Whether the refresh token identified by `jti` has been revoked
    pub async fn is_refresh_revoked(&self, jti: &str) -> Result<bool, DomainError> {
        self.store
            .contains(RevocationKind::Refresh, jti, self.clock.now())
            .await
    }

    /// Drop every entry past its expiry
    pub async fn purge_expired(&self) -> Result<usize, DomainError> {
        let removed = self.store.purge_expired(self.clock.now()).await?;
        if removed > 0 {
            debug!(removed, store = self.store.store_name(), "Purged expired revocations");
        }
        Ok(removed)
    }
}

fn timestamp(exp: i64) -> Result<DateTime<Utc>, DomainError> {
    Utc.timestamp_opt(exp, 0)
        .single()
        .ok_or(DomainError::Token(TokenError::MalformedToken))
}
