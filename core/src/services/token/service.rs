//! Main token service implementation
//!
//! The public surface used by the authentication middleware: issue, verify
//! and revoke. Holds no key state of its own; every call reads the manager's
//! current snapshot.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::clock::Clock;
use crate::domain::entities::token::{
    AccessClaims, AccessTokenRequest, IssuedToken, RefreshClaims, TokenPair,
};
use crate::errors::{DomainError, TokenError};
use crate::services::keys::KeyRotationManager;
use crate::services::revocation::RevocationRegistry;

use super::config::TokenServiceConfig;
use super::issuer::TokenIssuer;
use super::unverified::{decode_unverified, UnverifiedClaims};
use super::verifier::TokenVerifier;

/// Service for issuing, verifying and revoking tokens
pub struct TokenService {
    issuer: TokenIssuer,
    verifier: TokenVerifier,
    keys: Arc<KeyRotationManager>,
    revocations: Arc<RevocationRegistry>,
}

impl TokenService {
    /// Creates a new token service instance
    ///
    /// # Arguments
    ///
    /// * `keys` - Initialized key rotation manager
    /// * `revocations` - Registry consulted on every verification
    /// * `clock` - Time source for issuance and expiry
    /// * `config` - Token lifetimes
    pub fn new(
        keys: Arc<KeyRotationManager>,
        revocations: Arc<RevocationRegistry>,
        clock: Arc<dyn Clock>,
        config: TokenServiceConfig,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(Arc::clone(&keys), Arc::clone(&clock), config),
            verifier: TokenVerifier::new(Arc::clone(&keys), Arc::clone(&revocations), clock),
            keys,
            revocations,
        }
    }

    pub fn keys(&self) -> &Arc<KeyRotationManager> {
        &self.keys
    }

    pub fn revocations(&self) -> &Arc<RevocationRegistry> {
        &self.revocations
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn issue_access(&self, request: &AccessTokenRequest) -> Result<IssuedToken, DomainError> {
        self.issuer.issue_access(request)
    }

    pub fn issue_refresh(&self, subject: &str) -> Result<IssuedToken, DomainError> {
        self.issuer.issue_refresh(subject)
    }

    /// Access and refresh tokens with independent identifiers
    pub fn issue_pair(&self, request: &AccessTokenRequest) -> Result<TokenPair, DomainError> {
        self.issuer.issue_pair(request)
    }

    /// Verify an access token; every failure is `InvalidOrExpired`
    pub async fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verifier.verify_access(token).await
    }

    /// Verify a refresh token; every failure is `InvalidOrExpired`
    pub async fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verifier.verify_refresh(token).await
    }

    /// Revoke an access token until it expires
    pub async fn revoke_access(&self, token: &str) -> Result<DateTime<Utc>, DomainError> {
        self.revocations.revoke_access(token).await
    }

    /// Revoke a refresh token identifier for `ttl`
    pub async fn revoke_refresh(&self, jti: &str, ttl: Duration) -> Result<DateTime<Utc>, DomainError> {
        self.revocations.revoke_refresh(jti, ttl).await
    }

    /// Revoke a refresh token by value, until its own expiry.
    ///
    /// Reads `jti` and `exp` without verifying the signature.
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<DateTime<Utc>, DomainError> {
        let claims: UnverifiedClaims = decode_unverified(token)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(DomainError::Token(TokenError::MalformedToken))?;

        self.revocations
            .revoke_refresh_until(&claims.jti, expires_at)
            .await?;
        Ok(expires_at)
    }
}
