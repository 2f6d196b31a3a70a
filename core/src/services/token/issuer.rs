//! Token issuance

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Header};
use serde::Serialize;
use tracing::{debug, error};

use crate::domain::clock::Clock;
use crate::domain::entities::keys::KeySnapshot;
use crate::domain::entities::token::{
    AccessClaims, AccessTokenRequest, IssuedToken, RefreshClaims, TokenKind, TokenPair,
};
use crate::errors::{DomainError, TokenError};
use crate::services::keys::KeyRotationManager;

use super::config::TokenServiceConfig;

/// Mints access and refresh tokens with the current signing material
pub struct TokenIssuer {
    keys: Arc<KeyRotationManager>,
    clock: Arc<dyn Clock>,
    config: TokenServiceConfig,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyRotationManager>, clock: Arc<dyn Clock>, config: TokenServiceConfig) -> Self {
        Self { keys, clock, config }
    }

    pub fn config(&self) -> &TokenServiceConfig {
        &self.config
    }

    /// Issue an access token carrying the requested identity
    pub fn issue_access(&self, request: &AccessTokenRequest) -> Result<IssuedToken, DomainError> {
        let snapshot = self.keys.snapshot()?;
        self.issue_access_with(&snapshot, request, self.clock.now())
    }

    /// Issue a refresh token for `subject`
    pub fn issue_refresh(&self, subject: &str) -> Result<IssuedToken, DomainError> {
        let snapshot = self.keys.snapshot()?;
        self.issue_refresh_with(&snapshot, subject, self.clock.now())
    }

    /// Issue both tokens from one snapshot so they share a signing policy
    pub fn issue_pair(&self, request: &AccessTokenRequest) -> Result<TokenPair, DomainError> {
        let snapshot = self.keys.snapshot()?;
        let now = self.clock.now();

        Ok(TokenPair {
            access: self.issue_access_with(&snapshot, request, now)?,
            refresh: self.issue_refresh_with(&snapshot, &request.subject, now)?,
        })
    }

    fn issue_access_with(
        &self,
        snapshot: &KeySnapshot,
        request: &AccessTokenRequest,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, DomainError> {
        let claims = AccessClaims::new(request, now, self.config.access_token_ttl);
        sign(snapshot, TokenKind::Access, &claims, &claims.jti, claims.iat, claims.exp)
    }

    fn issue_refresh_with(
        &self,
        snapshot: &KeySnapshot,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, DomainError> {
        let claims = RefreshClaims::new(subject, now, self.config.refresh_token_ttl);
        sign(snapshot, TokenKind::Refresh, &claims, &claims.jti, claims.iat, claims.exp)
    }
}

fn sign<C: Serialize>(
    snapshot: &KeySnapshot,
    kind: TokenKind,
    claims: &C,
    jti: &str,
    iat: i64,
    exp: i64,
) -> Result<IssuedToken, DomainError> {
    let signer = snapshot.signing_key(kind);

    let mut header = Header::new(signer.algorithm);
    header.kid = Some(signer.key_id.to_string());

    let token = encode(&header, claims, signer.key).map_err(|e| {
        error!(token_kind = %kind, error = %e, "Failed to sign token");
        DomainError::Token(TokenError::TokenGenerationFailed)
    })?;

    debug!(
        token_kind = %kind,
        algorithm = ?signer.algorithm,
        key_id = signer.key_id,
        jti,
        "Token issued"
    );

    let issued_at = DateTime::<Utc>::from_timestamp(iat, 0).unwrap_or_else(Utc::now);
    Ok(IssuedToken {
        token,
        kind,
        jti: jti.to_string(),
        algorithm: signer.algorithm,
        key_id: signer.key_id.to_string(),
        issued_at,
        expires_at: issued_at + Duration::seconds(exp - iat),
    })
}
