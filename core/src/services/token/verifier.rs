//! Token verification
//!
//! The header algorithm only selects which validation path to attempt. RS256
//! tokens are checked against the current RSA public key alone, HS256 tokens
//! against the secrets of their own class, newest first. Every failure is
//! reported to callers as `InvalidOrExpired`; the precise reason is logged.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::domain::clock::Clock;
use crate::domain::entities::token::{AccessClaims, RefreshClaims, TokenKind};
use crate::errors::TokenError;
use crate::services::keys::KeyRotationManager;
use crate::services::revocation::RevocationRegistry;

/// Validates tokens against current and retained key material
pub struct TokenVerifier {
    keys: Arc<KeyRotationManager>,
    revocations: Arc<RevocationRegistry>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(
        keys: Arc<KeyRotationManager>,
        revocations: Arc<RevocationRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            revocations,
            clock,
        }
    }

    /// Verify an access token and return its claims
    pub async fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let result = self.check_access(token).await;
        conceal(TokenKind::Access, result)
    }

    /// Verify a refresh token and return its claims
    pub async fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let result = self.check_refresh(token).await;
        conceal(TokenKind::Refresh, result)
    }

    /// Access verification with the precise failure reason
    pub(crate) async fn check_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        match self.revocations.is_access_revoked(token).await {
            Ok(false) => {}
            Ok(true) => return Err(TokenError::RevokedToken),
            Err(e) => {
                error!(error = %e, "Revocation lookup failed, rejecting access token");
                return Err(TokenError::RevokedToken);
            }
        }

        let claims: AccessClaims = self.check_signature(token, TokenKind::Access)?;
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    /// Refresh verification with the precise failure reason
    pub(crate) async fn check_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.check_signature(token, TokenKind::Refresh)?;
        self.check_expiry(claims.exp)?;

        match self.revocations.is_refresh_revoked(&claims.jti).await {
            Ok(false) => Ok(claims),
            Ok(true) => Err(TokenError::RevokedToken),
            Err(e) => {
                error!(error = %e, "Revocation lookup failed, rejecting refresh token");
                Err(TokenError::RevokedToken)
            }
        }
    }

    fn check_signature<T: DeserializeOwned>(&self, token: &str, kind: TokenKind) -> Result<T, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::MalformedToken)?;
        let snapshot = self.keys.snapshot().map_err(|_| TokenError::KeyUnavailable)?;

        match header.alg {
            Algorithm::RS256 => {
                let pair = snapshot.rsa_pair().ok_or(TokenError::KeyUnavailable)?;
                decode_with(token, pair.decoding_key(), Algorithm::RS256)
            }
            Algorithm::HS256 => {
                for key in snapshot.symmetric_keys(kind).verification_keys() {
                    match decode_with(token, key.decoding_key(), Algorithm::HS256) {
                        Ok(claims) => return Ok(claims),
                        Err(TokenError::InvalidSignature) => continue,
                        Err(other) => return Err(other),
                    }
                }
                Err(TokenError::InvalidSignature)
            }
            _ => Err(TokenError::UnsupportedAlgorithm),
        }
    }

    fn check_expiry(&self, exp: i64) -> Result<(), TokenError> {
        if self.clock.now().timestamp() >= exp {
            return Err(TokenError::ExpiredToken);
        }
        Ok(())
    }
}

fn decode_with<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<T, TokenError> {
    // Expiry is checked against the injected clock instead.
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.leeway = 0;

    decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(TokenError::from)
}

fn conceal<T>(kind: TokenKind, result: Result<T, TokenError>) -> Result<T, TokenError> {
    result.map_err(|reason| {
        debug!(token_kind = %kind, reason = reason.reason(), "Token verification failed");
        TokenError::InvalidOrExpired
    })
}
