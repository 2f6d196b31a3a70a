//! Domain-specific error types for key management and token operations
//!
//! Verification failures keep their precise kind inside the crate so they can
//! be logged, but only `TokenError::InvalidOrExpired` ever crosses the public
//! verification boundary.

use thiserror::Error;

/// Signing key lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Secret backend unavailable: {message}")]
    SecretBackendUnavailable { message: String },

    #[error("Key generation failed: {message}")]
    KeyGenerationFailure { message: String },

    #[error("Key persistence failed: {message}")]
    PersistenceFailure { message: String },

    #[error("No key material available for {key_class}")]
    KeyUnavailable { key_class: String },

    #[error("Key manager has not been initialized")]
    NotInitialized,

    #[error("Invalid key material: {message}")]
    InvalidKeyMaterial { message: String },
}

impl KeyError {
    /// Whether the scheduler should simply try again on its next tick
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            KeyError::SecretBackendUnavailable { .. }
                | KeyError::PersistenceFailure { .. }
                | KeyError::KeyGenerationFailure { .. }
        )
    }
}

/// Token-related errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token revoked")]
    RevokedToken,

    #[error("Verification key unavailable")]
    KeyUnavailable,

    #[error("Unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("Token generation failed")]
    TokenGenerationFailed,

    /// The only verification failure callers ever see
    #[error("Invalid or expired token")]
    InvalidOrExpired,
}

impl TokenError {
    /// Stable short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::MalformedToken => "malformed",
            TokenError::ExpiredToken => "expired",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::RevokedToken => "revoked",
            TokenError::KeyUnavailable => "key_unavailable",
            TokenError::UnsupportedAlgorithm => "unsupported_algorithm",
            TokenError::TokenGenerationFailed => "generation_failed",
            TokenError::InvalidOrExpired => "invalid_or_expired",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenError::UnsupportedAlgorithm
            }
            _ => TokenError::MalformedToken,
        }
    }
}

/// Secret backend access errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretStoreError {
    #[error("Secret backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Secret backend denied access to {path}")]
    NotPermitted { path: String },

    #[error("Secret backend timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Unexpected secret backend response: {message}")]
    InvalidResponse { message: String },

    #[error("Local key storage error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for SecretStoreError {
    fn from(err: std::io::Error) -> Self {
        SecretStoreError::Io {
            message: err.to_string(),
        }
    }
}

impl From<SecretStoreError> for KeyError {
    fn from(err: SecretStoreError) -> Self {
        match err {
            SecretStoreError::Unavailable { message } => {
                KeyError::SecretBackendUnavailable { message }
            }
            other => KeyError::PersistenceFailure {
                message: other.to_string(),
            },
        }
    }
}
