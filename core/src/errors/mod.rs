//! Domain-specific error types and error handling.

mod types;

#[cfg(test)]
mod tests;

pub use types::{KeyError, SecretStoreError, TokenError};

use thiserror::Error;

/// Core domain errors (general purpose)
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Bridge to specific error types
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Secret(#[from] SecretStoreError),
}

impl DomainError {
    /// The token error carried by this error, if any
    pub fn token_error(&self) -> Option<TokenError> {
        match self {
            DomainError::Token(err) => Some(*err),
            _ => None,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
