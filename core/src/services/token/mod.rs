//! Token service module for JWT management
//!
//! This module handles all token-related operations including:
//! - Access and refresh token issuance under the snapshot's signing policy
//! - Verification against current and retained key material
//! - Revocation by token value or refresh token identifier

mod config;
mod issuer;
mod service;
pub mod unverified;
mod verifier;

#[cfg(test)]
mod tests;

pub use config::TokenServiceConfig;
pub use issuer::TokenIssuer;
pub use service::TokenService;
pub use verifier::TokenVerifier;
