//! # Keystone Core
//!
//! Credential and key-management domain layer.
//! This crate contains the signing key lifecycle (loading, rotation and
//! persistence), token issuance and verification, revocation, the repository
//! interfaces for secret and revocation storage, and the error types shared
//! by every layer above it.

pub mod domain;
pub mod services;
pub mod repositories;
pub mod errors;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types for convenience
pub use domain::*;
pub use errors::*;
pub use repositories::{
    DisabledSecretStore, InMemoryRevocationStore, MemorySecretStore, RevocationStore, SecretStore,
};
pub use services::{
    KeyManagerConfig, KeyMaterialGenerator, KeyRotationManager, KeyRotationScheduler,
    LocalKeyFiles, OsKeyGenerator, RevocationRegistry, RotationCycleResult, RotationOutcome,
    SchedulerConfig, SequenceKeyGenerator, TokenIssuer, TokenService, TokenServiceConfig,
    TokenVerifier,
};
