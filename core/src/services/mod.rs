//! Business services: key lifecycle, token issuance and verification, revocation.

pub mod keys;
pub mod revocation;
pub mod token;

// Re-export commonly used types
pub use keys::{
    KeyManagerConfig, KeyMaterialGenerator, KeyRotationManager, KeyRotationScheduler,
    LocalKeyFiles, OsKeyGenerator, RotationCycleResult, RotationOutcome, SchedulerConfig,
    SequenceKeyGenerator,
};
pub use revocation::RevocationRegistry;
pub use token::{TokenIssuer, TokenService, TokenServiceConfig, TokenVerifier};
