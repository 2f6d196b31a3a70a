//! Signing key lifecycle
//!
//! This module handles everything about signing key material:
//! - Loading material from the secret backend, environment or local files
//! - Generating fresh symmetric secrets and RSA keypairs
//! - Per-class rotation with persistence before publication
//! - The background scheduler that rotates whatever is due

pub mod bundle;
mod config;
mod generator;
mod local_files;
mod manager;
mod scheduler;

#[cfg(test)]
mod tests;

pub use config::KeyManagerConfig;
pub use generator::{
    generate_rsa_pem, KeyMaterialGenerator, OsKeyGenerator, SequenceKeyGenerator,
    DEFAULT_RSA_BITS, SECRET_BYTES,
};
pub use local_files::LocalKeyFiles;
pub use manager::{KeyRotationManager, MaterialSource, RotationOutcome};
pub use scheduler::{KeyRotationScheduler, RotationCycleResult, SchedulerConfig};
