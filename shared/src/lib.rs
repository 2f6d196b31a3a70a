//! Shared configuration types for the Keystone credential services
//!
//! This crate provides the configuration used across all server modules:
//! - Token lifetimes and environment-supplied signing material
//! - Key rotation cadence
//! - Secret backend connection settings
//! - Revocation store selection
//! - Logging configuration

pub mod config;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, CacheConfig, Environment, JwtConfig, KeyRotationConfig, KeySourceConfig,
    LogFormat, LoggingConfig, RevocationBackend, SecretBackendConfig,
};
