//! Secret backend clients

pub mod vault;

pub use vault::VaultSecretStore;
