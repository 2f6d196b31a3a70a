pub mod revocation;
pub mod secret;

pub use revocation::{InMemoryRevocationStore, RevocationStore};
pub use secret::{DisabledSecretStore, MemorySecretStore, SecretStore};
