pub mod r#trait {
    pub use super::trait_::*;
}
#[path = "trait.rs"]
mod trait_;
pub mod disabled;
pub mod memory;

pub use disabled::DisabledSecretStore;
pub use memory::MemorySecretStore;
pub use r#trait::SecretStore;
