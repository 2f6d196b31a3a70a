//! Cache module for Redis-backed shared state
//!
//! Provides the Redis client and the revocation store that lets every
//! instance see the same revoked tokens.

pub mod redis_client;
pub mod revocation_store;

#[cfg(test)]
mod tests;

pub use redis_client::RedisClient;
pub use revocation_store::{revocation_key, RedisRevocationStore};

// Re-export commonly used types
pub use ks_shared::config::CacheConfig;
