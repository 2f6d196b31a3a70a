//! Token revocation
//!
//! Explicitly revoked access tokens and refresh token identifiers, held in a
//! pluggable [`RevocationStore`](crate::repositories::RevocationStore) until
//! their natural expiry.

mod registry;

pub use registry::RevocationRegistry;
