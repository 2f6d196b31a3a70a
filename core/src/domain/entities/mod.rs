//! Domain entities representing signing keys, tokens and revocations.

pub mod keys;
pub mod revocation;
pub mod secret;
pub mod token;

// Re-export commonly used types
pub use keys::{
    key_id_for, KeyClass, KeyClassState, KeySnapshot, RsaKeyPair, SigningKeyRef, SigningPolicy,
    SymmetricKey, SymmetricKeySet, KEY_ID_LEN, MAX_SYMMETRIC_KEYS,
};
pub use revocation::{token_fingerprint, RevocationEntry, RevocationKind};
pub use secret::{SecretBackendStatus, SecretBundle};
pub use token::{
    new_jti, AccessClaims, AccessTokenRequest, IssuedToken, RefreshClaims, TokenKind, TokenPair,
};
