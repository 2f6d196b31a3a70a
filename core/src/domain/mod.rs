//! Domain layer containing key, token and revocation entities.

pub mod clock;
pub mod entities;

// Re-export commonly used domain types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entities::{
    key_id_for, new_jti, token_fingerprint, AccessClaims, AccessTokenRequest, IssuedToken,
    KeyClass, KeyClassState, KeySnapshot, RefreshClaims, RevocationEntry, RevocationKind,
    RsaKeyPair, SecretBackendStatus, SecretBundle, SigningKeyRef, SigningPolicy, SymmetricKey,
    SymmetricKeySet, TokenKind, TokenPair, KEY_ID_LEN, MAX_SYMMETRIC_KEYS,
};
