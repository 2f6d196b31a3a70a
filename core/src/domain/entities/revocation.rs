//! Revocation entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which revocation list an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationKind {
    /// Keyed by access token fingerprint
    Access,
    /// Keyed by refresh token `jti`
    Refresh,
}

impl RevocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationKind::Access => "access",
            RevocationKind::Refresh => "refresh",
        }
    }
}

/// A revoked identifier, kept until the token would have expired anyway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub kind: RevocationKind,
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
}

impl RevocationEntry {
    pub fn new(kind: RevocationKind, identifier: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            expires_at,
        }
    }

    /// Eligible for eviction once `now` is past `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// SHA-256 fingerprint of a bearer token, hex encoded.
///
/// Access revocations are stored under this value so raw bearer tokens never
/// sit in a revocation list.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
