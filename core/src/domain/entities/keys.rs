//! Signing key entities: key classes, key sets and the immutable snapshot
//! handed to issuers and verifiers.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::entities::token::TokenKind;
use crate::errors::KeyError;

/// Maximum number of secrets retained per symmetric class
pub const MAX_SYMMETRIC_KEYS: usize = 3;

/// Length of the hex key id embedded in token headers
pub const KEY_ID_LEN: usize = 16;

/// Independent classes of signing material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyClass {
    /// HMAC secrets for access tokens
    AccessSecret,
    /// HMAC secrets for refresh tokens
    RefreshSecret,
    /// RSA keypair used when asymmetric signing is available
    RsaPair,
}

impl KeyClass {
    /// Every key class, in scheduler order
    pub const ALL: [KeyClass; 3] = [KeyClass::AccessSecret, KeyClass::RefreshSecret, KeyClass::RsaPair];

    /// Stable name used in logs and persisted bundles
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyClass::AccessSecret => "access_secret",
            KeyClass::RefreshSecret => "refresh_secret",
            KeyClass::RsaPair => "rsa_pair",
        }
    }

    /// Whether this class holds an ordered set of HMAC secrets
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, KeyClass::RsaPair)
    }
}

impl std::fmt::Display for KeyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short, non-secret identifier derived from key material
pub fn key_id_for(material: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(material));
    digest[..KEY_ID_LEN].to_string()
}

/// One HMAC secret with its prepared signing and verification keys
#[derive(Clone)]
pub struct SymmetricKey {
    secret: String,
    key_id: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SymmetricKey {
    /// Prepare a secret for signing and verification
    pub fn new(secret: impl Into<String>) -> Result<Self, KeyError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(KeyError::InvalidKeyMaterial {
                message: "symmetric secret must not be empty".to_string(),
            });
        }

        Ok(Self {
            key_id: key_id_for(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            secret,
        })
    }

    /// Raw secret, only for persistence
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Header key id for tokens signed with this secret
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Key used to sign tokens
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Key used to verify tokens
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Ordered secrets, newest first. Index 0 signs; all entries verify.
///
/// Always holds between one and [`MAX_SYMMETRIC_KEYS`] entries.
#[derive(Debug, Clone)]
pub struct SymmetricKeySet {
    keys: Vec<SymmetricKey>,
}

impl SymmetricKeySet {
    /// Build a set from secrets ordered newest first; extras beyond the cap are dropped
    pub fn new<I, S>(secrets: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = secrets
            .into_iter()
            .take(MAX_SYMMETRIC_KEYS)
            .map(SymmetricKey::new)
            .collect::<Result<Vec<_>, _>>()?;

        if keys.is_empty() {
            return Err(KeyError::InvalidKeyMaterial {
                message: "symmetric key set requires at least one secret".to_string(),
            });
        }

        Ok(Self { keys })
    }

    /// The key new tokens are signed with
    pub fn signing_key(&self) -> &SymmetricKey {
        &self.keys[0]
    }

    /// Every key a token may have been signed with, newest first
    pub fn verification_keys(&self) -> &[SymmetricKey] {
        &self.keys
    }

    /// Raw secrets, newest first
    pub fn secrets(&self) -> Vec<&str> {
        self.keys.iter().map(SymmetricKey::secret).collect()
    }

    /// Number of retained secrets
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// A valid set is never empty; provided for API symmetry
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// New set with `secret` prepended and the oldest entries truncated
    pub fn rotated(&self, secret: impl Into<String>) -> Result<Self, KeyError> {
        let mut keys = Vec::with_capacity(MAX_SYMMETRIC_KEYS);
        keys.push(SymmetricKey::new(secret)?);
        keys.extend(self.keys.iter().take(MAX_SYMMETRIC_KEYS - 1).cloned());
        Ok(Self { keys })
    }
}

/// RSA keypair with prepared keys. Rotation replaces the whole pair.
#[derive(Clone)]
pub struct RsaKeyPair {
    private_pem: String,
    public_pem: String,
    key_id: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RsaKeyPair {
    /// Parse a PEM pair and check that the halves belong together
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| {
            KeyError::InvalidKeyMaterial {
                message: format!("Invalid private key format: {}", e),
            }
        })?;

        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| {
            KeyError::InvalidKeyMaterial {
                message: format!("Invalid public key format: {}", e),
            }
        })?;

        let probe = b"keypair-consistency-check";
        let signature = jsonwebtoken::crypto::sign(probe, &encoding_key, Algorithm::RS256)
            .map_err(|e| KeyError::InvalidKeyMaterial {
                message: format!("Private key cannot sign: {}", e),
            })?;
        let matches = jsonwebtoken::crypto::verify(&signature, probe, &decoding_key, Algorithm::RS256)
            .unwrap_or(false);
        if !matches {
            return Err(KeyError::InvalidKeyMaterial {
                message: "public key does not match private key".to_string(),
            });
        }

        Ok(Self {
            private_pem: private_pem.to_string(),
            public_pem: public_pem.to_string(),
            key_id: key_id_for(public_pem.as_bytes()),
            encoding_key,
            decoding_key,
        })
    }

    /// PEM-encoded private key, only for persistence
    pub fn private_pem(&self) -> &str {
        &self.private_pem
    }

    /// PEM-encoded public key
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// Header key id for tokens signed with this pair
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Key used to sign tokens
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Key used to verify tokens
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Which family of algorithms new tokens are signed with.
///
/// Resolved once when a snapshot is built, never per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningPolicy {
    /// RS256 with the current RSA pair
    Asymmetric,
    /// HS256 with the newest secret of the token's class
    Symmetric,
}

impl SigningPolicy {
    /// Header algorithm for tokens issued under this policy
    pub fn algorithm(&self) -> Algorithm {
        match self {
            SigningPolicy::Asymmetric => Algorithm::RS256,
            SigningPolicy::Symmetric => Algorithm::HS256,
        }
    }
}

/// Rotation bookkeeping for one key class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyClassState {
    /// Incremented on every successful rotation
    pub generation: u64,
    /// When the material was last replaced
    pub rotated_at: DateTime<Utc>,
}

/// Borrowed signing material for one issuance
#[derive(Clone, Copy)]
pub struct SigningKeyRef<'a> {
    pub algorithm: Algorithm,
    pub key_id: &'a str,
    pub key: &'a EncodingKey,
}

impl std::fmt::Debug for SigningKeyRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyRef")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Immutable view of all key material at one point in time.
///
/// Rotation never mutates a snapshot; it publishes a new one.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    access: SymmetricKeySet,
    refresh: SymmetricKeySet,
    rsa: Option<RsaKeyPair>,
    access_state: KeyClassState,
    refresh_state: KeyClassState,
    rsa_state: KeyClassState,
    policy: SigningPolicy,
}

impl KeySnapshot {
    /// Initial snapshot; every class starts at generation 1, rotated at `loaded_at`
    pub fn new(
        access: SymmetricKeySet,
        refresh: SymmetricKeySet,
        rsa: Option<RsaKeyPair>,
        loaded_at: DateTime<Utc>,
    ) -> Self {
        let state = KeyClassState {
            generation: 1,
            rotated_at: loaded_at,
        };
        let policy = Self::resolve_policy(rsa.as_ref());

        Self {
            access,
            refresh,
            rsa,
            access_state: state,
            refresh_state: state,
            rsa_state: state,
            policy,
        }
    }

    fn resolve_policy(rsa: Option<&RsaKeyPair>) -> SigningPolicy {
        if rsa.is_some() {
            SigningPolicy::Asymmetric
        } else {
            SigningPolicy::Symmetric
        }
    }

    /// Override the recorded rotation time of one class (used when loading persisted state)
    pub fn with_rotated_at(mut self, class: KeyClass, rotated_at: DateTime<Utc>) -> Self {
        self.state_mut(class).rotated_at = rotated_at;
        self
    }

    /// Signing policy in force for this snapshot
    pub fn policy(&self) -> SigningPolicy {
        self.policy
    }

    /// Access token secrets
    pub fn access_keys(&self) -> &SymmetricKeySet {
        &self.access
    }

    /// Refresh token secrets
    pub fn refresh_keys(&self) -> &SymmetricKeySet {
        &self.refresh
    }

    /// Secrets for the given token kind
    pub fn symmetric_keys(&self, kind: TokenKind) -> &SymmetricKeySet {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Current RSA pair, if one is configured
    pub fn rsa_pair(&self) -> Option<&RsaKeyPair> {
        self.rsa.as_ref()
    }

    /// Rotation bookkeeping for a class
    pub fn state(&self, class: KeyClass) -> KeyClassState {
        match class {
            KeyClass::AccessSecret => self.access_state,
            KeyClass::RefreshSecret => self.refresh_state,
            KeyClass::RsaPair => self.rsa_state,
        }
    }

    fn state_mut(&mut self, class: KeyClass) -> &mut KeyClassState {
        match class {
            KeyClass::AccessSecret => &mut self.access_state,
            KeyClass::RefreshSecret => &mut self.refresh_state,
            KeyClass::RsaPair => &mut self.rsa_state,
        }
    }

    /// Key new tokens of `kind` are signed with, according to the policy
    pub fn signing_key(&self, kind: TokenKind) -> SigningKeyRef<'_> {
        match (self.policy, self.rsa.as_ref()) {
            (SigningPolicy::Asymmetric, Some(pair)) => SigningKeyRef {
                algorithm: Algorithm::RS256,
                key_id: pair.key_id(),
                key: pair.encoding_key(),
            },
            _ => {
                let key = self.symmetric_keys(kind).signing_key();
                SigningKeyRef {
                    algorithm: Algorithm::HS256,
                    key_id: key.key_id(),
                    key: key.encoding_key(),
                }
            }
        }
    }

    /// Snapshot with a rotated symmetric set for `class`
    pub(crate) fn with_symmetric(
        &self,
        class: KeyClass,
        keys: SymmetricKeySet,
        rotated_at: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        match class {
            KeyClass::AccessSecret => next.access = keys,
            KeyClass::RefreshSecret => next.refresh = keys,
            KeyClass::RsaPair => return next,
        }
        next.advance(class, rotated_at);
        next
    }

    /// Snapshot with the RSA pair replaced wholesale; the policy is re-resolved
    pub(crate) fn with_rsa(&self, pair: RsaKeyPair, rotated_at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.rsa = Some(pair);
        next.policy = Self::resolve_policy(next.rsa.as_ref());
        next.advance(KeyClass::RsaPair, rotated_at);
        next
    }

    fn advance(&mut self, class: KeyClass, rotated_at: DateTime<Utc>) {
        let state = self.state_mut(class);
        state.generation += 1;
        state.rotated_at = rotated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(set: &SymmetricKeySet) -> Vec<String> {
        set.secrets().into_iter().map(str::to_string).collect()
    }

    #[test]
    fn test_key_set_requires_a_secret() {
        let empty: Vec<String> = Vec::new();
        assert!(SymmetricKeySet::new(empty).is_err());
        assert!(SymmetricKeySet::new([""]).is_err());
    }

    #[test]
    fn test_key_set_truncates_to_cap() {
        let set = SymmetricKeySet::new(["a", "b", "c", "d"]).unwrap();
        assert_eq!(set.len(), MAX_SYMMETRIC_KEYS);
        assert_eq!(secrets(&set), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rotation_prepends_and_evicts_oldest() {
        let set = SymmetricKeySet::new(["s1"]).unwrap();

        let set = set.rotated("s2").unwrap();
        assert_eq!(secrets(&set), vec!["s2", "s1"]);
        assert_eq!(set.signing_key().secret(), "s2");

        let set = set.rotated("s3").unwrap().rotated("s4").unwrap();
        assert_eq!(secrets(&set), vec!["s4", "s3", "s2"]);
    }

    #[test]
    fn test_key_id_is_stable_and_not_the_secret() {
        let a = SymmetricKey::new("super-secret").unwrap();
        let b = SymmetricKey::new("super-secret").unwrap();
        assert_eq!(a.key_id(), b.key_id());
        assert_eq!(a.key_id().len(), KEY_ID_LEN);
        assert!(!a.key_id().contains("secret"));
        assert!(!format!("{:?}", a).contains("super-secret"));
    }

    #[test]
    fn test_snapshot_without_rsa_is_symmetric() {
        let now = Utc::now();
        let snapshot = KeySnapshot::new(
            SymmetricKeySet::new(["access"]).unwrap(),
            SymmetricKeySet::new(["refresh"]).unwrap(),
            None,
            now,
        );

        assert_eq!(snapshot.policy(), SigningPolicy::Symmetric);
        let signer = snapshot.signing_key(TokenKind::Refresh);
        assert_eq!(signer.algorithm, Algorithm::HS256);
        assert_eq!(signer.key_id, snapshot.refresh_keys().signing_key().key_id());

        let printed = format!("{:?}", signer);
        assert!(printed.contains(signer.key_id));
        assert!(!printed.contains("refresh\""));
    }

    #[test]
    fn test_snapshot_rotation_advances_only_that_class() {
        let now = Utc::now();
        let snapshot = KeySnapshot::new(
            SymmetricKeySet::new(["a1"]).unwrap(),
            SymmetricKeySet::new(["r1"]).unwrap(),
            None,
            now,
        );

        let later = now + chrono::Duration::days(31);
        let rotated = snapshot.with_symmetric(
            KeyClass::AccessSecret,
            snapshot.access_keys().rotated("a2").unwrap(),
            later,
        );

        assert_eq!(rotated.state(KeyClass::AccessSecret).generation, 2);
        assert_eq!(rotated.state(KeyClass::AccessSecret).rotated_at, later);
        assert_eq!(rotated.state(KeyClass::RefreshSecret).generation, 1);
        assert_eq!(snapshot.access_keys().len(), 1, "original snapshot untouched");
    }

    #[test]
    fn test_rsa_pair_rejects_garbage() {
        let err = RsaKeyPair::from_pem("not a key", "not a key").unwrap_err();
        assert!(matches!(err, KeyError::InvalidKeyMaterial { .. }));
    }
}
