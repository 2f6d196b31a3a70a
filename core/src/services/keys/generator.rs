//! Fresh key material generation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::RsaPrivateKey;

use crate::domain::entities::keys::RsaKeyPair;
use crate::errors::KeyError;

/// Length in bytes of generated symmetric secrets
pub const SECRET_BYTES: usize = 32;

/// Default RSA modulus size
pub const DEFAULT_RSA_BITS: usize = 2048;

/// Source of new signing material
#[async_trait]
pub trait KeyMaterialGenerator: Send + Sync {
    /// A new random symmetric secret
    fn generate_secret(&self) -> Result<String, KeyError>;

    /// A new RSA keypair; may be slow and must not block the runtime
    async fn generate_rsa_pair(&self) -> Result<RsaKeyPair, KeyError>;
}

/// Generator backed by the operating system RNG
#[derive(Debug, Clone, Copy)]
pub struct OsKeyGenerator {
    rsa_bits: usize,
}

impl Default for OsKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_RSA_BITS)
    }
}

impl OsKeyGenerator {
    pub fn new(rsa_bits: usize) -> Self {
        Self { rsa_bits }
    }
}

#[async_trait]
impl KeyMaterialGenerator for OsKeyGenerator {
    fn generate_secret(&self) -> Result<String, KeyError> {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| KeyError::KeyGenerationFailure {
                message: format!("OS random source failed: {}", e),
            })?;
        Ok(hex::encode(bytes))
    }

    async fn generate_rsa_pair(&self) -> Result<RsaKeyPair, KeyError> {
        let bits = self.rsa_bits;
        let (private_pem, public_pem) = tokio::task::spawn_blocking(move || generate_rsa_pem(bits))
            .await
            .map_err(|e| KeyError::KeyGenerationFailure {
                message: format!("RSA generation task failed: {}", e),
            })??;

        RsaKeyPair::from_pem(&private_pem, &public_pem)
    }
}

/// PKCS#1 PEM encodings of a new keypair, `(private, public)`
pub fn generate_rsa_pem(bits: usize) -> Result<(String, String), KeyError> {
    let generation_failed = |e: &dyn std::fmt::Display| KeyError::KeyGenerationFailure {
        message: format!("Failed to generate RSA key: {}", e),
    };

    let private_key = RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| generation_failed(&e))?;
    let public_key = private_key.to_public_key();

    let private_pem = private_key
        .to_pkcs1_pem(Default::default())
        .map_err(|e| generation_failed(&e))?;
    let public_pem = public_key
        .to_pkcs1_pem(Default::default())
        .map_err(|e| generation_failed(&e))?;

    Ok((private_pem.to_string(), public_pem))
}

/// Deterministic generator for tests and scripted rotations.
///
/// Hands out queued secrets in order, then numbered fallbacks. RSA pairs must
/// be queued explicitly; with none queued, RSA generation fails.
#[derive(Debug, Default)]
pub struct SequenceKeyGenerator {
    secrets: Mutex<VecDeque<String>>,
    rsa_pairs: Mutex<VecDeque<(String, String)>>,
    counter: AtomicUsize,
    failing: AtomicBool,
}

impl SequenceKeyGenerator {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            secrets: Mutex::new(secrets.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Queue PEM pairs, `(private, public)`, for RSA generation
    pub fn with_rsa_pairs<I>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        lock(&self.rsa_pairs).extend(pairs);
        self
    }

    /// Make every generation call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_failing(&self) -> Result<(), KeyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeyError::KeyGenerationFailure {
                message: "generator switched to failing".to_string(),
            });
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl KeyMaterialGenerator for SequenceKeyGenerator {
    fn generate_secret(&self) -> Result<String, KeyError> {
        self.check_failing()?;
        let queued = lock(&self.secrets).pop_front();
        Ok(queued.unwrap_or_else(|| {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("generated-secret-{}", n)
        }))
    }

    async fn generate_rsa_pair(&self) -> Result<RsaKeyPair, KeyError> {
        self.check_failing()?;
        let queued = lock(&self.rsa_pairs).pop_front();
        match queued {
            Some((private_pem, public_pem)) => RsaKeyPair::from_pem(&private_pem, &public_pem),
            None => Err(KeyError::KeyGenerationFailure {
                message: "no RSA pair queued".to_string(),
            }),
        }
    }
}
