//! Fixtures shared by unit tests

use std::sync::Arc;

use once_cell::sync::Lazy;

use ks_shared::config::KeySourceConfig;

use crate::domain::clock::ManualClock;
use crate::repositories::{InMemoryRevocationStore, MemorySecretStore};
use crate::services::keys::{generate_rsa_pem, KeyManagerConfig, KeyRotationManager, SequenceKeyGenerator};
use crate::services::revocation::RevocationRegistry;
use crate::services::token::{TokenService, TokenServiceConfig};

/// RSA generation is slow; every test shares these pairs, `(private, public)`
static RSA_PAIRS: Lazy<Vec<(String, String)>> = Lazy::new(|| {
    (0..3)
        .map(|_| generate_rsa_pem(2048).expect("RSA fixture generation"))
        .collect()
});

pub(crate) fn rsa_pem(index: usize) -> (String, String) {
    RSA_PAIRS[index].clone()
}

/// Environment-style sources: first entry is the primary, the rest verify only
pub(crate) fn sources(access: &[&str], refresh: &[&str]) -> KeySourceConfig {
    let split = |secrets: &[&str]| -> (Option<String>, Vec<String>) {
        (
            secrets.first().map(|s| s.to_string()),
            secrets.iter().skip(1).map(|s| s.to_string()).collect(),
        )
    };
    let (access_secret, access_additional_secrets) = split(access);
    let (refresh_secret, refresh_additional_secrets) = split(refresh);

    KeySourceConfig {
        access_secret,
        access_additional_secrets,
        refresh_secret,
        refresh_additional_secrets,
        ..KeySourceConfig::default()
    }
}

/// Fully wired services over in-memory backends and a manual clock
pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemorySecretStore>,
    pub generator: Arc<SequenceKeyGenerator>,
    pub manager: Arc<KeyRotationManager>,
    pub revocations: Arc<InMemoryRevocationStore>,
    pub service: TokenService,
}

impl Harness {
    /// Symmetric-only keys seeded from `access`/`refresh`; rotations hand out `rotations`
    pub(crate) async fn symmetric(access: &[&str], refresh: &[&str], rotations: &[&str]) -> Self {
        Self::build(
            sources(access, refresh),
            SequenceKeyGenerator::new(rotations.iter().copied()),
            TokenServiceConfig::default(),
        )
        .await
    }

    /// Keys including an RSA pair, so tokens are signed with RS256
    pub(crate) async fn asymmetric(access: &[&str], refresh: &[&str]) -> Self {
        let (private_pem, public_pem) = rsa_pem(0);
        let mut sources = sources(access, refresh);
        sources.rsa_private_key = Some(private_pem);
        sources.rsa_public_key = Some(public_pem);

        Self::build(sources, SequenceKeyGenerator::new(Vec::<String>::new()), TokenServiceConfig::default())
            .await
    }

    pub(crate) async fn build(
        sources: KeySourceConfig,
        generator: SequenceKeyGenerator,
        token_config: TokenServiceConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemorySecretStore::new());
        let generator = Arc::new(generator);
        let config = KeyManagerConfig::default()
            .with_sources(sources)
            .without_rsa_generation();

        let manager = Arc::new(KeyRotationManager::new(
            store.clone(),
            generator.clone(),
            clock.clone(),
            config,
        ));
        manager.init().await.expect("key manager init");

        let revocations = Arc::new(InMemoryRevocationStore::new());
        let registry = Arc::new(RevocationRegistry::new(revocations.clone(), clock.clone()));
        let service = TokenService::new(manager.clone(), registry, clock.clone(), token_config);

        Self {
            clock,
            store,
            generator,
            manager,
            revocations,
            service,
        }
    }
}
