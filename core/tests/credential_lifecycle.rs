//! Integration tests for the credential lifecycle: load, issue, rotate, revoke

use std::sync::Arc;

use chrono::Duration;

use ks_core::services::keys::bundle::{encode_secrets, ACCESS_SECRETS, REFRESH_SECRETS};
use ks_core::{
    AccessTokenRequest, InMemoryRevocationStore, KeyClass, KeyManagerConfig, KeyRotationManager,
    KeyRotationScheduler, ManualClock, MemorySecretStore, RevocationRegistry, SchedulerConfig,
    SecretBackendStatus, SecretBundle, SequenceKeyGenerator, TokenError, TokenService,
    TokenServiceConfig,
};
use ks_shared::config::KeySourceConfig;

struct Stack {
    clock: Arc<ManualClock>,
    store: Arc<MemorySecretStore>,
    manager: Arc<KeyRotationManager>,
    registry: Arc<RevocationRegistry>,
    service: TokenService,
}

async fn stack(store: MemorySecretStore, rotations: &[&str]) -> Stack {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(store);
    let sources = KeySourceConfig {
        access_secret: Some("env-access".to_string()),
        refresh_secret: Some("env-refresh".to_string()),
        ..KeySourceConfig::default()
    };
    let config = KeyManagerConfig::default()
        .with_sources(sources)
        .without_rsa_generation();

    let manager = Arc::new(KeyRotationManager::new(
        store.clone(),
        Arc::new(SequenceKeyGenerator::new(rotations.iter().copied())),
        clock.clone(),
        config,
    ));
    manager.init().await.expect("init");

    let registry = Arc::new(RevocationRegistry::new(
        Arc::new(InMemoryRevocationStore::new()),
        clock.clone(),
    ));
    let service = TokenService::new(
        manager.clone(),
        registry.clone(),
        clock.clone(),
        TokenServiceConfig::default().with_access_ttl(3600),
    );

    Stack {
        clock,
        store,
        manager,
        registry,
        service,
    }
}

fn member() -> AccessTokenRequest {
    AccessTokenRequest::new("user-1", "dana").with_roles(["member"])
}

#[tokio::test]
async fn test_member_session_lifecycle() {
    let stack = stack(MemorySecretStore::new(), &[]).await;
    assert_eq!(stack.manager.backend_status(), SecretBackendStatus::Enabled);

    let pair = stack.service.issue_pair(&member()).expect("issue");
    let claims = stack.service.verify_access(&pair.access.token).await.expect("verify");
    assert_eq!(claims.roles, vec!["member"]);
    assert_eq!(claims.username, "dana");

    stack.clock.advance(Duration::seconds(3601));
    assert_eq!(
        stack.service.verify_access(&pair.access.token).await.unwrap_err(),
        TokenError::InvalidOrExpired
    );
    // The refresh token lives much longer.
    assert!(stack.service.verify_refresh(&pair.refresh.token).await.is_ok());
}

#[tokio::test]
async fn test_backend_material_survives_restart() {
    let backend = MemorySecretStore::new()
        .with_bundle(
            &KeyManagerConfig::default().jwt_path,
            SecretBundle::new()
                .with(ACCESS_SECRETS, encode_secrets(&["stored-access"]))
                .with(REFRESH_SECRETS, encode_secrets(&["stored-refresh"])),
        )
        .await;
    let first = stack(backend, &["rotated-access"]).await;
    let token = first.service.issue_access(&member()).unwrap().token;

    first.manager.rotate(KeyClass::AccessSecret).await.unwrap();
    let persisted = first
        .store
        .peek(&first.manager.config().jwt_path)
        .await
        .expect("bundle persisted");

    // A new process reading the same backend sees the rotated set.
    let second = stack(
        MemorySecretStore::new()
            .with_bundle(&first.manager.config().jwt_path, persisted)
            .await,
        &[],
    )
    .await;
    let snapshot = second.manager.snapshot().unwrap();
    assert_eq!(
        snapshot.access_keys().secrets(),
        vec!["rotated-access", "stored-access"]
    );
    assert!(second.service.verify_access(&token).await.is_ok());
}

#[tokio::test]
async fn test_unreachable_backend_falls_back_to_environment() {
    let backend = MemorySecretStore::new();
    backend.set_unavailable(true);
    let stack = stack(backend, &[]).await;

    assert_eq!(stack.manager.backend_status(), SecretBackendStatus::Disabled);
    assert_eq!(
        stack.manager.snapshot().unwrap().access_keys().secrets(),
        vec!["env-access"]
    );
    let issued = stack.service.issue_access(&member()).unwrap();
    assert!(stack.service.verify_access(&issued.token).await.is_ok());
}

#[tokio::test]
async fn test_scheduled_rotation_and_revocation_cleanup() {
    let stack = stack(MemorySecretStore::new(), &["a2", "a3", "a4"]).await;
    let scheduler = KeyRotationScheduler::new(stack.manager.clone(), SchedulerConfig::default())
        .with_revocations(stack.registry.clone());

    let original = stack.service.issue_access(&member()).unwrap();
    let revoked = stack.service.issue_access(&member()).unwrap();
    stack.service.revoke_access(&revoked.token).await.unwrap();
    assert!(stack.service.verify_access(&revoked.token).await.is_err());

    for _ in 0..3 {
        stack.clock.advance(Duration::days(31));
        let result = scheduler.run_cycle().await.unwrap();
        assert!(result.rotated(KeyClass::AccessSecret));
        assert!(result.is_success());
    }

    assert_eq!(
        stack.manager.snapshot().unwrap().access_keys().secrets(),
        vec!["a4", "a3", "a2"]
    );
    assert!(stack.service.verify_access(&original.token).await.is_err());
    assert!(!stack.registry.is_access_revoked(&revoked.token).await.unwrap());
}

#[test]
fn test_root_and_module_paths_name_the_same_items() {
    fn same<T: 'static, U: 'static>() -> bool {
        std::any::TypeId::of::<T>() == std::any::TypeId::of::<U>()
    }

    assert!(same::<ks_core::RevocationRegistry, ks_core::services::revocation::RevocationRegistry>());
    assert!(same::<
        ks_core::InMemoryRevocationStore,
        ks_core::repositories::revocation::InMemoryRevocationStore,
    >());
    assert!(same::<ks_core::MemorySecretStore, ks_core::repositories::secret::MemorySecretStore>());
}
