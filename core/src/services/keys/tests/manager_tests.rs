//! Unit tests for the key rotation manager

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use tokio::sync::Barrier;

use ks_shared::config::KeySourceConfig;

use crate::domain::clock::{Clock, ManualClock};
use crate::domain::entities::keys::{KeyClass, SigningPolicy};
use crate::domain::entities::secret::{SecretBackendStatus, SecretBundle};
use crate::errors::KeyError;
use crate::repositories::{DisabledSecretStore, MemorySecretStore, SecretStore};
use crate::services::keys::bundle;
use crate::services::keys::{
    KeyManagerConfig, KeyRotationManager, RotationOutcome, SequenceKeyGenerator,
};
use crate::test_support::{rsa_pem, sources, Harness};

fn manager(
    store: Arc<dyn SecretStore>,
    generator: SequenceKeyGenerator,
    config: KeyManagerConfig,
) -> (KeyRotationManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let manager = KeyRotationManager::new(store, Arc::new(generator), clock.clone(), config);
    (manager, clock)
}

fn env_config(access: &[&str], refresh: &[&str]) -> KeyManagerConfig {
    KeyManagerConfig::default()
        .with_sources(sources(access, refresh))
        .without_rsa_generation()
}

fn access_secrets(manager: &KeyRotationManager) -> Vec<String> {
    let snapshot = manager.snapshot().unwrap();
    snapshot
        .access_keys()
        .secrets()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_snapshot_before_init_is_an_error() {
    let (manager, _) = manager(
        Arc::new(MemorySecretStore::new()),
        SequenceKeyGenerator::default(),
        env_config(&["a1"], &["r1"]),
    );

    assert!(!manager.is_initialized());
    assert_eq!(manager.snapshot().unwrap_err(), KeyError::NotInitialized);
}

#[tokio::test]
async fn test_init_from_environment_seeds_empty_backend() {
    let store = Arc::new(MemorySecretStore::new());
    let (manager, _) = manager(
        store.clone(),
        SequenceKeyGenerator::default(),
        env_config(&["a1", "a0"], &["r1"]),
    );

    let snapshot = manager.init().await.unwrap();

    assert_eq!(manager.backend_status(), SecretBackendStatus::Enabled);
    assert_eq!(snapshot.policy(), SigningPolicy::Symmetric);
    assert_eq!(snapshot.access_keys().secrets(), vec!["a1", "a0"]);
    assert_eq!(snapshot.refresh_keys().secrets(), vec!["r1"]);

    let seeded = store.peek("ks/jwt").await.expect("jwt bundle seeded");
    assert_eq!(seeded.get(bundle::ACCESS_SECRETS), Some(r#"["a1","a0"]"#));
    assert_eq!(seeded.get(bundle::REFRESH_SECRETS), Some(r#"["r1"]"#));
    assert!(store.peek("ks/rsa").await.is_none());
}

#[tokio::test]
async fn test_init_prefers_backend_material() {
    let rotated_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let stored = SecretBundle::new()
        .with(bundle::ACCESS_SECRETS, bundle::encode_secrets(&["stored-a2", "stored-a1"]))
        .with(bundle::ACCESS_ROTATED_AT, rotated_at.to_rfc3339())
        .with(bundle::REFRESH_SECRETS, bundle::encode_secrets(&["stored-r1"]));
    let store = Arc::new(MemorySecretStore::new().with_bundle("ks/jwt", stored).await);

    let (manager, _) = manager(
        store.clone(),
        SequenceKeyGenerator::default(),
        env_config(&["env-a"], &["env-r"]),
    );
    let snapshot = manager.init().await.unwrap();

    assert_eq!(snapshot.access_keys().secrets(), vec!["stored-a2", "stored-a1"]);
    assert_eq!(snapshot.refresh_keys().secrets(), vec!["stored-r1"]);
    assert_eq!(snapshot.state(KeyClass::AccessSecret).rotated_at, rotated_at);
    assert_eq!(store.write_count(), 0, "complete backend material is not rewritten");
}

#[tokio::test]
async fn test_unavailable_backend_falls_back_to_environment() {
    let store = Arc::new(MemorySecretStore::new());
    store.set_unavailable(true);
    let (manager, _) = manager(
        store.clone(),
        SequenceKeyGenerator::default(),
        env_config(&["env-a"], &["env-r"]),
    );

    let snapshot = manager.init().await.unwrap();

    assert_eq!(manager.backend_status(), SecretBackendStatus::Disabled);
    assert_eq!(snapshot.access_keys().secrets(), vec!["env-a"]);
}

#[tokio::test]
async fn test_failed_read_never_overwrites_stored_history() {
    let stored = SecretBundle::new()
        .with(
            bundle::ACCESS_SECRETS,
            bundle::encode_secrets(&["rotated-3", "rotated-2", "rotated-1"]),
        )
        .with(bundle::REFRESH_SECRETS, bundle::encode_secrets(&["rotated-r1"]));
    let store = Arc::new(MemorySecretStore::new().with_bundle("ks/jwt", stored.clone()).await);
    store.set_fail_reads(true);

    let (manager, _) = manager(
        store.clone(),
        SequenceKeyGenerator::new(["a2"]),
        env_config(&["env-a"], &["env-r"]),
    );
    let snapshot = manager.init().await.unwrap();

    // This process runs on the environment secrets...
    assert_eq!(manager.backend_status(), SecretBackendStatus::Enabled);
    assert_eq!(snapshot.access_keys().secrets(), vec!["env-a"]);
    // ...but the shared history is left alone, at startup and on rotation.
    assert_eq!(store.write_count(), 0);
    assert!(matches!(
        manager.rotate(KeyClass::AccessSecret).await,
        Err(KeyError::PersistenceFailure { .. })
    ));
    assert_eq!(access_secrets(&manager), vec!["env-a"]);
    assert_eq!(store.peek("ks/jwt").await, Some(stored));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_unparseable_stored_bundle_is_not_reseeded() {
    let stored = SecretBundle::new()
        .with(bundle::ACCESS_SECRETS, "written,by,hand")
        .with(bundle::REFRESH_SECRETS, bundle::encode_secrets(&["stored-r1"]));
    let store = Arc::new(MemorySecretStore::new().with_bundle("ks/jwt", stored.clone()).await);

    let (manager, _) = manager(
        store.clone(),
        SequenceKeyGenerator::default(),
        env_config(&["env-a"], &["env-r"]),
    );
    let snapshot = manager.init().await.unwrap();

    assert_eq!(snapshot.access_keys().secrets(), vec!["env-a"]);
    assert_eq!(snapshot.refresh_keys().secrets(), vec!["stored-r1"]);
    assert_eq!(store.peek("ks/jwt").await, Some(stored));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_health_check_is_bounded() {
    let store = Arc::new(MemorySecretStore::new());
    store.set_latency(StdDuration::from_secs(60));
    let mut config = env_config(&["env-a"], &["env-r"]);
    config.backend_timeout = StdDuration::from_secs(5);
    let (manager, _) = manager(store, SequenceKeyGenerator::default(), config);

    manager.init().await.unwrap();

    assert_eq!(manager.backend_status(), SecretBackendStatus::Disabled);
}

#[tokio::test]
async fn test_init_generates_missing_secrets() {
    let (manager, _) = manager(
        Arc::new(MemorySecretStore::new()),
        SequenceKeyGenerator::new(["fresh-access", "fresh-refresh"]),
        KeyManagerConfig::default()
            .with_sources(KeySourceConfig::default())
            .without_rsa_generation(),
    );

    let snapshot = manager.init().await.unwrap();

    assert_eq!(snapshot.access_keys().secrets(), vec!["fresh-access"]);
    assert_eq!(snapshot.refresh_keys().secrets(), vec!["fresh-refresh"]);
    assert!(snapshot.rsa_pair().is_none());
}

#[tokio::test]
async fn test_init_runs_once_under_concurrent_callers() {
    let store = Arc::new(MemorySecretStore::new());
    let (manager, _) = manager(
        store.clone(),
        SequenceKeyGenerator::default(),
        KeyManagerConfig::default()
            .with_sources(KeySourceConfig::default())
            .without_rsa_generation(),
    );
    let manager = Arc::new(manager);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.init().await.unwrap() })
        })
        .collect();

    let mut snapshots = Vec::new();
    for handle in handles {
        snapshots.push(handle.await.unwrap());
    }

    assert!(snapshots.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(store.write_count(), 1, "exactly one load seeded the backend");
    assert_eq!(snapshots[0].access_keys().secrets(), vec!["generated-secret-1"]);
}

#[tokio::test]
async fn test_rotation_retains_three_generations() {
    let harness = Harness::symmetric(&["s1"], &["r1"], &["s2", "s3", "s4"]).await;
    let manager = &harness.manager;

    let outcome = manager.rotate(KeyClass::AccessSecret).await.unwrap();
    assert!(outcome.is_rotated());
    assert_eq!(outcome.generation(), 2);
    assert_eq!(access_secrets(manager), vec!["s2", "s1"]);

    manager.rotate(KeyClass::AccessSecret).await.unwrap();
    manager.rotate(KeyClass::AccessSecret).await.unwrap();
    assert_eq!(access_secrets(manager), vec!["s4", "s3", "s2"]);

    let snapshot = manager.snapshot().unwrap();
    assert_eq!(snapshot.state(KeyClass::AccessSecret).generation, 4);
    assert_eq!(snapshot.state(KeyClass::RefreshSecret).generation, 1);
    assert_eq!(snapshot.refresh_keys().secrets(), vec!["r1"]);

    let persisted = harness.store.peek("ks/jwt").await.unwrap();
    assert_eq!(persisted.get(bundle::ACCESS_SECRETS), Some(r#"["s4","s3","s2"]"#));
}

#[tokio::test]
async fn test_rotation_due_per_class_interval() {
    let harness = Harness::symmetric(&["a1"], &["r1"], &[]).await;
    let manager = &harness.manager;

    assert!(!manager.is_rotation_due(KeyClass::AccessSecret).unwrap());
    assert!(!manager.is_rotation_due(KeyClass::RsaPair).unwrap());

    harness.clock.advance(Duration::days(30));
    assert!(!manager.is_rotation_due(KeyClass::AccessSecret).unwrap());

    harness.clock.advance(Duration::seconds(1));
    assert!(manager.is_rotation_due(KeyClass::AccessSecret).unwrap());
    assert!(!manager.is_rotation_due(KeyClass::RefreshSecret).unwrap());

    harness.clock.advance(Duration::days(61));
    assert!(manager.is_rotation_due(KeyClass::RefreshSecret).unwrap());

    manager.rotate(KeyClass::AccessSecret).await.unwrap();
    assert!(!manager.is_rotation_due(KeyClass::AccessSecret).unwrap());
}

#[tokio::test]
async fn test_rotate_if_due_skips_fresh_keys() {
    let harness = Harness::symmetric(&["a1"], &["r1"], &["a2"]).await;

    assert_eq!(
        harness.manager.rotate_if_due(KeyClass::AccessSecret).await.unwrap(),
        None
    );

    harness.clock.advance(Duration::days(31));
    let outcome = harness
        .manager
        .rotate_if_due(KeyClass::AccessSecret)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.generation(), 2);
}

#[tokio::test]
async fn test_persist_failure_keeps_previous_material() {
    let harness = Harness::symmetric(&["s1"], &["r1"], &["s2", "s3"]).await;
    harness.store.set_fail_writes(true);

    let err = harness.manager.rotate(KeyClass::AccessSecret).await.unwrap_err();

    assert!(matches!(err, KeyError::PersistenceFailure { .. }));
    assert!(err.is_retriable());
    assert_eq!(access_secrets(&harness.manager), vec!["s1"]);
    assert_eq!(
        harness.manager.snapshot().unwrap().state(KeyClass::AccessSecret).generation,
        1
    );

    harness.store.set_fail_writes(false);
    harness.manager.rotate(KeyClass::AccessSecret).await.unwrap();
    assert_eq!(access_secrets(&harness.manager), vec!["s3", "s1"]);
}

#[tokio::test]
async fn test_generation_failure_keeps_previous_material() {
    let harness = Harness::symmetric(&["s1"], &["r1"], &[]).await;
    harness.generator.set_failing(true);

    let err = harness.manager.rotate(KeyClass::AccessSecret).await.unwrap_err();

    assert!(matches!(err, KeyError::KeyGenerationFailure { .. }));
    assert_eq!(access_secrets(&harness.manager), vec!["s1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotation_advances_once() {
    let harness = Harness::symmetric(&["s1"], &["r1"], &["s2", "s3", "s4"]).await;
    // Keep the winning rotation in flight while the others queue up.
    harness.store.set_latency(StdDuration::from_millis(200));

    let callers = 16;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let manager = harness.manager.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                manager.rotate(KeyClass::AccessSecret).await.unwrap()
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let rotated = outcomes.iter().filter(|o| o.is_rotated()).count();
    assert_eq!(rotated, 1);
    assert!(outcomes
        .iter()
        .all(|o| o.generation() == 2 && o.class() == KeyClass::AccessSecret));
    assert_eq!(access_secrets(&harness.manager), vec!["s2", "s1"]);
}

#[tokio::test]
async fn test_classes_rotate_independently() {
    let harness = Harness::symmetric(&["a1"], &["r1"], &["new-1", "new-2"]).await;
    harness.store.set_latency(StdDuration::from_millis(20));

    let (access, refresh) = tokio::join!(
        harness.manager.rotate(KeyClass::AccessSecret),
        harness.manager.rotate(KeyClass::RefreshSecret),
    );
    assert!(access.unwrap().is_rotated());
    assert!(refresh.unwrap().is_rotated());

    let snapshot = harness.manager.snapshot().unwrap();
    assert_eq!(snapshot.access_keys().len(), 2);
    assert_eq!(snapshot.refresh_keys().len(), 2);

    // The last write must carry both rotations.
    let persisted = harness.store.peek("ks/jwt").await.unwrap();
    assert_eq!(
        persisted.get(bundle::ACCESS_SECRETS).map(str::to_string),
        Some(bundle::encode_secrets(&snapshot.access_keys().secrets()))
    );
    assert_eq!(
        persisted.get(bundle::REFRESH_SECRETS).map(str::to_string),
        Some(bundle::encode_secrets(&snapshot.refresh_keys().secrets()))
    );
}

#[tokio::test]
async fn test_rsa_rotation_replaces_pair() {
    let (private_pem, public_pem) = rsa_pem(0);
    let mut key_sources = sources(&["a1"], &["r1"]);
    key_sources.rsa_private_key = Some(private_pem);
    key_sources.rsa_public_key = Some(public_pem);

    let store = Arc::new(MemorySecretStore::new());
    let (manager, _) = manager(
        store.clone(),
        SequenceKeyGenerator::default().with_rsa_pairs([rsa_pem(1)]),
        KeyManagerConfig::default().with_sources(key_sources),
    );

    let before = manager.init().await.unwrap();
    assert_eq!(before.policy(), SigningPolicy::Asymmetric);
    let old_key_id = before.rsa_pair().unwrap().key_id().to_string();

    let outcome = manager.rotate(KeyClass::RsaPair).await.unwrap();

    let after = manager.snapshot().unwrap();
    let new_key_id = after.rsa_pair().unwrap().key_id().to_string();
    assert_ne!(old_key_id, new_key_id);
    assert_eq!(
        outcome,
        RotationOutcome::Rotated {
            class: KeyClass::RsaPair,
            generation: 2,
            key_id: new_key_id,
        }
    );
    assert_eq!(after.policy(), SigningPolicy::Asymmetric);

    let persisted = store.peek("ks/rsa").await.unwrap();
    assert_eq!(persisted.get(bundle::PUBLIC_KEY), Some(rsa_pem(1).1.as_str()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_disabled_backend_keeps_rsa_in_owner_only_files() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let mut key_sources = sources(&["a1"], &["r1"]);
    key_sources.private_key_path = dir.path().join("keys/private.pem").display().to_string();
    key_sources.public_key_path = dir.path().join("keys/public.pem").display().to_string();
    let config = KeyManagerConfig::default().with_sources(key_sources);

    let (first, _) = manager(
        Arc::new(DisabledSecretStore),
        SequenceKeyGenerator::default().with_rsa_pairs([rsa_pem(2)]),
        config.clone(),
    );
    let generated = first.init().await.unwrap();
    let key_id = generated.rsa_pair().unwrap().key_id().to_string();

    for file in ["keys/private.pem", "keys/public.pem"] {
        let mode = std::fs::metadata(dir.path().join(file))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600, "{} must be owner read/write only", file);
    }

    // A restart picks the same pair back up instead of generating another.
    let (second, clock) = manager(
        Arc::new(DisabledSecretStore),
        SequenceKeyGenerator::default(),
        config,
    );
    let reloaded = second.init().await.unwrap();
    assert_eq!(reloaded.rsa_pair().unwrap().key_id(), key_id);
    assert!(reloaded.state(KeyClass::RsaPair).rotated_at <= clock.now());
}

#[tokio::test]
async fn test_disabled_backend_rotates_secrets_in_memory() {
    let (manager, _) = manager(
        Arc::new(DisabledSecretStore),
        SequenceKeyGenerator::new(["a2"]),
        env_config(&["a1"], &["r1"]),
    );
    manager.init().await.unwrap();

    manager.rotate(KeyClass::AccessSecret).await.unwrap();

    assert_eq!(access_secrets(&manager), vec!["a2", "a1"]);
}

#[tokio::test]
async fn test_missing_rsa_generation_failure_falls_back_to_symmetric() {
    let dir = tempfile::tempdir().unwrap();
    let mut key_sources = sources(&["a1"], &["r1"]);
    key_sources.private_key_path = dir.path().join("private.pem").display().to_string();
    key_sources.public_key_path = dir.path().join("public.pem").display().to_string();

    // RSA generation enabled, but the generator has no pair to give.
    let (manager, _) = manager(
        Arc::new(DisabledSecretStore),
        SequenceKeyGenerator::default(),
        KeyManagerConfig::default().with_sources(key_sources),
    );

    let snapshot = manager.init().await.unwrap();

    assert_eq!(snapshot.policy(), SigningPolicy::Symmetric);
    assert!(manager.is_rotation_due(KeyClass::RsaPair).unwrap());
}
