//! Integration tests for identity resolution through the context.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{Counters, FakeService, FakeSpec, InlineFetcher, context, fast_config, lib, settle};
use dodgeball::{Dodgeball, IntegrationRegistry, MemorySourceIdStore, SourceIdStore};
use dodgeball_core::{DodgeballError, DodgeballConfig, Fingerprint, InitConfig, IntegrationPurpose};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn init_with(libs: Vec<dodgeball_core::LibConfig>) -> InitConfig {
    InitConfig {
        request_id: "req-1".to_string(),
        libs,
    }
}

// =============================================================================
// WAITERS
// =============================================================================

#[tokio::test]
async fn waiter_registered_before_tracking_gets_the_identifier() {
    let service = Arc::new(FakeService::new());
    let dodgeball = Arc::new(context(Arc::clone(&service), IntegrationRegistry::new()));
    assert!(!dodgeball.is_identified());

    let waiter = {
        let dodgeball = Arc::clone(&dodgeball);
        tokio::spawn(async move { dodgeball.get_identity().await })
    };
    dodgeball.track();
    dodgeball.track();

    assert_eq!(waiter.await.unwrap(), "src-1");
    assert!(dodgeball.is_identified());
    assert_eq!(dodgeball.get_identity().await, "src-1");
    assert_eq!(service.identify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn callback_fires_once_with_the_identifier() {
    let dodgeball = context(Arc::new(FakeService::new()), IntegrationRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    dodgeball.track();

    let seen = {
        let calls = Arc::clone(&calls);
        dodgeball
            .get_identity_with(move |id| {
                assert_eq!(id, "src-1");
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
    };

    assert_eq!(seen, "src-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dispose_during_slow_load_releases_waiters() {
    let fp = FakeSpec::new("fp", [IntegrationPurpose::Identify])
        .slow_load(Duration::from_secs(3600));
    let service = Arc::new(FakeService::new().with_init(Ok(init_with(vec![lib("fp")]))));
    let dodgeball = context(Arc::clone(&service), fp.register(IntegrationRegistry::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    dodgeball.track();
    tokio::time::sleep(Duration::from_millis(10)).await;
    dodgeball.dispose();

    let seen = {
        let calls = Arc::clone(&calls);
        tokio::time::timeout(
            Duration::from_secs(1),
            dodgeball.get_identity_with(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .expect("waiter released on dispose")
    };

    assert_eq!(seen, "");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.identify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn dispose_releases_waiters_with_the_stored_id() {
    let fp = FakeSpec::new("fp", [IntegrationPurpose::Identify]).hanging_load();
    let service = Arc::new(FakeService::new().with_init(Ok(init_with(vec![lib("fp")]))));
    let store = Arc::new(MemorySourceIdStore::new());
    store.save("stored-9").unwrap();
    let dodgeball = Dodgeball::builder("pk_test")
        .config(fast_config())
        .registry(fp.register(IntegrationRegistry::new()))
        .service(service)
        .fetcher(Arc::new(InlineFetcher::default()))
        .store(store)
        .build();

    dodgeball.track();
    tokio::time::sleep(Duration::from_millis(10)).await;
    dodgeball.dispose();

    assert_eq!(dodgeball.get_identity().await, "stored-9");
    // A finished identification is not replaced by a later dispose.
    dodgeball.dispose();
    assert_eq!(dodgeball.get_identity().await, "stored-9");
}

#[tokio::test]
async fn initialize_after_identification_does_not_call_again() {
    let service = Arc::new(FakeService::new());
    let dodgeball = context(Arc::clone(&service), IntegrationRegistry::new());

    assert_eq!(dodgeball.initialize().await, "src-1");
    assert_eq!(dodgeball.initialize().await, "src-1");
    assert_eq!(service.identify_calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// BEST-EFFORT FALLBACKS
// =============================================================================

#[tokio::test]
async fn identify_failure_falls_back_to_stored_id() {
    let service = Arc::new(
        FakeService::new().with_identify(Err(DodgeballError::ServerError(503, "busy".to_string()))),
    );
    let store = Arc::new(MemorySourceIdStore::new());
    store.save("stored-9").unwrap();
    let dodgeball = Dodgeball::builder("pk_test")
        .config(fast_config())
        .service(service)
        .fetcher(Arc::new(InlineFetcher::default()))
        .store(store)
        .build();

    assert_eq!(dodgeball.initialize().await, "stored-9");
    assert_eq!(dodgeball.get_identity().await, "stored-9");
}

#[tokio::test]
async fn identify_failure_without_stored_id_still_releases_waiters() {
    let service = Arc::new(FakeService::new().with_identify(Err(DodgeballError::RateLimited)));
    let dodgeball = context(service, IntegrationRegistry::new());

    assert_eq!(dodgeball.initialize().await, "");
    assert!(dodgeball.is_identified());
    assert_eq!(dodgeball.get_identity().await, "");
}

#[tokio::test]
async fn unreachable_init_identifies_without_fingerprints() {
    let service = Arc::new(
        FakeService::new().with_init(Err(DodgeballError::ConnectionFailed("offline".to_string()))),
    );
    let dodgeball = context(Arc::clone(&service), IntegrationRegistry::new());

    assert_eq!(dodgeball.initialize().await, "src-1");
    assert!(service.fingerprints.lock().unwrap().is_empty());
}

// =============================================================================
// INTEGRATIONS DURING IDENTIFICATION
// =============================================================================

#[tokio::test]
async fn identifiers_fingerprint_and_observers_start_with_the_id() {
    let fp = FakeSpec::new("fp", [IntegrationPurpose::Identify]).with_fingerprint(json!({"k": 1}));
    let obs = FakeSpec::new("obs", [IntegrationPurpose::Observe]);
    let registry = obs.register(fp.register(IntegrationRegistry::new()));
    let service = Arc::new(FakeService::new().with_init(Ok(init_with(vec![lib("fp"), lib("obs")]))));
    let dodgeball = context(Arc::clone(&service), registry);

    assert_eq!(dodgeball.initialize().await, "src-1");
    settle().await;

    assert_eq!(
        *service.fingerprints.lock().unwrap(),
        vec![Fingerprint::new("fp", json!({"k": 1}))]
    );
    assert_eq!(Counters::count(&obs.counters.observes), 1);
    assert_eq!(*obs.events.lock().unwrap(), vec!["obs:OBSERVE:src-1".to_string()]);
    assert_eq!(fp.counters.request_ids(), vec!["req-1"]);

    let loaded: Vec<String> = dodgeball
        .integrations()
        .iter()
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(loaded, vec!["fp", "obs"]);
}

#[tokio::test]
async fn previous_id_is_sent_and_replaced() {
    let service = Arc::new(FakeService::new());
    let store = Arc::new(MemorySourceIdStore::new());
    store.save("old").unwrap();
    let dodgeball = Dodgeball::builder("pk_test")
        .config(fast_config())
        .service(Arc::clone(&service) as Arc<dyn dodgeball::VerificationService>)
        .fetcher(Arc::new(InlineFetcher::default()))
        .store(Arc::clone(&store) as Arc<dyn SourceIdStore>)
        .build();

    dodgeball.initialize().await;

    assert_eq!(
        *service.previous_ids.lock().unwrap(),
        vec![Some("old".to_string())]
    );
    assert_eq!(store.load().as_deref(), Some("src-1"));
}

#[tokio::test]
async fn only_the_winning_run_persists_its_id() {
    let service = Arc::new(FakeService::new().with_identify_sequence(&["src-1", "src-2"]));
    let store = Arc::new(MemorySourceIdStore::new());
    let dodgeball = Dodgeball::builder("pk_test")
        .config(fast_config())
        .service(Arc::clone(&service) as Arc<dyn dodgeball::VerificationService>)
        .fetcher(Arc::new(InlineFetcher::default()))
        .store(Arc::clone(&store) as Arc<dyn SourceIdStore>)
        .build();

    let (first, second) = tokio::join!(dodgeball.initialize(), dodgeball.initialize());

    assert_eq!(service.identify_calls.load(Ordering::SeqCst), 2);
    assert_eq!(first, second);
    let winner = dodgeball.get_identity().await;
    assert_eq!(store.load(), Some(winner));
}

#[tokio::test]
async fn file_store_carries_the_id_across_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source-id");
    let config = DodgeballConfig {
        source_id_path: Some(path.display().to_string()),
        ..fast_config()
    };

    let first = Arc::new(FakeService::new());
    Dodgeball::builder("pk_test")
        .config(config.clone())
        .service(Arc::clone(&first) as Arc<dyn dodgeball::VerificationService>)
        .fetcher(Arc::new(InlineFetcher::default()))
        .build()
        .initialize()
        .await;
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "src-1");

    let second = Arc::new(FakeService::new().with_identify(Ok("src-2".to_string())));
    let dodgeball = Dodgeball::builder("pk_test")
        .config(config)
        .service(Arc::clone(&second) as Arc<dyn dodgeball::VerificationService>)
        .fetcher(Arc::new(InlineFetcher::default()))
        .build();

    assert_eq!(dodgeball.initialize().await, "src-2");
    assert_eq!(
        *second.previous_ids.lock().unwrap(),
        vec![Some("src-1".to_string())]
    );
}

#[tokio::test]
async fn disabled_cookies_keep_the_id_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source-id");
    let config = DodgeballConfig {
        source_id_path: Some(path.display().to_string()),
        disable_cookies: true,
        ..fast_config()
    };

    let dodgeball = Dodgeball::builder("pk_test")
        .config(config)
        .service(Arc::new(FakeService::new()))
        .fetcher(Arc::new(InlineFetcher::default()))
        .build();

    assert_eq!(dodgeball.initialize().await, "src-1");
    assert!(!path.exists());
}
