// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::{IdGen, SequentialIdGen};
use crate::memory::{MemoryClient, MemoryStore};
use std::time::Instant;
use yare::parameterized;

const UNIT: Duration = Duration::from_millis(100);

type Manager = LockManager<MemoryClient>;

fn managers() -> (MemoryStore, Manager, Manager) {
    let store = MemoryStore::new();
    let ids = SequentialIdGen::new("manager");
    let defaults = AcquireOptions::new(Duration::from_secs(5)).with_data("default");

    let mut first = MemoryClient::with_store(store.clone());
    first.set_id(ids.next());
    let mut second = MemoryClient::with_store(store.clone());
    second.set_id(ids.next());
    (
        store,
        LockManager::new(first, defaults.clone()),
        LockManager::new(second, defaults),
    )
}

const DEFAULT_TTL: Duration = Duration::from_secs(5);

#[parameterized(
    all_unset = { AcquireOptions::default(), DEFAULT_TTL, Duration::ZERO, "default" },
    ttl_set = { AcquireOptions::new(UNIT), UNIT, Duration::ZERO, "default" },
    wait_set = { AcquireOptions::default().with_max_wait(UNIT), DEFAULT_TTL, UNIT, "default" },
    data_set = { AcquireOptions::default().with_data("mine"), DEFAULT_TTL, Duration::ZERO, "mine" },
)]
fn options_fall_back_to_defaults(
    options: AcquireOptions,
    ttl: Duration,
    max_wait: Duration,
    data: &str,
) {
    let defaults = AcquireOptions::new(DEFAULT_TTL).with_data("default");
    let merged = options.or(&defaults);
    assert_eq!(merged.ttl, ttl);
    assert_eq!(merged.max_wait, max_wait);
    assert_eq!(merged.data, data);
}

#[test]
fn options_parse_humantime() {
    let options: AcquireOptions =
        toml::from_str("ttl = \"30s\"\nmax_wait = \"1m 30s\"\ndata = \"x\"").unwrap();
    assert_eq!(options.ttl, Duration::from_secs(30));
    assert_eq!(options.max_wait, Duration::from_secs(90));
    assert_eq!(options.data, "x");
}

#[tokio::test]
async fn try_acquire_uses_defaults() {
    let (_, mut m1, _) = managers();
    m1.try_acquire("job").await.unwrap();

    assert!(m1.is_held("job"));
    let info = m1.info("job").await.unwrap();
    assert!(info.acquired);
    assert_eq!(info.owner, m1.client().id());
    assert_eq!(info.data, "default");
    assert!(info.ttl > Duration::from_secs(4));
}

#[tokio::test]
async fn holders_are_told_apart_by_client_identity() {
    let (_, mut m1, mut m2) = managers();
    m1.try_acquire("job").await.unwrap();
    assert_eq!(m1.info("job").await.unwrap().owner, "manager-1");

    m1.release("job").await.unwrap();
    m2.try_acquire("job").await.unwrap();
    assert_eq!(m2.info("job").await.unwrap().owner, "manager-2");
}

#[tokio::test]
async fn try_acquire_is_single_shot() {
    let (_, mut m1, mut m2) = managers();
    m1.try_acquire("job").await.unwrap();

    let err = m2.try_acquire_ttl("job", UNIT).await.unwrap_err();
    assert!(matches!(err, LockError::LockHeld { .. }));
    assert!(!m2.is_held("job"));

    // Try on a name already held by this manager is not a refresh
    let err = m1.try_acquire("job").await.unwrap_err();
    assert!(err.is_contention());
}

#[tokio::test]
async fn acquire_without_wait_fails_fast() {
    let (_, mut m1, mut m2) = managers();
    m1.acquire("job", AcquireOptions::default()).await.unwrap();

    let started = Instant::now();
    let err = m2
        .acquire("job", AcquireOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::LockHeld { .. }));
    assert!(started.elapsed() < UNIT);
}

#[tokio::test]
async fn acquire_waits_for_the_holder_to_expire() {
    let (_, mut m1, mut m2) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT)).await.unwrap();

    let started = Instant::now();
    m2.acquire("job", AcquireOptions::new(UNIT).with_max_wait(UNIT * 5))
        .await
        .unwrap();
    assert!(started.elapsed() < UNIT * 4);

    let info = m2.info("job").await.unwrap();
    assert_eq!(info.owner, m2.client().id());
}

#[tokio::test]
async fn acquire_gives_up_after_max_wait() {
    let (_, mut m1, mut m2) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT * 10))
        .await
        .unwrap();

    let started = Instant::now();
    let err = m2
        .acquire("job", AcquireOptions::default().with_max_wait(UNIT))
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(err, LockError::LockHeld { .. }));
    assert!(waited >= UNIT);
    assert!(waited < UNIT * 5);
}

#[tokio::test]
async fn acquire_picks_up_a_released_lock() {
    let (_, mut m1, mut m2) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT * 3))
        .await
        .unwrap();

    let waiter = tokio::spawn(async move {
        m2.acquire("job", AcquireOptions::new(UNIT).with_max_wait(UNIT * 10))
            .await
            .map(|_| m2)
    });
    tokio::time::sleep(UNIT).await;
    m1.release("job").await.unwrap();

    let m2 = waiter.await.unwrap().unwrap();
    assert!(m2.is_held("job"));
}

#[tokio::test]
async fn reacquire_refreshes_with_new_terms() {
    let (_, mut m1, _) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT).with_data("first"))
        .await
        .unwrap();
    let longer = AcquireOptions::new(Duration::from_secs(10)).with_data("second");
    m1.acquire("job", longer).await.unwrap();

    let info = m1.info("job").await.unwrap();
    assert_eq!(info.data, "second");
    assert!(info.ttl > Duration::from_secs(9));
    assert_eq!(m1.held(), vec!["job".to_string()]);
}

#[tokio::test]
async fn reacquire_after_losing_the_lease() {
    let (store, mut m1, _) = managers();
    m1.acquire("job", AcquireOptions::default()).await.unwrap();
    store.evict("job");

    m1.acquire("job", AcquireOptions::default()).await.unwrap();
    assert!(m1.info("job").await.unwrap().acquired);
}

#[tokio::test]
async fn reacquire_after_another_client_took_over() {
    let (store, mut m1, mut m2) = managers();
    m1.acquire("job", AcquireOptions::default()).await.unwrap();
    store.evict("job");
    m2.acquire("job", AcquireOptions::default()).await.unwrap();

    let err = m1
        .acquire("job", AcquireOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::LockHeld { .. }));
    assert!(!m1.is_held("job"));
}

#[tokio::test]
async fn backend_errors_are_not_retried() {
    let (store, _, mut m2) = managers();
    store.set_unavailable(true);

    let started = Instant::now();
    let err = m2
        .acquire("job", AcquireOptions::default().with_max_wait(UNIT * 10))
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Backend(_)));
    assert!(started.elapsed() < UNIT);
}

#[tokio::test]
async fn unknown_names_are_invalid() {
    let (_, mut m1, _) = managers();
    assert!(matches!(m1.refresh("nope").await, Err(LockError::InvalidLock(_))));
    assert!(matches!(m1.release("nope").await, Err(LockError::InvalidLock(_))));
    assert!(matches!(m1.info("nope").await, Err(LockError::InvalidLock(_))));
    assert!(matches!(m1.set_data("nope", "x"), Err(LockError::InvalidLock(_))));
    let started = m1.start_heartbeat("nope").await;
    assert!(matches!(started, Err(LockError::InvalidLock(_))));
}

#[tokio::test]
async fn set_data_is_committed_by_refresh() {
    let (_, mut m1, _) = managers();
    m1.acquire("job", AcquireOptions::default()).await.unwrap();

    m1.set_data("job", "progress=50").unwrap();
    assert_eq!(m1.info("job").await.unwrap().data, "default");

    m1.refresh("job").await.unwrap();
    assert_eq!(m1.info("job").await.unwrap().data, "progress=50");
}

#[tokio::test]
async fn release_frees_the_lock_for_others() {
    let (store, mut m1, mut m2) = managers();
    m1.acquire("job", AcquireOptions::default()).await.unwrap();
    m1.release("job").await.unwrap();

    assert!(!m1.is_held("job"));
    assert!(store.live().is_empty());
    m2.try_acquire("job").await.unwrap();
}

#[tokio::test]
async fn release_of_a_lost_lease_still_forgets_it() {
    let (store, mut m1, _) = managers();
    m1.acquire("job", AcquireOptions::default()).await.unwrap();
    store.evict("job");

    let err = m1.release("job").await.unwrap_err();
    assert!(err.is_ownership());
    assert!(!m1.is_held("job"));
}

#[tokio::test]
async fn release_all_reports_per_lock_failures() {
    let (store, mut m1, _) = managers();
    for name in ["a", "b", "c"] {
        m1.acquire(name, AcquireOptions::default()).await.unwrap();
    }
    store.evict("b");

    let failures = m1.release_all().await;
    assert_eq!(failures.len(), 1);
    assert!(failures.contains_key("b"));
    assert!(m1.held().is_empty());
    assert!(store.live().is_empty());
}

#[tokio::test]
async fn heartbeat_outlives_the_ttl_and_stops_on_release() {
    let (store, mut m1, mut m2) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT)).await.unwrap();
    let _failures = m1.start_heartbeat("job").await.unwrap();

    tokio::time::sleep(UNIT * 3).await;
    assert!(m2.try_acquire("job").await.is_err());

    m1.release("job").await.unwrap();
    assert!(store.live().is_empty());
    m2.try_acquire("job").await.unwrap();
}

#[tokio::test]
async fn heartbeat_carries_new_data() {
    let (_, mut m1, _) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT)).await.unwrap();
    let _failures = m1.start_heartbeat("job").await.unwrap();

    m1.set_data("job", "step-2").unwrap();
    tokio::time::sleep(UNIT).await;
    assert_eq!(m1.info("job").await.unwrap().data, "step-2");

    // A refresh through the manager must not be clobbered by the heartbeat
    m1.acquire("job", AcquireOptions::new(UNIT).with_data("step-3"))
        .await
        .unwrap();
    tokio::time::sleep(UNIT).await;
    assert_eq!(m1.info("job").await.unwrap().data, "step-3");

    m1.stop_heartbeat("job").await;
}

#[tokio::test]
async fn stop_heartbeat_lets_the_lease_lapse() {
    let (_, mut m1, _) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT)).await.unwrap();
    let _failures = m1.start_heartbeat("job").await.unwrap();
    m1.stop_heartbeat("job").await;
    m1.stop_heartbeat("job").await;

    tokio::time::sleep(UNIT * 2).await;
    assert!(!m1.info("job").await.unwrap().acquired);
}

#[tokio::test]
async fn heartbeat_failure_reaches_the_owner() {
    let (store, mut m1, _) = managers();
    m1.acquire("job", AcquireOptions::new(UNIT)).await.unwrap();
    let mut failures = m1.start_heartbeat("job").await.unwrap();

    store.evict("job");
    let err = tokio::time::timeout(UNIT * 10, failures.recv())
        .await
        .unwrap()
        .unwrap()
        .claim();
    assert!(err.is_ownership());
}
