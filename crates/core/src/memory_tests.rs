// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;

const TTL: Duration = Duration::from_secs(30);

fn pair() -> (FakeClock, MemoryClient<FakeClock>, MemoryClient<FakeClock>) {
    let clock = FakeClock::new();
    let store = MemoryStore::with_clock(clock.clone());
    (
        clock,
        MemoryClient::with_store(store.clone()),
        MemoryClient::with_store(store),
    )
}

#[tokio::test]
async fn clients_get_distinct_identities() {
    let (_, c1, c2) = pair();
    assert_ne!(c1.id(), c2.id());
}

#[tokio::test]
async fn set_id_close_and_reconnect() {
    let (_, mut c1, _) = pair();
    c1.set_id("myclient".to_string());
    assert_eq!(c1.id(), "myclient");

    c1.close().await;
    c1.close().await;
    c1.reconnect().await.unwrap();
    c1.reconnect().await.unwrap();

    let c3 = c1.duplicate();
    assert_eq!(c3.id(), "myclient");
}

#[tokio::test]
async fn duplicate_shares_the_table() {
    let (_, c1, _) = pair();
    let mut lock = c1.new_lock("job-x");
    lock.acquire(TTL).await.unwrap();

    let copy = c1.duplicate();
    let info = copy.new_lock("job-x").info().await.unwrap();
    assert!(info.acquired);
    assert_eq!(info.owner, c1.id());
}

#[tokio::test]
async fn lock_contract() {
    let (clock, c1, c2) = pair();
    let mut lock1 = c1.new_lock("job-x");
    let mut lock2 = c2.new_lock("job-x");
    lock1.set_data("client1".to_string());
    lock2.set_data("client2".to_string());

    lock1.acquire(TTL).await.unwrap();

    // Re-acquiring through the handle is contention, not a refresh
    assert!(matches!(lock1.acquire(TTL).await, Err(LockError::LockHeld { .. })));
    assert!(matches!(lock2.acquire(TTL).await, Err(LockError::LockHeld { .. })));
    assert!(matches!(lock2.release().await, Err(LockError::NotOwned { .. })));
    assert!(matches!(lock2.refresh().await, Err(LockError::NotOwned { .. })));

    lock1.refresh().await.unwrap();
    assert!(matches!(
        lock1.refresh_ttl(Duration::from_micros(500)).await,
        Err(LockError::InvalidTtl(_))
    ));
    // A rejected TTL is not stored
    assert_eq!(lock1.ttl(), TTL);

    clock.advance(Duration::from_secs(5));
    let info1 = lock1.info().await.unwrap();
    let info2 = lock2.info().await.unwrap();
    assert_eq!(info1, info2);
    assert_eq!(info1.name, "job-x");
    assert!(info1.acquired);
    assert_eq!(info1.owner, c1.id());
    assert_eq!(info1.data, "client1");
    assert!(info1.ttl > Duration::ZERO && info1.ttl <= TTL);

    lock1.set_data("newdata".to_string());
    lock1.refresh_ttl(info1.ttl * 2).await.unwrap();
    let info3 = lock1.info().await.unwrap();
    assert!(info3.ttl > info1.ttl);
    assert_eq!(info3.data, "newdata");

    lock1.release().await.unwrap();
    assert!(matches!(
        lock1.acquire(Duration::from_micros(500)).await,
        Err(LockError::InvalidTtl(_))
    ));
    assert!(matches!(lock1.release().await, Err(LockError::NotOwned { .. })));
    assert!(matches!(lock1.refresh().await, Err(LockError::NotOwned { .. })));
    assert!(!lock1.info().await.unwrap().acquired);
}

#[tokio::test]
async fn pending_data_reaches_the_store_only_on_refresh() {
    let (_, c1, c2) = pair();
    let mut lock = c1.new_lock("job-x");
    lock.set_data("v1".to_string());
    lock.acquire(TTL).await.unwrap();

    lock.set_data("v2".to_string());
    let observer = c2.new_lock("job-x");
    assert_eq!(observer.info().await.unwrap().data, "v1");

    lock.refresh().await.unwrap();
    assert_eq!(observer.info().await.unwrap().data, "v2");
}

#[tokio::test]
async fn leases_expire() {
    let (clock, c1, c2) = pair();
    let mut lock = c1.new_lock("job-x");
    lock.acquire(Duration::from_secs(1)).await.unwrap();
    clock.advance(Duration::from_secs(2));

    assert!(!lock.info().await.unwrap().acquired);
    assert!(matches!(lock.refresh().await, Err(LockError::NotOwned { .. })));
    assert!(matches!(lock.release().await, Err(LockError::NotOwned { .. })));

    let mut other = c2.new_lock("job-x");
    other.acquire(TTL).await.unwrap();
    assert_eq!(other.info().await.unwrap().owner, c2.id());
}

#[tokio::test]
async fn evict_simulates_a_lost_lease() {
    let (_, c1, _) = pair();
    let mut lock = c1.new_lock("job-x");
    lock.acquire(TTL).await.unwrap();

    assert!(c1.store().evict("job-x"));
    assert!(!c1.store().evict("job-x"));
    assert!(matches!(lock.refresh().await, Err(LockError::NotOwned { .. })));
}

#[tokio::test]
async fn unavailable_store_fails_with_backend_errors() {
    let (_, c1, _) = pair();
    let mut lock = c1.new_lock("job-x");
    lock.acquire(TTL).await.unwrap();

    c1.store().set_unavailable(true);
    assert!(matches!(lock.refresh().await, Err(LockError::Backend(_))));
    assert!(matches!(lock.info().await, Err(LockError::Backend(_))));

    c1.store().set_unavailable(false);
    assert!(lock.info().await.unwrap().acquired);
}

#[tokio::test]
async fn live_lists_only_unexpired_leases() {
    let (clock, c1, _) = pair();
    let mut short = c1.new_lock("short");
    short.acquire(Duration::from_secs(1)).await.unwrap();
    c1.new_lock("long").acquire(TTL).await.unwrap();
    assert_eq!(c1.store().live(), vec!["long", "short"]);

    clock.advance(Duration::from_secs(2));
    assert_eq!(c1.store().live(), vec!["long"]);
}

#[tokio::test]
async fn default_clients_share_the_global_table() {
    let c1 = MemoryClient::new();
    let c2 = MemoryClient::new();
    let name = format!("global-{}", c1.id());

    let mut lock = c1.new_lock(&name);
    lock.acquire(Duration::from_secs(5)).await.unwrap();
    assert!(matches!(
        c2.new_lock(&name).acquire(Duration::from_secs(5)).await,
        Err(LockError::LockHeld { .. })
    ));
    lock.release().await.unwrap();
}
