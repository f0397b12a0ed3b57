//! End-to-end pool lifecycle: fill, lease, release, close.

mod support;

use std::time::Duration;

use ballast_pool::{ConnectionPool, PoolConfig};
use pretty_assertions::assert_eq;
use support::TestConnector;

#[tokio::test]
async fn fills_to_min_size_on_construction() {
    let connector = TestConnector::new();
    let pool = ConnectionPool::new(
        "lifecycle",
        connector.clone(),
        PoolConfig::default().with_size(3, 5),
    )
    .await
    .unwrap();

    assert_eq!(connector.connects(), 3);
    let stats = pool.stats().await;
    assert_eq!(stats.available, 3);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.total_size, 3);
    assert_eq!(stats.total_created, 3);
    assert_eq!(stats.peak_size, 3);
}

#[tokio::test]
async fn released_connection_is_reused() {
    let connector = TestConnector::new();
    let pool = ConnectionPool::new(
        "lifecycle",
        connector.clone(),
        PoolConfig::default().with_size(1, 4),
    )
    .await
    .unwrap();

    let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
    let first_id = conn.id();
    let serial = conn.serial;
    assert_eq!(conn.use_count(), 1);
    conn.release().await;

    let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
    assert_eq!(conn.id(), first_id);
    assert_eq!(conn.serial, serial);
    assert_eq!(conn.use_count(), 2);
    conn.release().await;

    // Both leases were served by the single initial connection.
    assert_eq!(connector.connects(), 1);
    let stats = pool.stats().await;
    assert_eq!(stats.total_created, 1);
    assert_eq!(stats.available, 1);
}

#[tokio::test]
async fn grows_on_demand_up_to_max() {
    let connector = TestConnector::new();
    let pool = ConnectionPool::new(
        "lifecycle",
        connector.clone(),
        PoolConfig::default().with_size(1, 3),
    )
    .await
    .unwrap();

    let a = pool.acquire(Duration::from_secs(1)).await.unwrap();
    let b = pool.acquire(Duration::from_secs(1)).await.unwrap();
    let c = pool.acquire(Duration::from_secs(1)).await.unwrap();
    assert_ne!(a.serial, b.serial);
    assert_ne!(b.serial, c.serial);

    let stats = pool.stats().await;
    assert_eq!(stats.in_use, 3);
    assert_eq!(stats.total_size, 3);
    assert_eq!(stats.peak_size, 3);

    a.release().await;
    b.release().await;
    c.release().await;
    let stats = pool.stats().await;
    assert_eq!(stats.available, 3);
    assert_eq!(stats.in_use, 0);
}

#[tokio::test]
async fn close_drops_idles_and_rejects_acquires() {
    let connector = TestConnector::new();
    let pool = ConnectionPool::new(
        "lifecycle",
        connector.clone(),
        PoolConfig::default().with_size(2, 4),
    )
    .await
    .unwrap();

    let held = pool.acquire(Duration::from_secs(1)).await.unwrap();
    pool.close().await;
    assert!(pool.is_closed().await);

    // Closed pools refuse new leases without consuming the timeout.
    let started = std::time::Instant::now();
    assert!(pool.acquire(Duration::from_secs(5)).await.is_none());
    assert!(started.elapsed() < Duration::from_millis(100));

    let stats = pool.stats().await;
    assert_eq!(stats.available, 0);
    assert_eq!(stats.in_use, 0);

    // Returning an outstanding lease after close is a quiet no-op.
    held.release().await;
    let stats = pool.stats().await;
    assert_eq!(stats.available, 0);

    // Idempotent.
    pool.close().await;
    assert!(pool.is_closed().await);
}

#[tokio::test]
async fn close_wakes_parked_acquirers() {
    let connector = TestConnector::new();
    let pool = ConnectionPool::new(
        "lifecycle",
        connector.clone(),
        PoolConfig::default().with_size(1, 1),
    )
    .await
    .unwrap();

    let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();

    let closer = {
        let pool = pool.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            pool.close().await;
        })
    };

    // The waiter is parked at capacity; close unblocks it well before
    // its own deadline.
    let started = std::time::Instant::now();
    assert!(pool.acquire(Duration::from_secs(5)).await.is_none());
    assert!(started.elapsed() < Duration::from_secs(1));
    closer.await.unwrap();
}
