// tests/store_lock.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use safeflow::errors::FlowError;
use safeflow::store::lock::{LockTimings, StoreLock};
use safeflow::store::{KeyValueStore, MemoryStore};

type TestResult = Result<(), Box<dyn Error>>;

fn store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

fn timings(wait_ms: u64, hold_ms: u64) -> LockTimings {
    LockTimings {
        wait: Duration::from_millis(wait_ms),
        hold: Duration::from_millis(hold_ms),
        retry_interval: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_strings_and_hashes() -> TestResult {
    let store = MemoryStore::new();

    store.set("ns.a", "1").await?;
    assert_eq!(store.get("ns.a").await?, Some("1".to_string()));

    store.hset("ns.h", "f1", "x").await?;
    store.hset("ns.h", "f2", "y").await?;
    assert_eq!(store.hget("ns.h", "f1").await?, Some("x".to_string()));
    assert!(store.hexists("ns.h", "f2").await?);
    assert!(!store.hexists("ns.h", "f3").await?);
    assert_eq!(store.hvals("ns.h").await?, vec!["x".to_string(), "y".to_string()]);

    assert!(matches!(store.get("ns.h").await, Err(FlowError::Store(_))));

    let mut keys = store.keys("ns.").await?;
    keys.sort();
    assert_eq!(keys, vec!["ns.a".to_string(), "ns.h".to_string()]);
    assert!(store.keys("other.").await?.is_empty());

    store.del("ns.a").await?;
    assert!(!store.exists("ns.a").await?);

    store.flush().await;
    assert!(store.keys("").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_expired_keys_read_as_absent() -> TestResult {
    let store = MemoryStore::new();
    store.set("k", "v").await?;

    assert!(store.expire("k", Duration::from_millis(30)).await?);
    assert!(!store.expire("missing", Duration::from_secs(1)).await?);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(store.get("k").await?, None);
    assert!(!store.exists("k").await?);
    assert!(store.keys("").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_overwrite_keeps_ttl() -> TestResult {
    let store = MemoryStore::new();
    store.set("k", "v1").await?;
    store.expire("k", Duration::from_secs(10)).await?;

    store.set("k", "v2").await?;
    assert_eq!(store.get("k").await?, Some("v2".to_string()));
    assert_eq!(store.ttl("k").await?, Some(Duration::from_secs(10)));
    Ok(())
}

#[tokio::test]
async fn test_persist_removes_ttl() -> TestResult {
    let store = MemoryStore::new();
    store.set("k", "v").await?;
    store.expire("k", Duration::from_secs(10)).await?;
    assert_eq!(store.ttl("k").await?, Some(Duration::from_secs(10)));

    store.persist("k").await?;
    assert_eq!(store.ttl("k").await?, None);
    assert!(store.exists("k").await?);
    Ok(())
}

#[tokio::test]
async fn test_lock_is_exclusive_until_released() -> TestResult {
    let store = store();

    let held = StoreLock::try_acquire(&store, "lock", timings(20, 5_000))
        .await?
        .ok_or("first acquire failed")?;
    assert_eq!(held.key(), "lock");

    let contended = StoreLock::try_acquire(&store, "lock", timings(20, 5_000)).await?;
    assert!(contended.is_none());

    assert!(held.release().await?);
    let again = StoreLock::try_acquire(&store, "lock", timings(20, 5_000)).await?;
    assert!(again.is_some());
    Ok(())
}

#[tokio::test]
async fn test_acquire_reports_timeout() -> TestResult {
    let store = store();
    let _held = StoreLock::acquire(&store, "lock", timings(20, 5_000)).await?;

    match StoreLock::acquire(&store, "lock", timings(20, 5_000)).await {
        Err(FlowError::LockAcquisitionTimeout(key)) => assert_eq!(key, "lock"),
        other => panic!("Expected LockAcquisitionTimeout, got: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over() -> TestResult {
    let store = store();

    let stale = StoreLock::try_acquire(&store, "lock", timings(10, 30))
        .await?
        .ok_or("first acquire failed")?;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let fresh = StoreLock::try_acquire(&store, "lock", timings(10, 5_000))
        .await?
        .ok_or("takeover failed")?;

    // The stale holder must not release the new holder's lock.
    assert!(!stale.release().await?);
    assert!(store.exists("lock").await?);
    assert!(fresh.release().await?);
    assert!(!store.exists("lock").await?);
    Ok(())
}

#[tokio::test]
async fn test_waiting_acquirer_gets_lock_after_release() -> TestResult {
    let store = store();
    let held = StoreLock::try_acquire(&store, "lock", timings(10, 5_000))
        .await?
        .ok_or("first acquire failed")?;

    let waiter_store = Arc::clone(&store);
    let waiter = tokio::spawn(async move {
        StoreLock::try_acquire(&waiter_store, "lock", timings(1_000, 5_000)).await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    held.release().await?;

    let acquired = waiter.await??;
    assert!(acquired.is_some());
    Ok(())
}
