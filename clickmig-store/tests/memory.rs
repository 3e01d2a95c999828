#![cfg(feature = "memory")]
#![allow(clippy::needless_return)]
mod store;

use chrono::{TimeZone, Utc};
use clickmig_store::{Engine, ManualClock, MemoryEngine};
use std::time::Duration;

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

#[tokio_shared_rt::test]
async fn set_nx() {
    let engine = MemoryEngine::new();
    store::test_set_nx(&engine).await.unwrap();
}

#[tokio_shared_rt::test]
async fn monotonic_scores() {
    let engine = MemoryEngine::new();
    store::test_monotonic_scores(&engine).await.unwrap();
}

#[tokio_shared_rt::test]
async fn range_and_prune() {
    let engine = MemoryEngine::new();
    store::test_range_and_prune(&engine).await.unwrap();
}

#[tokio_shared_rt::test]
async fn lease_expires_with_clock() {
    let clock = clock();
    let engine = MemoryEngine::with_clock(clock.clone());

    assert!(engine
        .set_nx("lease", "a", Duration::from_secs(10))
        .await
        .unwrap());

    clock.advance(Duration::from_secs(9));
    assert!(engine.exists("lease").await.unwrap());
    assert!(!engine
        .set_nx("lease", "b", Duration::from_secs(10))
        .await
        .unwrap());

    clock.advance(Duration::from_secs(1));
    assert!(!engine.exists("lease").await.unwrap());
    assert!(engine
        .set_nx("lease", "b", Duration::from_secs(10))
        .await
        .unwrap());

    assert!(!engine.del_if_eq("lease", "a").await.unwrap());
    assert!(engine.del_if_eq("lease", "b").await.unwrap());
}

#[tokio_shared_rt::test]
async fn clones_share_data() {
    let engine = MemoryEngine::new();
    let other = engine.clone();

    engine.zadd_max("workers", 42.0, "sync:1").await.unwrap();

    assert_eq!(other.score("workers", "sync:1"), Some(42.0));
}

#[tokio_shared_rt::test]
async fn legacy_rejects_optional_primitives() {
    let engine = MemoryEngine::new().legacy();

    let err = engine.zadd_gt("workers", 1.0, "sync:1").await.unwrap_err();
    assert!(err.is_unsupported());

    let err = engine.zrangebyscore("workers", 0.0).await.unwrap_err();
    assert!(err.is_unsupported());

    engine.zadd_max("workers", 1.0, "sync:1").await.unwrap();
    assert_eq!(
        engine.zrange_with_scores("workers").await.unwrap(),
        vec![("sync:1".to_owned(), 1.0)]
    );
}
