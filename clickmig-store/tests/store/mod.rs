use clickmig_store::Engine;
use std::time::Duration;

pub async fn test_set_nx<E: Engine>(engine: &E) -> anyhow::Result<()> {
    assert!(engine.set_nx("lease", "a", Duration::from_secs(60)).await?);
    assert!(!engine.set_nx("lease", "b", Duration::from_secs(60)).await?);
    assert!(engine.exists("lease").await?);

    assert!(!engine.del_if_eq("lease", "b").await?);
    assert!(engine.exists("lease").await?);

    assert!(engine.del_if_eq("lease", "a").await?);
    assert!(!engine.exists("lease").await?);
    assert!(!engine.del_if_eq("lease", "a").await?);

    assert!(engine.set_nx("lease", "b", Duration::from_secs(60)).await?);

    Ok(())
}

pub async fn test_monotonic_scores<E: Engine>(engine: &E) -> anyhow::Result<()> {
    engine.zadd_max("workers", 200.0, "sync:1").await?;
    engine.zadd_max("workers", 100.0, "sync:1").await?;
    engine.zadd_max("workers", 150.0, "sync:2").await?;

    let members = engine.zrange_with_scores("workers").await?;

    assert_eq!(
        members,
        vec![("sync:2".to_owned(), 150.0), ("sync:1".to_owned(), 200.0)]
    );

    engine.zadd_max("workers", 300.0, "sync:2").await?;

    let members = engine.zrange_with_scores("workers").await?;

    assert_eq!(
        members,
        vec![("sync:1".to_owned(), 200.0), ("sync:2".to_owned(), 300.0)]
    );

    Ok(())
}

pub async fn test_range_and_prune<E: Engine>(engine: &E) -> anyhow::Result<()> {
    engine.zadd_max("active", 10.0, "a:1").await?;
    engine.zadd_max("active", 20.0, "a:2").await?;
    engine.zadd_max("active", 30.0, "a:3").await?;

    assert_eq!(
        engine.zrangebyscore("active", 20.0).await?,
        vec!["a:3".to_owned()]
    );
    assert_eq!(
        engine.zrangebyscore("active", 0.0).await?,
        vec!["a:1".to_owned(), "a:2".to_owned(), "a:3".to_owned()]
    );

    assert_eq!(engine.zremrangebyscore("active", 20.0).await?, 2);
    assert_eq!(engine.zremrangebyscore("active", 20.0).await?, 0);

    assert!(engine.zrem("active", "a:3").await?);
    assert!(!engine.zrem("active", "a:3").await?);
    assert!(engine.zrange_with_scores("active").await?.is_empty());
    assert_eq!(engine.zremrangebyscore("unknown", 100.0).await?, 0);

    Ok(())
}
