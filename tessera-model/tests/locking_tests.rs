//! Table-lock tests for the record layer
//!
//! Locked writers never overlap inside the store, deferred reads wait for
//! the lock, and cache-service failures around the lock behave as documented:
//! acquisition failures surface, release and invalidation failures do not.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{Document, ListRequest, ModelConfig, ModelContext, PrimaryKey, TesseraResult};
use tessera_model::{
    list_key, lock_name_for, registry_key_for, LockCoordinator, ModelRegistry, ReadOptions,
    Record, UpdateMode, WriteOptions,
};
use tessera_storage::{CacheClient, MemoryCache, MemoryDatabase, StoreClient};
use tessera_test_utils::assertions::*;
use tessera_test_utils::fixtures::{fast_config, memory_registry, post, post_definition};
use tessera_test_utils::{doc, init_tracing, FlakyCache, RecordingProvider};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

async fn recorded_posts(delay: Duration) -> TesseraResult<(Record, RecordingProvider)> {
    let provider = RecordingProvider::new(delay);
    let registry = ModelRegistry::new(
        Arc::new(provider.clone()),
        Arc::new(MemoryCache::new()),
        ModelContext::new(fast_config()),
    )?;
    let posts = registry.register(post_definition()).await?;
    Ok((posts, provider))
}

async fn flaky_posts(config: ModelConfig) -> TesseraResult<(Record, FlakyCache, MemoryDatabase)> {
    let cache = FlakyCache::new();
    let db = MemoryDatabase::new();
    let registry = ModelRegistry::new(
        Arc::new(db.clone()),
        Arc::new(cache.clone()),
        ModelContext::new(config),
    )?;
    let posts = registry.register(post_definition()).await?;
    Ok((posts, cache, db))
}

// ============================================================================
// MUTUAL EXCLUSION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_locked_creates_do_not_overlap() -> TesseraResult<()> {
    let (posts, provider) = recorded_posts(Duration::from_millis(10)).await?;
    let (mut a, mut b, mut c) = (posts.clone(), posts.clone(), posts.clone());

    let (ra, rb, rc) = tokio::join!(
        a.create(post(1), WriteOptions::default()),
        b.create(post(2), WriteOptions::default()),
        c.create(post(3), WriteOptions::default()),
    );
    let mut keys = vec![ra?, rb?, rc?];
    keys.sort();
    assert_eq!(keys, vec![PrimaryKey::Int(1), PrimaryKey::Int(2), PrimaryKey::Int(3)]);

    assert_eq!(provider.events().len(), 6);
    assert!(provider.mutations_serialized());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unlocked_creates_can_overlap() -> TesseraResult<()> {
    let (posts, provider) = recorded_posts(Duration::from_millis(10)).await?;
    let (mut a, mut b) = (posts.clone(), posts.clone());

    let (ra, rb) = tokio::join!(
        a.create(post(1), WriteOptions::unlocked()),
        b.create(post(2), WriteOptions::unlocked()),
    );
    ra?;
    rb?;
    assert!(!provider.mutations_serialized());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_writes_are_serialized() -> TesseraResult<()> {
    init_tracing();
    let (posts, provider) = recorded_posts(Duration::from_millis(2)).await?;
    for n in 1..=4 {
        posts.clone().create(post(n), WriteOptions::default()).await?;
    }

    let mut handles = Vec::new();
    for n in 1..=4i64 {
        let writer = posts.clone();
        handles.push(tokio::spawn(async move {
            writer
                .update(
                    doc(json!({"rowid": n})),
                    doc(json!({"$inc": {"views": 10}})),
                    UpdateMode::Update,
                    WriteOptions::default(),
                )
                .await
                .map(|_| ())
        }));
        let mut creator = posts.clone();
        handles.push(tokio::spawn(async move {
            creator
                .create(post(n + 100), WriteOptions::default())
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.expect("writer task panicked")?;
    }

    assert_eq!(provider.events().len(), 2 * 12);
    assert!(provider.mutations_serialized());
    assert_eq!(posts.count(&doc(json!({"views": {"$gte": 10}}))).await?, 8);
    Ok(())
}

// ============================================================================
// DEFERRED READS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_deferred_read_waits_for_lock() -> TesseraResult<()> {
    let (registry, _db, cache) = memory_registry(fast_config());
    let posts = registry.register(post_definition()).await?;
    posts.clone().create(post(1), WriteOptions::default()).await?;

    let coordinator = LockCoordinator::new(cache.clone(), &fast_config());
    let lease = coordinator
        .acquire(&lock_name_for("master.posts"))
        .await?
        .expect("lock is free");

    // A plain read does not wait.
    let before = posts
        .find_one(PrimaryKey::Int(1), ReadOptions::default())
        .await?
        .expect("post exists");
    assert_eq!(before["title"], json!("post 1"));

    let reader = posts.clone();
    let deferred = tokio::spawn(async move {
        reader
            .find_one(PrimaryKey::Int(1), ReadOptions::deferred())
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!deferred.is_finished());

    posts
        .update(
            doc(json!({"rowid": 1})),
            doc(json!({"title": "written under lock"})),
            UpdateMode::Update,
            WriteOptions::unlocked(),
        )
        .await?;
    coordinator.release(lease).await;

    let after = deferred
        .await
        .expect("reader task panicked")?
        .expect("post exists");
    assert_eq!(after["title"], json!("written under lock"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deferred_list_read_times_out_with_max_wait() -> TesseraResult<()> {
    let config = fast_config().with_max_lock_wait(Some(Duration::from_millis(100)));
    let (registry, _db, cache) = memory_registry(config.clone());
    let posts = registry.register(post_definition()).await?;

    let coordinator = LockCoordinator::new(cache.clone(), &config);
    let _lease = coordinator.acquire(&lock_name_for("master.posts")).await?;

    assert_lock_unavailable(
        &posts
            .find_list_cached(&ListRequest::new(Document::new()), ReadOptions::deferred())
            .await,
    );
    assert_lock_unavailable(
        &posts
            .clone()
            .create(post(1), WriteOptions::default())
            .await,
    );
    assert_eq!(posts.count(&Document::new()).await?, 0);
    Ok(())
}

// ============================================================================
// CACHE FAILURES
// ============================================================================

#[tokio::test]
async fn test_acquire_failure_aborts_write() -> TesseraResult<()> {
    let (posts, cache, db) = flaky_posts(fast_config()).await?;
    cache.fail_lock(true);

    assert_lock_unavailable(&posts.clone().create(post(1), WriteOptions::default()).await);
    assert_lock_unavailable(
        &posts
            .remove(doc(json!({"rowid": 1})), WriteOptions::default())
            .await,
    );
    assert_eq!(db.open("master", "posts").count(&Document::new()).await?, 0);

    // Unlocked writes never touch the lock.
    posts.clone().create(post(1), WriteOptions::unlocked()).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_failure_is_swallowed_until_ttl() -> TesseraResult<()> {
    let (posts, cache, _db) = flaky_posts(fast_config()).await?;
    cache.fail_unlock(true);

    posts.clone().create(post(1), WriteOptions::default()).await?;
    assert!(cache.inner().has_lock(&lock_name_for("master.posts")).await?);

    // The stale lock blocks the next writer until its ttl runs out.
    cache.fail_unlock(false);
    let started = tokio::time::Instant::now();
    posts.clone().create(post(2), WriteOptions::default()).await?;
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(!cache.inner().has_lock(&lock_name_for("master.posts")).await?);
    Ok(())
}

#[tokio::test]
async fn test_invalidation_failure_does_not_fail_write() -> TesseraResult<()> {
    let (posts, cache, _db) = flaky_posts(fast_config()).await?;
    posts.clone().create(post(1), WriteOptions::default()).await?;

    let request = ListRequest::new(Document::new());
    posts
        .find_list_cached(&request, ReadOptions::default())
        .await?;

    cache.fail_delete(true);
    posts.clone().create(post(2), WriteOptions::default()).await?;
    assert!(cache.exists_key(&list_key("master.posts", &request)).await?);

    cache.fail_delete(false);
    cache.fail_set_members(true);
    posts
        .remove(doc(json!({"rowid": 2})), WriteOptions::default())
        .await?;

    cache.fail_set_members(false);
    posts.clone().create(post(3), WriteOptions::default()).await?;
    assert!(!cache.exists_key(&list_key("master.posts", &request)).await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_registry_failure_leaves_no_orphan_list() -> TesseraResult<()> {
    let (posts, cache, _db) = flaky_posts(fast_config()).await?;
    cache.fail_set_add(true);
    posts.clone().create(post(1), WriteOptions::default()).await?;

    let request = ListRequest::new(Document::new());
    let key = list_key("master.posts", &request);
    let first = posts
        .find_list_cached(&request, ReadOptions::default())
        .await?;
    assert_eq!((first.count, first.list.len()), (1, 1));
    assert!(!cache.exists_key(&key).await?);

    // No list the writes cannot reach is left behind to serve stale pages.
    posts.clone().create(post(2), WriteOptions::default()).await?;
    tokio::time::advance(Duration::from_secs(3600)).await;
    let second = posts
        .find_list_cached(&request, ReadOptions::default())
        .await?;
    assert_eq!((second.count, second.list.len()), (2, 2));
    assert!(!cache.exists_key(&key).await?);

    cache.fail_set_add(false);
    posts
        .find_list_cached(&request, ReadOptions::default())
        .await?;
    assert!(cache.exists_key(&key).await?);
    assert_eq!(
        cache.set_members(&registry_key_for("master.posts")).await?,
        vec![key]
    );
    Ok(())
}

#[tokio::test]
async fn test_lock_check_failure_skips_list_caching() -> TesseraResult<()> {
    let (posts, cache, _db) = flaky_posts(fast_config()).await?;
    posts.clone().create(post(1), WriteOptions::default()).await?;

    cache.fail_lock(true);
    let request = ListRequest::new(Document::new());
    let page = posts
        .find_list_cached(&request, ReadOptions::default())
        .await?;
    assert_eq!(page.list.len(), 1);
    assert!(!cache.exists_key(&list_key("master.posts", &request)).await?);
    Ok(())
}
