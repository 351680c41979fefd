//! Property-Based Tests for Paginated List Reads
//!
//! Cached and uncached reads of the same request return the same page, the
//! large-page window arithmetic picks the right slice of the full result,
//! and every write empties the table's invalidation registry.

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tessera_core::{
    Document, FieldDef, KeyStrategy, ListRequest, ModelConfig, PrimaryKey, Schema, SortKey,
    TesseraResult,
};
use tessera_model::{
    list_key, registry_key_for, ModelDefinition, ReadOptions, Record, UpdateMode, WriteOptions,
};
use tessera_storage::{CacheClient, MemoryCache, StoreClient};
use tessera_test_utils::fixtures::{fast_config, memory_registry, post, post_definition};
use tessera_test_utils::generators::arb_list_request;
use tessera_test_utils::doc;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn ledger_definition() -> ModelDefinition {
    ModelDefinition::new(
        "ledger",
        Schema::new().field("views", FieldDef::integer()),
    )
    .with_primary_key("rowid")
    .with_key_strategy(KeyStrategy::Sequence)
}

/// Register `ledger` and seed `total` rows keyed 1..=total straight into the store.
async fn seeded_ledger(config: ModelConfig, total: i64) -> TesseraResult<(Record, Arc<MemoryCache>)> {
    let (registry, db, cache) = memory_registry(config);
    let ledger = registry.register(ledger_definition()).await?;
    let rows = db.open("master", "ledger");
    for n in 1..=total {
        rows.insert(doc(json!({"rowid": n, "views": n % 7}))).await?;
    }
    Ok((ledger, cache))
}

fn rowids(list: &[Document]) -> Vec<i64> {
    list.iter()
        .filter_map(|d| d.get("rowid").and_then(|v| v.as_i64()))
        .collect()
}

fn by_rowid() -> ListRequest {
    ListRequest::new(Document::new()).with_sort(SortKey::asc("rowid"))
}

async fn populate(records: &Record, request: &ListRequest) -> TesseraResult<()> {
    records
        .find_list_cached(request, ReadOptions::default())
        .await
        .map(|_| ())
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// WINDOW ARITHMETIC
// ============================================================================

#[tokio::test]
async fn test_second_window_first_page() -> TesseraResult<()> {
    let (ledger, _cache) = seeded_ledger(fast_config(), 4_500).await?;
    let request = by_rowid().with_large_page(2).with_page(1).with_limit(20);

    let uncached = ledger
        .find_list_no_cache(&request, ReadOptions::default())
        .await?;
    assert_eq!(uncached.count, 4_500);
    assert_eq!(rowids(&uncached.list), (2_001..=2_020).collect::<Vec<_>>());
    assert_eq!((uncached.page, uncached.limit, uncached.large_page), (1, 20, 2));

    let cached = ledger
        .find_list_cached(&request, ReadOptions::default())
        .await?;
    assert_eq!(cached, uncached);
    Ok(())
}

#[tokio::test]
async fn test_partial_last_window() -> TesseraResult<()> {
    let (ledger, _cache) = seeded_ledger(fast_config(), 4_500).await?;

    let page = ledger
        .find_list_cached(
            &by_rowid().with_large_page(3).with_page(13).with_limit(20),
            ReadOptions::default(),
        )
        .await?;
    assert_eq!(rowids(&page.list), (4_241..=4_260).collect::<Vec<_>>());

    // The third window only holds 500 ids.
    let past_end = ledger
        .find_list_cached(
            &by_rowid().with_large_page(3).with_page(26).with_limit(20),
            ReadOptions::default(),
        )
        .await?;
    assert!(past_end.list.is_empty());
    assert_eq!(past_end.count, 4_500);
    Ok(())
}

#[tokio::test]
async fn test_page_past_window_wraps() -> TesseraResult<()> {
    let (ledger, _cache) = seeded_ledger(fast_config(), 100).await?;

    let first = ledger
        .find_list_cached(&by_rowid().with_page(1).with_limit(20), ReadOptions::default())
        .await?;
    // 2000 / 20 = 100 pages per window; page 101 is page 1 again.
    let wrapped = ledger
        .find_list_cached(&by_rowid().with_page(101).with_limit(20), ReadOptions::default())
        .await?;
    assert_eq!(wrapped.page, 1);
    assert_eq!(wrapped.list, first.list);
    Ok(())
}

#[tokio::test]
async fn test_cached_order_is_preserved() -> TesseraResult<()> {
    let (ledger, _cache) = seeded_ledger(fast_config(), 50).await?;
    let request = ListRequest::new(Document::new())
        .with_sort(SortKey::desc("rowid"))
        .with_limit(5);

    for _ in 0..2 {
        let page = ledger
            .find_list_cached(&request, ReadOptions::default())
            .await?;
        assert_eq!(rowids(&page.list), vec![50, 49, 48, 47, 46]);
    }
    let stats = ledger.list_cache_stats();
    // The populating read re-checks the key once it is written.
    assert_eq!((stats.misses, stats.hits, stats.populates), (1, 2, 1));
    Ok(())
}

#[tokio::test]
async fn test_empty_result_is_not_cached() -> TesseraResult<()> {
    let (ledger, cache) = seeded_ledger(fast_config(), 10).await?;
    let request = ListRequest::new(doc(json!({"views": 99})));

    let page = ledger
        .find_list_cached(&request, ReadOptions::default())
        .await?;
    assert!(page.list.is_empty());
    assert_eq!(page.count, 0);
    assert!(!cache.exists_key(&list_key("master.ledger", &request)).await?);
    Ok(())
}

#[tokio::test]
async fn test_explicit_cache_key() -> TesseraResult<()> {
    let (ledger, cache) = seeded_ledger(fast_config(), 10).await?;
    let page = ledger
        .find_list(&by_rowid().with_limit(3), Some("ledger:front"), ReadOptions::default())
        .await?;
    assert_eq!(rowids(&page.list), vec![1, 2, 3]);
    assert_eq!(cache.list_len("ledger:front").await?, 10);
    assert_eq!(
        cache.set_members(&registry_key_for("master.ledger")).await?,
        vec!["ledger:front".to_string()]
    );
    Ok(())
}

// ============================================================================
// INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_every_write_flushes_list_keys() -> TesseraResult<()> {
    let (registry, _db, cache) = memory_registry(fast_config());
    let posts = registry.register(post_definition()).await?;
    posts.clone().create(post(1), WriteOptions::default()).await?;

    let request = ListRequest::new(Document::new());
    let key = list_key("master.posts", &request);
    let registry_key = registry_key_for("master.posts");

    populate(&posts, &request).await?;
    assert!(cache.exists_key(&key).await?);
    posts.clone().create(post(2), WriteOptions::default()).await?;
    assert!(!cache.exists_key(&key).await?);

    populate(&posts, &request).await?;
    posts
        .update(
            doc(json!({"rowid": 1})),
            doc(json!({"title": "changed"})),
            UpdateMode::Update,
            WriteOptions::default(),
        )
        .await?;
    assert!(!cache.exists_key(&key).await?);

    populate(&posts, &request).await?;
    posts
        .find_one_and_update(
            doc(json!({"rowid": 2})),
            doc(json!({"$inc": {"views": 5}})),
            WriteOptions::default(),
        )
        .await?;
    assert!(!cache.exists_key(&key).await?);

    populate(&posts, &request).await?;
    posts
        .remove(doc(json!({"rowid": 2})), WriteOptions::default())
        .await?;
    assert!(!cache.exists_key(&key).await?);

    populate(&posts, &request).await?;
    assert_eq!(posts.clear(WriteOptions::default()).await?, 1);
    assert!(!cache.exists_key(&key).await?);
    assert!(cache.set_members(&registry_key).await?.is_empty());
    assert_eq!(posts.list_cache_stats().invalidations, 5);
    Ok(())
}

#[tokio::test]
async fn test_failed_write_keeps_list_keys() -> TesseraResult<()> {
    let (registry, _db, cache) = memory_registry(fast_config());
    let posts = registry.register(post_definition()).await?;
    posts.clone().create(post(1), WriteOptions::default()).await?;

    let request = ListRequest::new(Document::new());
    posts
        .find_list_cached(&request, ReadOptions::default())
        .await?;

    let missed = posts
        .update(
            doc(json!({"rowid": 42})),
            doc(json!({"title": "ghost"})),
            UpdateMode::Update,
            WriteOptions::default(),
        )
        .await;
    assert!(missed.is_err());
    assert!(cache.exists_key(&list_key("master.posts", &request)).await?);

    let found = posts
        .find_one(PrimaryKey::Int(1), ReadOptions::default())
        .await?;
    assert!(found.is_some());
    Ok(())
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Serving a page from the cached id list gives the same page as asking
    /// the store directly.
    #[test]
    fn prop_cached_and_uncached_pages_agree(request in arb_list_request()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let config = fast_config().with_large_limit(25).with_default_page_size(10);
            let (ledger, _cache) = seeded_ledger(config, 60)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let cached = ledger
                .find_list_cached(&request, ReadOptions::default())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let again = ledger
                .find_list_cached(&request, ReadOptions::default())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let direct = ledger
                .find_list_no_cache(&request, ReadOptions::default())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(&cached, &direct);
            prop_assert_eq!(&again, &direct);
            prop_assert!(direct.list.len() as u64 <= direct.limit);
            prop_assert!(direct.limit <= 25);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
