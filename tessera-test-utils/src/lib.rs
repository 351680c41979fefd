//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Instrumented and fault-injecting collaborators
//! - Proptest generators for documents, requests and configuration
//! - Test fixtures for common scenarios
//! - Custom assertions for Tessera error variants

pub use tessera_storage::{MemoryCache, MemoryDatabase};

pub use tessera_core::{
    CacheError, Document, FieldDef, IndexKind, KeyStrategy, ListRequest, ModelConfig,
    ModelContext, PrimaryKey, RecordError, Schema, SortKey, TesseraError, TesseraResult,
};
pub use tessera_model::{ModelDefinition, ModelRegistry, Record};

use async_trait::async_trait;
use serde_json::Value;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tessera_core::{IndexSpec, LockToken, QueryDescriptor};
use tessera_storage::{
    CacheClient, InsertResult, RemoveResult, StoreClient, StoreProvider, UpdateResult,
};

/// Install a `tracing` subscriber for tests. Honours `RUST_LOG`; safe to call repeatedly.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Build a document from a `json!` object literal.
#[track_caller]
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

// ============================================================================
// INSTRUMENTED STORE
// ============================================================================

/// Boundary of a store mutation observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Enter(&'static str),
    Exit(&'static str),
}

/// Store wrapper that logs enter/exit of every mutation and can stretch
/// each mutation with an artificial delay, so overlapping writers show up
/// as interleaved events.
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<dyn StoreClient>,
    delay: Duration,
    events: Arc<Mutex<Vec<StoreEvent>>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn StoreClient>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push(&self, event: StoreEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    async fn enter(&self, op: &'static str) {
        self.push(StoreEvent::Enter(op));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl StoreClient for RecordingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert(&self, doc: Document) -> TesseraResult<InsertResult> {
        self.enter("insert").await;
        let result = self.inner.insert(doc).await;
        self.push(StoreEvent::Exit("insert"));
        result
    }

    async fn update(&self, filter: &Document, modifier: &Document) -> TesseraResult<UpdateResult> {
        self.enter("update").await;
        let result = self.inner.update(filter, modifier).await;
        self.push(StoreEvent::Exit("update"));
        result
    }

    async fn find_one_and_update(
        &self,
        filter: &Document,
        modifier: &Document,
    ) -> TesseraResult<Option<Document>> {
        self.enter("find_one_and_update").await;
        let result = self.inner.find_one_and_update(filter, modifier).await;
        self.push(StoreEvent::Exit("find_one_and_update"));
        result
    }

    async fn remove(&self, filter: &Document) -> TesseraResult<RemoveResult> {
        self.enter("remove").await;
        let result = self.inner.remove(filter).await;
        self.push(StoreEvent::Exit("remove"));
        result
    }

    async fn count(&self, filter: &Document) -> TesseraResult<u64> {
        self.inner.count(filter).await
    }

    async fn find(&self, query: &QueryDescriptor) -> TesseraResult<Vec<Document>> {
        self.inner.find(query).await
    }

    async fn aggregate(&self, stages: &[Value]) -> TesseraResult<Vec<Document>> {
        self.inner.aggregate(stages).await
    }

    async fn create_index(&self, spec: &IndexSpec) -> TesseraResult<String> {
        self.inner.create_index(spec).await
    }

    async fn drop_index(&self, name: &str) -> TesseraResult<()> {
        self.inner.drop_index(name).await
    }

    async fn clear(&self) -> TesseraResult<u64> {
        self.enter("clear").await;
        let result = self.inner.clear().await;
        self.push(StoreEvent::Exit("clear"));
        result
    }
}

/// Provider handing out [`RecordingStore`]s over one [`MemoryDatabase`].
/// All collections share one event log.
#[derive(Clone)]
pub struct RecordingProvider {
    db: MemoryDatabase,
    delay: Duration,
    events: Arc<Mutex<Vec<StoreEvent>>>,
}

impl RecordingProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            db: MemoryDatabase::new(),
            delay,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// True when every mutation exited before the next one entered.
    pub fn mutations_serialized(&self) -> bool {
        let events = self.events();
        events.chunks(2).all(|pair| {
            matches!(pair, [StoreEvent::Enter(a), StoreEvent::Exit(b)] if a == b)
        })
    }
}

impl StoreProvider for RecordingProvider {
    fn collection(&self, database: &str, name: &str) -> Arc<dyn StoreClient> {
        Arc::new(RecordingStore {
            inner: Arc::new(self.db.open(database, name)),
            delay: self.delay,
            events: Arc::clone(&self.events),
        })
    }
}

// ============================================================================
// FAULT-INJECTING CACHE
// ============================================================================

/// Cache wrapper whose lock, unlock, delete and registry calls can be
/// switched to fail with `CacheError::Unavailable`.
#[derive(Debug, Clone, Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    fail_lock: Arc<AtomicBool>,
    fail_unlock: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
    fail_set_members: Arc<AtomicBool>,
    fail_set_add: Arc<AtomicBool>,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryCache {
        &self.inner
    }

    pub fn fail_lock(&self, on: bool) {
        self.fail_lock.store(on, Ordering::SeqCst);
    }

    pub fn fail_unlock(&self, on: bool) {
        self.fail_unlock.store(on, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, on: bool) {
        self.fail_delete.store(on, Ordering::SeqCst);
    }

    pub fn fail_set_members(&self, on: bool) {
        self.fail_set_members.store(on, Ordering::SeqCst);
    }

    pub fn fail_set_add(&self, on: bool) {
        self.fail_set_add.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> TesseraResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                reason: format!("injected {what} failure"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheClient for FlakyCache {
    async fn lock(&self, name: &str, ttl: Duration) -> TesseraResult<Option<LockToken>> {
        Self::check(&self.fail_lock, "lock")?;
        self.inner.lock(name, ttl).await
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> TesseraResult<bool> {
        Self::check(&self.fail_unlock, "unlock")?;
        self.inner.unlock(name, token).await
    }

    async fn has_lock(&self, name: &str) -> TesseraResult<bool> {
        Self::check(&self.fail_lock, "has_lock")?;
        self.inner.has_lock(name).await
    }

    async fn exists_key(&self, key: &str) -> TesseraResult<bool> {
        self.inner.exists_key(key).await
    }

    async fn list_push(&self, key: &str, values: &[String]) -> TesseraResult<u64> {
        self.inner.list_push(key, values).await
    }

    async fn list_slice(&self, key: &str, range: Range<usize>) -> TesseraResult<Vec<String>> {
        self.inner.list_slice(key, range).await
    }

    async fn list_len(&self, key: &str) -> TesseraResult<u64> {
        self.inner.list_len(key).await
    }

    async fn set_key_timeout(&self, key: &str, ttl: Duration) -> TesseraResult<bool> {
        self.inner.set_key_timeout(key, ttl).await
    }

    async fn set_add(&self, set: &str, member: &str) -> TesseraResult<bool> {
        Self::check(&self.fail_set_add, "set_add")?;
        self.inner.set_add(set, member).await
    }

    async fn set_remove(&self, set: &str, member: &str) -> TesseraResult<bool> {
        self.inner.set_remove(set, member).await
    }

    async fn set_members(&self, set: &str) -> TesseraResult<Vec<String>> {
        Self::check(&self.fail_set_members, "set_members")?;
        self.inner.set_members(set).await
    }

    async fn delete_key(&self, key: &str) -> TesseraResult<bool> {
        Self::check(&self.fail_delete, "delete_key")?;
        self.inner.delete_key(key).await
    }

    async fn next_sequence(&self, key: &str) -> TesseraResult<i64> {
        self.inner.next_sequence(key).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating test data.

    use super::*;
    use proptest::prelude::*;

    /// Generate a post title.
    pub fn arb_title() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ]{1,40}"
    }

    /// Generate a scalar JSON value.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[a-z0-9]{0,12}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    /// Generate a flat document of scalar values.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        prop::collection::btree_map("[a-z]{1,8}", arb_scalar(), 0..6)
            .prop_map(|fields| fields.into_iter().collect())
    }

    /// Generate a primary key of either shape.
    pub fn arb_primary_key() -> impl Strategy<Value = PrimaryKey> {
        prop_oneof![
            (1i64..i64::MAX).prop_map(PrimaryKey::Int),
            "[a-f0-9]{32}".prop_map(PrimaryKey::Str),
        ]
    }

    /// Generate a list request over the `views` field.
    pub fn arb_list_request() -> impl Strategy<Value = ListRequest> {
        (
            prop::option::of(0i64..100),
            any::<bool>(),
            prop::option::of(0u64..20),
            prop::option::of(0u64..50),
            prop::option::of(0u64..4),
        )
            .prop_map(|(min_views, descending, page, limit, large_page)| {
                let mut filter = Document::new();
                if let Some(min) = min_views {
                    filter.insert("views".into(), serde_json::json!({"$gte": min}));
                }
                ListRequest {
                    filter,
                    sort: vec![if descending {
                        SortKey::desc("views")
                    } else {
                        SortKey::asc("views")
                    }],
                    page,
                    limit,
                    large_page,
                }
            })
    }

    /// Generate a valid model configuration with short timings.
    pub fn arb_valid_config() -> impl Strategy<Value = ModelConfig> {
        (1u64..500, 1u64..50, 1u64..100).prop_map(|(large_limit, page_size, ttl_ms)| {
            ModelConfig::default()
                .with_large_limit(large_limit)
                .with_default_page_size(page_size.min(large_limit))
                .with_lock_ttl(Duration::from_millis(100 + ttl_ms))
                .with_poll_interval(Duration::from_millis(5))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::json;

    /// Posts: required title, defaulted views, unique slug, author relation.
    pub fn post_schema() -> Schema {
        Schema::new()
            .field("title", FieldDef::string().required())
            .field("views", FieldDef::integer().default_value(json!(0)))
            .field("slug", FieldDef::string().unique())
            .field("body", FieldDef::string().indexed(IndexKind::Text))
            .field(
                "author_id",
                FieldDef::integer().relation("rowid", "author", "users"),
            )
            .field("meta", FieldDef::object())
            .field("preview", FieldDef::string().virtual_field())
    }

    pub fn user_schema() -> Schema {
        Schema::new()
            .field("name", FieldDef::string().required())
            .field("email", FieldDef::string().unique())
    }

    /// `master.posts` keyed by an integer `rowid` sequence.
    pub fn post_definition() -> ModelDefinition {
        ModelDefinition::new("posts", post_schema())
            .with_primary_key("rowid")
            .with_key_strategy(KeyStrategy::Sequence)
    }

    /// `master.users` keyed by an integer `rowid` sequence.
    pub fn user_definition() -> ModelDefinition {
        ModelDefinition::new("users", user_schema())
            .with_primary_key("rowid")
            .with_key_strategy(KeyStrategy::Sequence)
    }

    /// Configuration with short lock timings for tests.
    pub fn fast_config() -> ModelConfig {
        ModelConfig::default()
            .with_lock_ttl(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(5))
    }

    /// Registry over fresh in-memory collaborators.
    pub fn memory_registry(config: ModelConfig) -> (ModelRegistry, MemoryDatabase, Arc<MemoryCache>) {
        let db = MemoryDatabase::new();
        let cache = Arc::new(MemoryCache::new());
        let registry = ModelRegistry::new(
            Arc::new(db.clone()),
            cache.clone(),
            ModelContext::new(config),
        )
        .unwrap_or_else(|e| panic!("fixture config rejected: {e}"));
        (registry, db, cache)
    }

    /// Post payload with a unique slug.
    pub fn post(n: i64) -> Document {
        doc(json!({
            "title": format!("post {n}"),
            "slug": format!("post-{n}"),
            "views": n,
        }))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Tessera error variants.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_no_matching_record<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(e) if e.is_no_matching_record() => {}
            other => panic!("Expected NoMatchingRecord, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_empty_payload<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Record(RecordError::EmptyPayload { .. })) => {}
            other => panic!("Expected EmptyPayload, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(e) if e.is_validation() => {}
            other => panic!("Expected validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_lock_unavailable<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(e) if e.is_lock_unavailable() => {}
            other => panic!("Expected LockUnavailable, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
