//! Record orchestrator.
//!
//! A [`Record`] is a cheap handle on a registered model plus its own scratch
//! [`FieldMap`]. Writes run `validate → lock → execute → invalidate → unlock`;
//! the lock is released on every exit path once acquired. Reads can defer
//! while the table lock is held and consult the result-list cache.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{
    by_key, keys_in, new_object_id, Acquired, Document, FieldMap, IndexSpec, KeyStrategy,
    ListRequest, LockLease, ModelContext, PrimaryKey, Query, QueryDescriptor, RecordError,
    Relation, Schema, TesseraResult, UpdatePayload,
};
use tessera_storage::{CacheClient, StoreClient};

use crate::coordinator::{lock_name_for, LockCoordinator};
use crate::list_cache::{ListCacheStats, PageWindow, ResultListCache};

// ============================================================================
// OPTIONS AND OUTCOMES
// ============================================================================

/// Per-call switches for mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Hold the table lock around the store mutation.
    pub lock: bool,
    /// Run schema validation before any I/O.
    pub validate: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            lock: true,
            validate: true,
        }
    }
}

impl WriteOptions {
    pub fn unlocked() -> Self {
        Self {
            lock: false,
            ..Self::default()
        }
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}

/// Per-call switches for reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Wait for the table lock to be free before reading.
    pub defer: bool,
}

impl ReadOptions {
    pub fn deferred() -> Self {
        Self { defer: true }
    }
}

/// Which store call an update goes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateMode {
    #[default]
    Update,
    FindOneAndUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateOutcome {
    Acknowledged { matched: u64, modified: u64 },
    /// Post-update image from `find_one_and_update`.
    Document(Document),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaveOutcome {
    Created(PrimaryKey),
    Updated(UpdateOutcome),
}

/// Acknowledgement of a successful remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAck {
    pub deleted: u64,
    /// Keys of the records that matched the filter.
    pub keys: Vec<PrimaryKey>,
}

/// One page of a list read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    /// Total number of records matching the filter.
    pub count: u64,
    pub list: Vec<Document>,
    pub page: u64,
    pub limit: u64,
    #[serde(rename = "largepage")]
    pub large_page: u64,
}

/// How `find_one` picks its record.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Key(PrimaryKey),
    Filter(Document),
    Query(Query),
}

impl From<PrimaryKey> for Selector {
    fn from(key: PrimaryKey) -> Self {
        Selector::Key(key)
    }
}

impl From<Document> for Selector {
    fn from(filter: Document) -> Self {
        Selector::Filter(filter)
    }
}

impl From<Query> for Selector {
    fn from(query: Query) -> Self {
        Selector::Query(query)
    }
}

/// Result of [`Record::exec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecResult {
    Documents(Vec<Document>),
    Document(Option<Document>),
    Count(u64),
}

// ============================================================================
// SHARED MODEL STATE
// ============================================================================

/// State shared by every handle of one registered model.
pub(crate) struct Model {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) schema: Arc<Schema>,
    pub(crate) primary_key: String,
    pub(crate) key_strategy: KeyStrategy,
    pub(crate) select: Document,
    pub(crate) relations: Vec<Relation>,
    pub(crate) store: Arc<dyn StoreClient>,
    pub(crate) cache: Arc<dyn CacheClient>,
    pub(crate) locks: LockCoordinator,
    pub(crate) lists: ResultListCache,
    pub(crate) context: ModelContext,
    lock_name: String,
    sequence_key: String,
}

pub(crate) struct ModelParts {
    pub name: String,
    pub table: String,
    pub schema: Schema,
    pub primary_key: String,
    pub key_strategy: KeyStrategy,
    pub select: Document,
    pub store: Arc<dyn StoreClient>,
    pub cache: Arc<dyn CacheClient>,
    pub context: ModelContext,
}

impl Model {
    pub(crate) fn new(parts: ModelParts) -> Self {
        let relations = parts.schema.relations();
        // Cache-side names are scoped by `db.table` so equal table names never share state.
        let locks = LockCoordinator::new(Arc::clone(&parts.cache), &parts.context.config);
        let lists = ResultListCache::new(Arc::clone(&parts.cache), &parts.name, &parts.context.config);
        Self {
            lock_name: lock_name_for(&parts.name),
            sequence_key: format!("{}:rowid", parts.name),
            name: parts.name,
            table: parts.table,
            schema: Arc::new(parts.schema),
            primary_key: parts.primary_key,
            key_strategy: parts.key_strategy,
            select: parts.select,
            relations,
            store: parts.store,
            cache: parts.cache,
            locks,
            lists,
            context: parts.context,
        }
    }

    /// Create every index the schema declares.
    pub(crate) async fn init_indexes(&self) -> TesseraResult<Vec<String>> {
        let mut created = Vec::new();
        for spec in self.schema.indexes(&self.primary_key) {
            created.push(self.store.create_index(&spec).await?);
        }
        if !created.is_empty() {
            tracing::info!(model = %self.name, indexes = ?created, "indexes initialised");
        }
        Ok(created)
    }
}

fn is_inclusion(select: &Document) -> bool {
    select.values().any(|flag| match flag {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}

// ============================================================================
// RECORD
// ============================================================================

/// Handle on one model with private scratch state.
#[derive(Clone)]
pub struct Record {
    model: Arc<Model>,
    fields: FieldMap,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model.name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Record {
    pub(crate) fn new(model: Arc<Model>) -> Self {
        let fields = FieldMap::new(Arc::clone(&model.schema), model.primary_key.clone());
        Self { model, fields }
    }

    /// Registered name, `db.table`.
    pub fn name(&self) -> &str {
        &self.model.name
    }

    pub fn table(&self) -> &str {
        &self.model.table
    }

    pub fn primary_key_field(&self) -> &str {
        &self.model.primary_key
    }

    pub fn list_cache_stats(&self) -> ListCacheStats {
        self.model.lists.stats()
    }

    // ------------------------------------------------------------------
    // Field access
    // ------------------------------------------------------------------

    pub fn set_data(&mut self, data: &Document) -> TesseraResult<()> {
        Ok(self.fields.set_data(data)?)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> TesseraResult<()> {
        Ok(self.fields.set(name, value)?)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_data(&self, include_virtual: bool) -> Document {
        self.fields.get_data(include_virtual)
    }

    pub fn reset_data(&mut self) {
        self.fields.reset_data();
    }

    /// True until the record carries a primary key.
    pub fn is_new(&self) -> bool {
        self.fields.primary_key().is_none()
    }

    pub fn primary_key(&self) -> Option<PrimaryKey> {
        self.fields.primary_key()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert the record's data merged with `data`; returns the new key.
    pub async fn create(&mut self, data: Document, opts: WriteOptions) -> TesseraResult<PrimaryKey> {
        if data.is_empty() && !self.fields.has_data() {
            return Err(empty_payload("create"));
        }
        self.fields.set_data(&data)?;
        if opts.validate {
            self.fields.validate()?;
        }

        let lease = self.acquire_for(opts).await?;
        let result = self.insert_locked().await;
        self.release(lease).await;

        let key = result?;
        self.fields.set_primary_key(&key);
        Ok(key)
    }

    async fn insert_locked(&self) -> TesseraResult<PrimaryKey> {
        let key = match self.fields.primary_key() {
            Some(key) => key,
            None => self.next_key().await?,
        };
        let mut doc = self.fields.get_data(false);
        doc.insert(self.model.primary_key.clone(), key.to_value());
        self.log_write("insert", &doc);

        let ack = self.model.store.insert(doc).await?;
        tracing::debug!(table = %self.model.table, key = %key, inserted_id = %ack.inserted_id, "record created");
        self.model.lists.invalidate_all().await;
        Ok(key)
    }

    async fn next_key(&self) -> TesseraResult<PrimaryKey> {
        match self.model.key_strategy {
            KeyStrategy::Sequence => Ok(PrimaryKey::Int(
                self.model.cache.next_sequence(&self.model.sequence_key).await?,
            )),
            KeyStrategy::Generated => Ok(PrimaryKey::Str(new_object_id())),
        }
    }

    /// Update every record matching `filter`, or the first one in
    /// [`UpdateMode::FindOneAndUpdate`].
    ///
    /// `values` is either a plain field map (written through `$set`) or a
    /// modifier document. The primary key is never written.
    pub async fn update(
        &self,
        filter: Document,
        values: Document,
        mode: UpdateMode,
        opts: WriteOptions,
    ) -> TesseraResult<UpdateOutcome> {
        if values.is_empty() {
            return Err(empty_payload("update"));
        }
        let mut payload = UpdatePayload::classify(values)?;
        payload.strip_primary_key(&self.model.primary_key);
        if payload.is_empty() {
            return Err(empty_payload("update"));
        }
        if opts.validate {
            self.model
                .schema
                .validate_partial(&payload.assigned_fields(), &self.model.primary_key)?;
        }
        let modifier = payload.into_modifier();

        let lease = self.acquire_for(opts).await?;
        let result = self.update_locked(&filter, &modifier, mode).await;
        self.release(lease).await;
        result
    }

    async fn update_locked(
        &self,
        filter: &Document,
        modifier: &Document,
        mode: UpdateMode,
    ) -> TesseraResult<UpdateOutcome> {
        self.log_write("update", &json_pair(filter, modifier));
        let outcome = match mode {
            UpdateMode::Update => {
                let ack = self.model.store.update(filter, modifier).await?;
                if ack.matched == 0 {
                    return Err(self.no_match());
                }
                UpdateOutcome::Acknowledged {
                    matched: ack.matched,
                    modified: ack.modified,
                }
            }
            UpdateMode::FindOneAndUpdate => {
                match self.model.store.find_one_and_update(filter, modifier).await? {
                    Some(doc) => UpdateOutcome::Document(doc),
                    None => return Err(self.no_match()),
                }
            }
        };
        self.model.lists.invalidate_all().await;
        Ok(outcome)
    }

    /// Update the first match and return its post-update document.
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        values: Document,
        opts: WriteOptions,
    ) -> TesseraResult<Document> {
        match self
            .update(filter, values, UpdateMode::FindOneAndUpdate, opts)
            .await?
        {
            UpdateOutcome::Document(doc) => Ok(doc),
            UpdateOutcome::Acknowledged { .. } => Err(self.no_match()),
        }
    }

    /// Create a new record, or update the existing one by its key.
    pub async fn save(&mut self, opts: WriteOptions) -> TesseraResult<SaveOutcome> {
        if !self.fields.has_data() {
            return Err(empty_payload("save"));
        }
        let Some(key) = self.fields.primary_key() else {
            return Ok(SaveOutcome::Created(
                self.create(Document::new(), opts).await?,
            ));
        };
        if opts.validate {
            self.fields.validate()?;
        }
        let mut data = self.fields.get_data(false);
        data.remove(&self.model.primary_key);
        let filter = by_key(&self.model.primary_key, &key);
        let outcome = self
            .update(filter, data, UpdateMode::Update, opts)
            .await?;
        Ok(SaveOutcome::Updated(outcome))
    }

    /// Delete every record matching `filter`.
    pub async fn remove(&self, filter: Document, opts: WriteOptions) -> TesseraResult<RemoveAck> {
        if filter.is_empty() {
            return Err(empty_payload("remove"));
        }
        let lease = self.acquire_for(opts).await?;
        let result = self.remove_locked(&filter).await;
        self.release(lease).await;
        result
    }

    async fn remove_locked(&self, filter: &Document) -> TesseraResult<RemoveAck> {
        let mut discover = QueryDescriptor::filtered(filter.clone());
        discover.select = self.key_projection();
        self.log_query("discover", &discover);
        let keys = self.keys_of(&self.model.store.find(&discover).await?);

        self.log_write("remove", filter);
        let ack = self.model.store.remove(filter).await?;
        if ack.deleted == 0 {
            return Err(self.no_match());
        }
        self.model.lists.invalidate_all().await;
        tracing::debug!(table = %self.model.table, deleted = ack.deleted, "records removed");
        Ok(RemoveAck {
            deleted: ack.deleted,
            keys,
        })
    }

    /// Delete every record of the table.
    pub async fn clear(&self, opts: WriteOptions) -> TesseraResult<u64> {
        let lease = self.acquire_for(opts).await?;
        let result = self.clear_locked().await;
        self.release(lease).await;
        result
    }

    async fn clear_locked(&self) -> TesseraResult<u64> {
        let cleared = self.model.store.clear().await?;
        self.model.lists.invalidate_all().await;
        tracing::info!(table = %self.model.table, cleared, "table cleared");
        Ok(cleared)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// First record matching `selector`, with the model's projection and relations.
    pub async fn find_one(
        &self,
        selector: impl Into<Selector>,
        opts: ReadOptions,
    ) -> TesseraResult<Option<Document>> {
        self.defer_if_locked(opts).await?;
        let query = match selector.into() {
            Selector::Key(key) => Query::from(by_key(&self.model.primary_key, &key)),
            Selector::Filter(filter) => Query::from(filter),
            Selector::Query(query) => query,
        };
        let descriptor = self.read_descriptor(query);
        self.log_query("findOne", &descriptor);
        self.model.store.find_one(&descriptor).await
    }

    /// Paginated read. With `cache_key` the id list is served from (and
    /// stored in) the result-list cache; without it the store is asked directly.
    pub async fn find_list(
        &self,
        request: &ListRequest,
        cache_key: Option<&str>,
        opts: ReadOptions,
    ) -> TesseraResult<ListPage> {
        self.defer_if_locked(opts).await?;
        let window = PageWindow::resolve(request, &self.model.context.config);
        let list = match cache_key {
            Some(key) => self.cached_page(request, key, &window).await?,
            None => self.uncached_page(request, &window).await?,
        };
        let count = self.model.store.count(&request.filter).await?;
        Ok(ListPage {
            count,
            list,
            page: window.page,
            limit: window.limit,
            large_page: window.large_page,
        })
    }

    /// Cached paginated read keyed by the request's own fingerprint.
    pub async fn find_list_cached(
        &self,
        request: &ListRequest,
        opts: ReadOptions,
    ) -> TesseraResult<ListPage> {
        let key = self.model.lists.key_for(request);
        self.find_list(request, Some(&key), opts).await
    }

    pub async fn find_list_no_cache(
        &self,
        request: &ListRequest,
        opts: ReadOptions,
    ) -> TesseraResult<ListPage> {
        self.find_list(request, None, opts).await
    }

    /// Serve a page from the cached id list, discovering and caching the window on a miss.
    ///
    /// A discovered window is only cached when no write ran since discovery
    /// began: not while the table lock is held, and not when this process
    /// flushed the model's lists in the meantime. A writer in another process
    /// that completes entirely between discovery and caching goes unseen; its
    /// stale list lives until the next write or the list ttl.
    async fn cached_page(
        &self,
        request: &ListRequest,
        key: &str,
        window: &PageWindow,
    ) -> TesseraResult<Vec<Document>> {
        if self.model.lists.exists(key).await? {
            let ids = self.model.lists.slice(key, window.page_range()).await?;
            return self.fetch_in_order(&ids).await;
        }

        let generation = self.model.lists.generation();
        let in_hand = self.discover_window(request, window).await?;
        if in_hand.is_empty() {
            return Ok(Vec::new());
        }
        if self.writes_since(generation).await {
            tracing::debug!(model = %self.model.name, key = %key, "write in flight; list left uncached");
            return self.fetch_in_order(&page_of(&in_hand, window)).await;
        }
        if let Err(e) = self.model.lists.populate(key, &in_hand).await {
            tracing::warn!(model = %self.model.name, key = %key, error = %e, "failed to cache id list");
            return self.fetch_in_order(&page_of(&in_hand, window)).await;
        }
        if self.model.lists.generation() != generation {
            self.model.lists.discard(key).await;
            return self.fetch_in_order(&page_of(&in_hand, window)).await;
        }

        if self.model.lists.exists(key).await? {
            let ids = self.model.lists.slice(key, window.page_range()).await?;
            return self.fetch_in_order(&ids).await;
        }
        tracing::warn!(
            model = %self.model.name,
            key = %key,
            "cached list missing right after populate; serving discovered window"
        );
        self.fetch_in_order(&page_of(&in_hand, window)).await
    }

    /// Whether a write may have run since `generation` was read.
    async fn writes_since(&self, generation: u64) -> bool {
        if self.model.lists.generation() != generation {
            return true;
        }
        match self.model.locks.peek(&self.model.lock_name).await {
            Ok(held) => held,
            Err(e) => {
                tracing::warn!(model = %self.model.name, error = %e, "failed to check table lock");
                true
            }
        }
    }

    async fn uncached_page(
        &self,
        request: &ListRequest,
        window: &PageWindow,
    ) -> TesseraResult<Vec<Document>> {
        let ids = self.discover_window(request, window).await?;
        self.fetch_in_order(&page_of(&ids, window)).await
    }

    /// Keys of the request's `large_page` window, in result order.
    async fn discover_window(
        &self,
        request: &ListRequest,
        window: &PageWindow,
    ) -> TesseraResult<Vec<String>> {
        let descriptor = QueryDescriptor {
            filter: request.filter.clone(),
            select: self.key_projection(),
            sort: request.sort.clone(),
            skip: Some(window.window_offset()),
            limit: Some(window.large_limit),
            ..Default::default()
        };
        self.log_query("discover", &descriptor);
        let docs = self.model.store.find(&descriptor).await?;
        Ok(self
            .keys_of(&docs)
            .iter()
            .map(PrimaryKey::to_string)
            .collect())
    }

    /// Fetch full documents for cached ids and return them in id order.
    async fn fetch_in_order(&self, raw_ids: &[String]) -> TesseraResult<Vec<Document>> {
        if raw_ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys = raw_ids
            .iter()
            .map(|raw| PrimaryKey::parse(raw, self.model.key_strategy))
            .collect::<TesseraResult<Vec<_>>>()?;
        let descriptor =
            self.read_descriptor(Query::from(keys_in(&self.model.primary_key, &keys)));
        self.log_query("find", &descriptor);

        let pk = &self.model.primary_key;
        let mut by_id: HashMap<String, Document> = self
            .model
            .store
            .find(&descriptor)
            .await?
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get(pk).and_then(PrimaryKey::from_value)?.to_string();
                Some((id, doc))
            })
            .collect();
        Ok(raw_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    pub async fn count(&self, filter: &Document) -> TesseraResult<u64> {
        self.log_query("count", &QueryDescriptor::filtered(filter.clone()));
        self.model.store.count(filter).await
    }

    /// Run a prepared query through the named store operation.
    ///
    /// Supported: `find`, `findOne`, `count`, `aggregate`. A query carrying
    /// aggregate stages always runs as an aggregation.
    pub async fn exec(&self, operation: &str, query: Query) -> TesseraResult<ExecResult> {
        if !matches!(operation, "find" | "findOne" | "count" | "aggregate") {
            return Err(RecordError::UnsupportedOperation {
                operation: operation.to_string(),
            }
            .into());
        }
        let descriptor = self.read_descriptor(query);
        self.log_query(operation, &descriptor);
        let store = &self.model.store;
        if descriptor.is_aggregate() || operation == "aggregate" {
            return Ok(ExecResult::Documents(
                store.aggregate(&descriptor.aggregate).await?,
            ));
        }
        Ok(match operation {
            "findOne" => ExecResult::Document(store.find_one(&descriptor).await?),
            "count" => ExecResult::Count(store.count(&descriptor.filter).await?),
            _ => ExecResult::Documents(store.find(&descriptor).await?),
        })
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// Create an index. An empty spec does nothing.
    pub async fn create_index(&self, spec: &IndexSpec) -> TesseraResult<Option<String>> {
        if spec.is_empty() {
            return Ok(None);
        }
        self.model.store.create_index(spec).await.map(Some)
    }

    /// Drop an index by name. An empty name does nothing.
    pub async fn remove_index(&self, name: &str) -> TesseraResult<()> {
        if name.is_empty() {
            return Ok(());
        }
        self.model.store.drop_index(name).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn acquire_for(&self, opts: WriteOptions) -> TesseraResult<Option<LockLease<Acquired>>> {
        if !opts.lock {
            return Ok(None);
        }
        self.model
            .locks
            .acquire_waiting(&self.model.lock_name)
            .await
            .map(Some)
    }

    async fn release(&self, lease: Option<LockLease<Acquired>>) {
        if let Some(lease) = lease {
            self.model.locks.release(lease).await;
        }
    }

    async fn defer_if_locked(&self, opts: ReadOptions) -> TesseraResult<()> {
        if opts.defer {
            self.model.locks.wait_until_free(&self.model.lock_name).await?;
        }
        Ok(())
    }

    /// Apply the model's projection and relations to a read.
    fn read_descriptor(&self, query: Query) -> QueryDescriptor {
        let mut descriptor = query
            .populate(self.model.relations.iter().cloned())
            .into_descriptor();
        if descriptor.select.is_empty() {
            descriptor.select = self.model.select.clone();
        }
        if is_inclusion(&descriptor.select) {
            descriptor
                .select
                .entry(self.model.primary_key.clone())
                .or_insert(json!(1));
        }
        descriptor
    }

    fn key_projection(&self) -> Document {
        let mut select = Document::new();
        select.insert(self.model.primary_key.clone(), json!(1));
        select
    }

    fn keys_of(&self, docs: &[Document]) -> Vec<PrimaryKey> {
        docs.iter()
            .filter_map(|doc| {
                doc.get(&self.model.primary_key)
                    .and_then(PrimaryKey::from_value)
            })
            .collect()
    }

    fn no_match(&self) -> tessera_core::TesseraError {
        RecordError::NoMatchingRecord {
            table: self.model.table.clone(),
        }
        .into()
    }

    fn log_query(&self, operation: &str, descriptor: &QueryDescriptor) {
        let query = serde_json::to_string(descriptor).unwrap_or_default();
        if self.model.context.log.log_queries {
            tracing::debug!(table = %self.model.table, operation, %query, "query");
        } else {
            tracing::trace!(table = %self.model.table, operation, %query, "query");
        }
    }

    fn log_write(&self, operation: &str, payload: &Document) {
        let payload = Value::Object(payload.clone());
        if self.model.context.log.log_queries {
            tracing::debug!(table = %self.model.table, operation, %payload, "write");
        } else {
            tracing::trace!(table = %self.model.table, operation, %payload, "write");
        }
    }
}

fn empty_payload(operation: &str) -> tessera_core::TesseraError {
    RecordError::EmptyPayload {
        operation: operation.to_string(),
    }
    .into()
}

fn json_pair(filter: &Document, modifier: &Document) -> Document {
    let mut pair = Document::new();
    pair.insert("filter".into(), Value::Object(filter.clone()));
    pair.insert("modifier".into(), Value::Object(modifier.clone()));
    pair
}

/// The page of an in-hand window.
fn page_of(ids: &[String], window: &PageWindow) -> Vec<String> {
    let range = window.page_range();
    let end = range.end.min(ids.len());
    let start = range.start.min(end);
    ids[start..end].to_vec()
}
