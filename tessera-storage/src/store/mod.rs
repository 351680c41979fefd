//! Document store contract.
//!
//! A [`StoreClient`] is bound to one collection of one database. Filters,
//! projections and modifiers use the usual `$`-operator document shape.

pub mod matcher;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use tessera_core::{Document, IndexSpec, QueryDescriptor, TesseraResult};

pub use memory::{MemoryCollection, MemoryDatabase};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Acknowledgement of an insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResult {
    /// Primary key actually stored; assigned by the store when the document had none.
    pub inserted_id: Value,
}

/// Acknowledgement of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Acknowledgement of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub deleted: u64,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Operations on one collection.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Insert one document. A missing `_id` is assigned by the store.
    async fn insert(&self, doc: Document) -> TesseraResult<InsertResult>;

    /// Apply `modifier` to every document matching `filter`.
    async fn update(&self, filter: &Document, modifier: &Document) -> TesseraResult<UpdateResult>;

    /// Apply `modifier` to the first match and return its post-update image.
    async fn find_one_and_update(
        &self,
        filter: &Document,
        modifier: &Document,
    ) -> TesseraResult<Option<Document>>;

    /// Delete every document matching `filter`.
    async fn remove(&self, filter: &Document) -> TesseraResult<RemoveResult>;

    async fn count(&self, filter: &Document) -> TesseraResult<u64>;

    /// Run a find. `page` and `large_page` are caller bookkeeping and ignored here.
    async fn find(&self, query: &QueryDescriptor) -> TesseraResult<Vec<Document>>;

    async fn find_one(&self, query: &QueryDescriptor) -> TesseraResult<Option<Document>> {
        let mut single = query.clone();
        single.limit = Some(1);
        Ok(self.find(&single).await?.into_iter().next())
    }

    /// Run an aggregation pipeline.
    async fn aggregate(&self, stages: &[Value]) -> TesseraResult<Vec<Document>>;

    /// Create an index, returning its name. Re-creating an identical index is a no-op.
    async fn create_index(&self, spec: &IndexSpec) -> TesseraResult<String>;

    async fn drop_index(&self, name: &str) -> TesseraResult<()>;

    /// Delete every document, returning how many were removed.
    async fn clear(&self) -> TesseraResult<u64>;
}

/// Hands out collection clients by database and collection name.
pub trait StoreProvider: Send + Sync {
    fn collection(&self, database: &str, name: &str) -> Arc<dyn StoreClient>;
}
