//! In-memory document store.
//!
//! All databases live behind one `tokio::sync::RwLock`, so each operation is
//! atomic with respect to the others and relation lookups see a consistent
//! snapshot of sibling collections.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use tessera_core::{
    new_object_id, Document, IndexSpec, QueryDescriptor, Relation, SortDirection, SortKey,
    StoreError, TesseraResult, DEFAULT_PRIMARY_KEY,
};

use super::matcher::{apply_modifier, lookup, matches, project, sort_documents};
use super::{InsertResult, RemoveResult, StoreClient, StoreProvider, UpdateResult};

#[derive(Debug, Default)]
struct CollectionData {
    docs: Vec<Document>,
    indexes: BTreeMap<String, IndexSpec>,
}

impl CollectionData {
    /// Find a document other than `skip` that collides with `doc` on `_id` or a unique index.
    fn conflict(&self, doc: &Document, skip: Option<usize>) -> Option<String> {
        for (pos, other) in self.docs.iter().enumerate() {
            if Some(pos) == skip {
                continue;
            }
            if doc.get(DEFAULT_PRIMARY_KEY).is_some()
                && doc.get(DEFAULT_PRIMARY_KEY) == other.get(DEFAULT_PRIMARY_KEY)
            {
                return Some(format!(
                    "{}={}",
                    DEFAULT_PRIMARY_KEY,
                    doc.get(DEFAULT_PRIMARY_KEY).cloned().unwrap_or(Value::Null)
                ));
            }
            for (name, spec) in self.indexes.iter().filter(|(_, s)| s.unique) {
                if unique_values(doc, spec).is_some()
                    && unique_values(doc, spec) == unique_values(other, spec)
                {
                    return Some(name.clone());
                }
            }
        }
        None
    }
}

/// Values of an index's fields; `None` when any is missing (sparse semantics).
fn unique_values(doc: &Document, spec: &IndexSpec) -> Option<Vec<Value>> {
    spec.keys
        .iter()
        .map(|k| lookup(doc, &k.field).filter(|v| !v.is_null()).cloned())
        .collect()
}

type Databases = HashMap<String, HashMap<String, CollectionData>>;

/// Shared in-memory backend holding any number of databases.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<RwLock<Databases>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete client for one collection.
    pub fn open(&self, database: &str, name: &str) -> MemoryCollection {
        MemoryCollection {
            database: database.to_string(),
            name: name.to_string(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl StoreProvider for MemoryDatabase {
    fn collection(&self, database: &str, name: &str) -> Arc<dyn StoreClient> {
        Arc::new(self.open(database, name))
    }
}

/// Client for one collection of a [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    database: String,
    name: String,
    inner: Arc<RwLock<Databases>>,
}

impl MemoryCollection {
    pub fn database(&self) -> &str {
        &self.database
    }

    fn invalid_query(&self, reason: String) -> StoreError {
        StoreError::InvalidQuery {
            collection: self.name.clone(),
            reason,
        }
    }

    fn invalid_modifier(&self, reason: String) -> StoreError {
        StoreError::InvalidModifier {
            collection: self.name.clone(),
            reason,
        }
    }

    fn select(&self, docs: &[Document], filter: &Document) -> Result<Vec<usize>, StoreError> {
        let mut hits = Vec::new();
        for (pos, doc) in docs.iter().enumerate() {
            if matches(doc, filter).map_err(|e| self.invalid_query(e))? {
                hits.push(pos);
            }
        }
        Ok(hits)
    }

    fn populate(&self, dbs: &Databases, docs: &mut [Document], relations: &[Relation]) {
        let siblings = dbs.get(&self.database);
        for relation in relations {
            let foreign = siblings
                .and_then(|cols| cols.get(&relation.from))
                .map(|c| c.docs.as_slice())
                .unwrap_or(&[]);
            for doc in docs.iter_mut() {
                let local: Vec<Value> = match lookup(doc, &relation.field) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                };
                let joined: Vec<Value> = foreign
                    .iter()
                    .filter(|f| {
                        lookup(f, &relation.key)
                            .map(|v| local.contains(v))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .map(Value::Object)
                    .collect();
                doc.insert(relation.alias.clone(), Value::Array(joined));
            }
        }
    }

    /// Apply `modifier` to the documents at `positions`, enforcing key constraints.
    fn modify(
        &self,
        data: &mut CollectionData,
        positions: &[usize],
        modifier: &Document,
    ) -> Result<u64, StoreError> {
        let mut modified = 0;
        for &pos in positions {
            let mut next = data.docs[pos].clone();
            let changed = apply_modifier(&mut next, modifier).map_err(|e| self.invalid_modifier(e))?;
            if !changed {
                continue;
            }
            if next.get(DEFAULT_PRIMARY_KEY) != data.docs[pos].get(DEFAULT_PRIMARY_KEY) {
                return Err(self.invalid_modifier(format!("{DEFAULT_PRIMARY_KEY} is immutable")));
            }
            if let Some(key) = data.conflict(&next, Some(pos)) {
                return Err(StoreError::DuplicateKey {
                    collection: self.name.clone(),
                    key,
                });
            }
            data.docs[pos] = next;
            modified += 1;
        }
        Ok(modified)
    }

    fn run_stage(&self, docs: Vec<Document>, stage: &Value) -> Result<Vec<Document>, StoreError> {
        let (op, arg) = stage
            .as_object()
            .filter(|s| s.len() == 1)
            .and_then(|s| s.iter().next())
            .ok_or_else(|| self.invalid_query(format!("malformed stage {stage}")))?;
        match op.as_str() {
            "$match" => {
                let filter = arg
                    .as_object()
                    .ok_or_else(|| self.invalid_query("$match expects a document".into()))?;
                let mut out = Vec::new();
                for doc in docs {
                    if matches(&doc, filter).map_err(|e| self.invalid_query(e))? {
                        out.push(doc);
                    }
                }
                Ok(out)
            }
            "$sort" => {
                let spec = arg
                    .as_object()
                    .ok_or_else(|| self.invalid_query("$sort expects a document".into()))?;
                let keys: Vec<SortKey> = spec
                    .iter()
                    .map(|(field, dir)| SortKey {
                        field: field.clone(),
                        direction: if dir.as_i64() == Some(-1) {
                            SortDirection::Desc
                        } else {
                            SortDirection::Asc
                        },
                    })
                    .collect();
                let mut docs = docs;
                sort_documents(&mut docs, &keys);
                Ok(docs)
            }
            "$skip" | "$limit" => {
                let n = arg
                    .as_u64()
                    .ok_or_else(|| self.invalid_query(format!("{op} expects a number")))?
                    as usize;
                Ok(if op == "$skip" {
                    docs.into_iter().skip(n).collect()
                } else {
                    docs.into_iter().take(n).collect()
                })
            }
            "$project" => {
                let select = arg
                    .as_object()
                    .ok_or_else(|| self.invalid_query("$project expects a document".into()))?;
                Ok(docs
                    .iter()
                    .map(|d| project(d, select, &[DEFAULT_PRIMARY_KEY]))
                    .collect())
            }
            "$count" => {
                let field = arg
                    .as_str()
                    .ok_or_else(|| self.invalid_query("$count expects a field name".into()))?;
                let mut out = Document::new();
                out.insert(field.to_string(), Value::from(docs.len() as u64));
                Ok(vec![out])
            }
            other => Err(self.invalid_query(format!("unsupported stage {other}"))),
        }
    }
}

#[async_trait]
impl StoreClient for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, mut doc: Document) -> TesseraResult<InsertResult> {
        if let Some(bad) = doc.keys().find(|k| k.starts_with('$')) {
            return Err(StoreError::InsertFailed {
                collection: self.name.clone(),
                reason: format!("field names may not start with '$': {bad}"),
            }
            .into());
        }
        if doc.get(DEFAULT_PRIMARY_KEY).map_or(true, Value::is_null) {
            doc.insert(DEFAULT_PRIMARY_KEY.to_string(), Value::String(new_object_id()));
        }
        let inserted_id = doc.get(DEFAULT_PRIMARY_KEY).cloned().unwrap_or(Value::Null);

        let mut dbs = self.inner.write().await;
        let data = dbs
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();
        if let Some(key) = data.conflict(&doc, None) {
            return Err(StoreError::DuplicateKey {
                collection: self.name.clone(),
                key,
            }
            .into());
        }
        data.docs.push(doc);
        Ok(InsertResult { inserted_id })
    }

    async fn update(&self, filter: &Document, modifier: &Document) -> TesseraResult<UpdateResult> {
        let mut dbs = self.inner.write().await;
        let Some(data) = dbs
            .get_mut(&self.database)
            .and_then(|cols| cols.get_mut(&self.name))
        else {
            return Ok(UpdateResult::default());
        };
        let positions = self.select(&data.docs, filter)?;
        let modified = self.modify(data, &positions, modifier)?;
        Ok(UpdateResult {
            matched: positions.len() as u64,
            modified,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: &Document,
        modifier: &Document,
    ) -> TesseraResult<Option<Document>> {
        let mut dbs = self.inner.write().await;
        let Some(data) = dbs
            .get_mut(&self.database)
            .and_then(|cols| cols.get_mut(&self.name))
        else {
            return Ok(None);
        };
        let Some(&pos) = self.select(&data.docs, filter)?.first() else {
            return Ok(None);
        };
        self.modify(data, &[pos], modifier)?;
        Ok(Some(data.docs[pos].clone()))
    }

    async fn remove(&self, filter: &Document) -> TesseraResult<RemoveResult> {
        let mut dbs = self.inner.write().await;
        let Some(data) = dbs
            .get_mut(&self.database)
            .and_then(|cols| cols.get_mut(&self.name))
        else {
            return Ok(RemoveResult::default());
        };
        let positions = self.select(&data.docs, filter)?;
        let mut pos = 0;
        data.docs.retain(|_| {
            let keep = positions.binary_search(&pos).is_err();
            pos += 1;
            keep
        });
        Ok(RemoveResult {
            deleted: positions.len() as u64,
        })
    }

    async fn count(&self, filter: &Document) -> TesseraResult<u64> {
        let dbs = self.inner.read().await;
        let Some(data) = dbs.get(&self.database).and_then(|cols| cols.get(&self.name)) else {
            return Ok(0);
        };
        Ok(self.select(&data.docs, filter)?.len() as u64)
    }

    async fn find(&self, query: &QueryDescriptor) -> TesseraResult<Vec<Document>> {
        let dbs = self.inner.read().await;
        let Some(data) = dbs.get(&self.database).and_then(|cols| cols.get(&self.name)) else {
            return Ok(Vec::new());
        };
        let mut docs: Vec<Document> = self
            .select(&data.docs, &query.filter)?
            .into_iter()
            .map(|pos| data.docs[pos].clone())
            .collect();
        sort_documents(&mut docs, &query.sort);

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let mut docs: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();

        self.populate(&dbs, &mut docs, &query.populate);

        let mut always: Vec<&str> = vec![DEFAULT_PRIMARY_KEY];
        always.extend(query.populate.iter().map(|r| r.alias.as_str()));
        Ok(docs
            .iter()
            .map(|d| project(d, &query.select, &always))
            .collect())
    }

    async fn aggregate(&self, stages: &[Value]) -> TesseraResult<Vec<Document>> {
        let dbs = self.inner.read().await;
        let mut docs = dbs
            .get(&self.database)
            .and_then(|cols| cols.get(&self.name))
            .map(|c| c.docs.clone())
            .unwrap_or_default();
        drop(dbs);
        for stage in stages {
            docs = self.run_stage(docs, stage)?;
        }
        Ok(docs)
    }

    async fn create_index(&self, spec: &IndexSpec) -> TesseraResult<String> {
        let name = spec.index_name();
        let index_error = |reason: String| StoreError::IndexError {
            index_name: name.clone(),
            reason,
        };
        if spec.is_empty() {
            return Err(index_error("index has no keys".into()).into());
        }

        let mut dbs = self.inner.write().await;
        let data = dbs
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();
        if let Some(existing) = data.indexes.get(&name) {
            if existing == spec {
                return Ok(name);
            }
            return Err(index_error("an index with this name but other options exists".into()).into());
        }
        if spec.unique {
            let mut seen: Vec<Vec<Value>> = Vec::new();
            for values in data.docs.iter().filter_map(|d| unique_values(d, spec)) {
                if seen.contains(&values) {
                    return Err(index_error(format!("duplicate values {values:?}")).into());
                }
                seen.push(values);
            }
        }
        data.indexes.insert(name.clone(), spec.clone());
        tracing::debug!(collection = %self.name, index = %name, "index created");
        Ok(name)
    }

    async fn drop_index(&self, name: &str) -> TesseraResult<()> {
        let mut dbs = self.inner.write().await;
        let removed = dbs
            .get_mut(&self.database)
            .and_then(|cols| cols.get_mut(&self.name))
            .and_then(|data| data.indexes.remove(name));
        match removed {
            Some(_) => {
                tracing::debug!(collection = %self.name, index = %name, "index dropped");
                Ok(())
            }
            None => Err(StoreError::IndexError {
                index_name: name.to_string(),
                reason: "index not found".into(),
            }
            .into()),
        }
    }

    async fn clear(&self) -> TesseraResult<u64> {
        let mut dbs = self.inner.write().await;
        let cleared = dbs
            .get_mut(&self.database)
            .and_then(|cols| cols.get_mut(&self.name))
            .map(|data| std::mem::take(&mut data.docs).len() as u64)
            .unwrap_or(0);
        tracing::debug!(collection = %self.name, cleared, "collection cleared");
        Ok(cleared)
    }
}
