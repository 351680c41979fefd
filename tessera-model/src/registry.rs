//! Model registry.
//!
//! Registers each record type once (index initialisation, relation map,
//! lock coordinator and list cache) and hands out handles with fresh
//! scratch state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tessera_core::{
    ConfigError, Document, KeyStrategy, ModelContext, RecordError, Schema, StoreError,
    TesseraResult, DEFAULT_PRIMARY_KEY,
};
use tessera_storage::{CacheClient, StoreProvider};

use crate::record::{Model, ModelParts, Record};

/// Database used when a model name has no `db.` prefix.
pub const DEFAULT_DATABASE: &str = "master";

/// Everything needed to register a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    /// `table` or `database.table`.
    pub name: String,
    pub schema: Schema,
    /// Default projection applied to reads.
    pub select: Document,
    /// Primary-key field; `_id` when unset.
    pub primary_key: Option<String>,
    pub key_strategy: KeyStrategy,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            select: Document::new(),
            primary_key: None,
            key_strategy: KeyStrategy::default(),
        }
    }

    pub fn with_select(mut self, select: Document) -> Self {
        self.select = select;
        self
    }

    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }
}

/// Split `db.table` into its parts, defaulting the database.
pub fn parse_model_name(name: &str) -> Result<(String, String), ConfigError> {
    let (database, table) = match name.split_once('.') {
        Some((database, table)) => (database, table),
        None => (DEFAULT_DATABASE, name),
    };
    if database.is_empty() || table.is_empty() || table.contains('.') {
        return Err(ConfigError::InvalidValue {
            field: "model name".to_string(),
            value: name.to_string(),
            reason: "expected `table` or `database.table`".to_string(),
        });
    }
    Ok((database.to_string(), table.to_string()))
}

/// Registered models, keyed by `database.table`.
pub struct ModelRegistry {
    store: Arc<dyn StoreProvider>,
    cache: Arc<dyn CacheClient>,
    context: ModelContext,
    models: RwLock<HashMap<String, Arc<Model>>>,
    /// Serialises `register` so initialisation runs once per name.
    registration: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("context", &self.context)
            .field("models", &self.models())
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    /// Build a registry. The context's configuration is validated here.
    pub fn new(
        store: Arc<dyn StoreProvider>,
        cache: Arc<dyn CacheClient>,
        context: ModelContext,
    ) -> TesseraResult<Self> {
        context.config.validate()?;
        Ok(Self {
            store,
            cache,
            context,
            models: RwLock::new(HashMap::new()),
            registration: tokio::sync::Mutex::new(()),
        })
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    /// Register a model and return a handle on it.
    ///
    /// A name that is already registered yields a fresh handle on the
    /// existing model; initialisation does not run again, also when two
    /// registrations of one name race.
    pub async fn register(&self, definition: ModelDefinition) -> TesseraResult<Record> {
        let (database, table) = parse_model_name(&definition.name)?;
        let name = format!("{database}.{table}");
        let _registering = self.registration.lock().await;
        if let Some(existing) = self.lookup(&name)? {
            tracing::debug!(model = %name, "model already registered");
            return Ok(Record::new(existing));
        }

        let model = Model::new(ModelParts {
            store: self.store.collection(&database, &table),
            cache: Arc::clone(&self.cache),
            context: self.context.clone(),
            name: name.clone(),
            table,
            schema: definition.schema,
            primary_key: definition
                .primary_key
                .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string()),
            key_strategy: definition.key_strategy,
            select: definition.select,
        });
        if self.context.config.init_indexes {
            model.init_indexes().await?;
        }

        let model = Arc::new(model);
        self.models
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(name.clone(), Arc::clone(&model));
        tracing::info!(model = %name, "model registered");
        Ok(Record::new(model))
    }

    /// Fresh handle on a registered model.
    pub fn record(&self, name: &str) -> TesseraResult<Record> {
        let (database, table) = parse_model_name(name)?;
        let name = format!("{database}.{table}");
        match self.lookup(&name)? {
            Some(model) => Ok(Record::new(model)),
            None => Err(RecordError::UnknownModel { name }.into()),
        }
    }

    /// Registered names, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .read()
            .map(|models| models.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> TesseraResult<Option<Arc<Model>>> {
        let models = self.models.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(models.get(name).cloned())
    }
}
