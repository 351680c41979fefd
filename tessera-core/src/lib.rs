//! Tessera Core - Data Types
//!
//! Documents, keys, queries, schemas, lock leases, configuration and the
//! error taxonomy. Every other Tessera crate depends on this one; it does no
//! I/O of its own.

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod identity;
pub mod lock;
pub mod query;
pub mod schema;
pub mod update;

pub use config::ModelConfig;
pub use context::{LogPolicy, ModelContext};
pub use error::{
    CacheError, ConfigError, RecordError, StoreError, TesseraError, TesseraResult,
    ValidationError,
};
pub use filter::{by_key, is_operator_key, keys_in, merge_filters, FilterExpr, FilterOperator};
pub use identity::{
    fingerprint, new_object_id, Document, KeyStrategy, PrimaryKey, DEFAULT_PRIMARY_KEY,
};
pub use lock::{Acquired, LeaseState, LockLease, LockToken, Released};
pub use query::{ListRequest, Query, QueryDescriptor, Relation, SortDirection, SortKey};
pub use schema::{FieldDef, FieldKind, FieldMap, IndexKey, IndexKind, IndexSpec, RelationSpec, Schema};
pub use update::{UpdatePayload, SET_MODIFIER};
