//! Tessera Model - Record Orchestration
//!
//! The record layer on top of the store and cache contracts:
//!
//! - [`LockCoordinator`]: table locks with fixed-interval polling
//! - [`ResultListCache`]: cached primary-key lists and their invalidation registry
//! - [`Record`]: CRUD, list reads and query execution for one model
//! - [`ModelRegistry`]: one-time model registration and handle hand-out

pub mod coordinator;
pub mod list_cache;
pub mod record;
pub mod registry;

pub use coordinator::{lock_name_for, LockCoordinator};
pub use list_cache::{list_key, registry_key_for, ListCacheStats, PageWindow, ResultListCache};
pub use record::{
    ExecResult, ListPage, ReadOptions, Record, RemoveAck, SaveOutcome, Selector, UpdateMode,
    UpdateOutcome, WriteOptions,
};
pub use registry::{parse_model_name, ModelDefinition, ModelRegistry, DEFAULT_DATABASE};
