//! Tessera Storage - Store and Cache Contracts
//!
//! Defines the two external collaborators every model talks to: a document
//! store ([`StoreClient`]) and a cache service ([`CacheClient`]) used for
//! locks and cached id lists. In-memory implementations of both live here
//! and back the test suites.

pub mod cache;
pub mod store;

pub use cache::{CacheClient, MemoryCache};
pub use store::{
    InsertResult, MemoryCollection, MemoryDatabase, RemoveResult, StoreClient, StoreProvider,
    UpdateResult,
};
