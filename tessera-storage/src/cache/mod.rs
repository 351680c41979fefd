//! Cache service contract.
//!
//! The cache service holds short-lived coordination state: named locks,
//! ordered id lists, string sets and integer sequence counters. Every key
//! has one type; using a key as another type is a [`CacheError::WrongType`].
//!
//! [`CacheError::WrongType`]: tessera_core::CacheError::WrongType

pub mod memory;

use async_trait::async_trait;
use std::ops::Range;
use std::time::Duration;

use tessera_core::{LockToken, TesseraResult};

pub use memory::MemoryCache;

/// Key-value service used for locks and cached id lists.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Try to take `name` for `ttl`. `None` means someone else holds it.
    async fn lock(&self, name: &str, ttl: Duration) -> TesseraResult<Option<LockToken>>;

    /// Release `name` if `token` still owns it. Returns whether a lock was removed.
    async fn unlock(&self, name: &str, token: &LockToken) -> TesseraResult<bool>;

    async fn has_lock(&self, name: &str) -> TesseraResult<bool>;

    async fn exists_key(&self, key: &str) -> TesseraResult<bool>;

    /// Append values to a list, returning the new length.
    async fn list_push(&self, key: &str, values: &[String]) -> TesseraResult<u64>;

    /// Half-open slice of a list; out-of-range bounds are clamped.
    async fn list_slice(&self, key: &str, range: Range<usize>) -> TesseraResult<Vec<String>>;

    async fn list_len(&self, key: &str) -> TesseraResult<u64>;

    /// Set a key's expiry. Returns false when the key does not exist.
    async fn set_key_timeout(&self, key: &str, ttl: Duration) -> TesseraResult<bool>;

    /// Add to a set. Returns whether the member was new.
    async fn set_add(&self, set: &str, member: &str) -> TesseraResult<bool>;

    async fn set_remove(&self, set: &str, member: &str) -> TesseraResult<bool>;

    async fn set_members(&self, set: &str) -> TesseraResult<Vec<String>>;

    /// Delete a key of any type. Returns whether it existed.
    async fn delete_key(&self, key: &str) -> TesseraResult<bool>;

    /// Increment and return a counter; a missing counter starts at zero.
    async fn next_sequence(&self, key: &str) -> TesseraResult<i64>;
}
