//! In-memory cache service.
//!
//! Expiry uses `tokio::time::Instant`, so tests running on a paused clock
//! can advance past lock and list timeouts deterministically. Expired keys
//! are purged lazily on access.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use tessera_core::{CacheError, LockToken, TesseraResult};

use super::CacheClient;

#[derive(Debug, Clone)]
enum Entry {
    List(Vec<String>),
    Set(BTreeSet<String>),
    Counter(i64),
    Lock(LockToken),
}

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
}

impl Keyspace {
    fn get(&mut self, key: &str) -> Option<&mut Slot> {
        let now = Instant::now();
        if self.slots.get(key).is_some_and(|slot| !slot.live(now)) {
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }
}

fn wrong_type(key: &str, expected: &str) -> CacheError {
    CacheError::WrongType {
        key: key.to_string(),
        expected: expected.to_string(),
    }
}

/// Cache service held entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Mutex<Keyspace>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        let mut space = self.inner.lock().await;
        space.slots.retain(|_, slot| slot.live(now));
        space.slots.len()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn lock(&self, name: &str, ttl: Duration) -> TesseraResult<Option<LockToken>> {
        let mut space = self.inner.lock().await;
        match space.get(name) {
            Some(Slot {
                entry: Entry::Lock(_),
                ..
            }) => return Ok(None),
            Some(_) => return Err(wrong_type(name, "lock").into()),
            None => {}
        }
        let token = LockToken::generate();
        space.slots.insert(
            name.to_string(),
            Slot {
                entry: Entry::Lock(token.clone()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(Some(token))
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> TesseraResult<bool> {
        let mut space = self.inner.lock().await;
        let owned = matches!(
            space.get(name),
            Some(Slot { entry: Entry::Lock(held), .. }) if held == token
        );
        if owned {
            space.slots.remove(name);
        } else {
            tracing::trace!(lock = %name, "unlock with a stale or foreign token");
        }
        Ok(owned)
    }

    async fn has_lock(&self, name: &str) -> TesseraResult<bool> {
        let mut space = self.inner.lock().await;
        Ok(matches!(
            space.get(name),
            Some(Slot {
                entry: Entry::Lock(_),
                ..
            })
        ))
    }

    async fn exists_key(&self, key: &str) -> TesseraResult<bool> {
        let mut space = self.inner.lock().await;
        Ok(space.get(key).is_some())
    }

    async fn list_push(&self, key: &str, values: &[String]) -> TesseraResult<u64> {
        let mut space = self.inner.lock().await;
        match space.get(key) {
            Some(Slot {
                entry: Entry::List(items),
                ..
            }) => {
                items.extend_from_slice(values);
                Ok(items.len() as u64)
            }
            Some(_) => Err(wrong_type(key, "list").into()),
            None => {
                space.slots.insert(
                    key.to_string(),
                    Slot {
                        entry: Entry::List(values.to_vec()),
                        expires_at: None,
                    },
                );
                Ok(values.len() as u64)
            }
        }
    }

    async fn list_slice(&self, key: &str, range: Range<usize>) -> TesseraResult<Vec<String>> {
        let mut space = self.inner.lock().await;
        match space.get(key) {
            Some(Slot {
                entry: Entry::List(items),
                ..
            }) => {
                let end = range.end.min(items.len());
                let start = range.start.min(end);
                Ok(items[start..end].to_vec())
            }
            Some(_) => Err(wrong_type(key, "list").into()),
            None => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> TesseraResult<u64> {
        let mut space = self.inner.lock().await;
        match space.get(key) {
            Some(Slot {
                entry: Entry::List(items),
                ..
            }) => Ok(items.len() as u64),
            Some(_) => Err(wrong_type(key, "list").into()),
            None => Ok(0),
        }
    }

    async fn set_key_timeout(&self, key: &str, ttl: Duration) -> TesseraResult<bool> {
        let mut space = self.inner.lock().await;
        match space.get(key) {
            Some(slot) => {
                slot.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_add(&self, set: &str, member: &str) -> TesseraResult<bool> {
        let mut space = self.inner.lock().await;
        match space.get(set) {
            Some(Slot {
                entry: Entry::Set(members),
                ..
            }) => Ok(members.insert(member.to_string())),
            Some(_) => Err(wrong_type(set, "set").into()),
            None => {
                space.slots.insert(
                    set.to_string(),
                    Slot {
                        entry: Entry::Set(BTreeSet::from([member.to_string()])),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn set_remove(&self, set: &str, member: &str) -> TesseraResult<bool> {
        let mut space = self.inner.lock().await;
        let (removed, now_empty) = match space.get(set) {
            Some(Slot {
                entry: Entry::Set(members),
                ..
            }) => (members.remove(member), members.is_empty()),
            Some(_) => return Err(wrong_type(set, "set").into()),
            None => (false, false),
        };
        if now_empty {
            space.slots.remove(set);
        }
        Ok(removed)
    }

    async fn set_members(&self, set: &str) -> TesseraResult<Vec<String>> {
        let mut space = self.inner.lock().await;
        match space.get(set) {
            Some(Slot {
                entry: Entry::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(set, "set").into()),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_key(&self, key: &str) -> TesseraResult<bool> {
        let mut space = self.inner.lock().await;
        let existed = space.get(key).is_some();
        space.slots.remove(key);
        Ok(existed)
    }

    async fn next_sequence(&self, key: &str) -> TesseraResult<i64> {
        let mut space = self.inner.lock().await;
        match space.get(key) {
            Some(Slot {
                entry: Entry::Counter(value),
                ..
            }) => {
                *value += 1;
                Ok(*value)
            }
            Some(_) => Err(wrong_type(key, "counter").into()),
            None => {
                space.slots.insert(
                    key.to_string(),
                    Slot {
                        entry: Entry::Counter(1),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }
}
