//! Table lock coordination over the cache service.
//!
//! Acquisition is a single set-if-absent-with-ttl call. Contended callers
//! sleep a fixed interval and try again; the lock ttl bounds how long a
//! crashed holder can block everyone else.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::{Acquired, LockLease, ModelConfig, RecordError, TesseraError, TesseraResult};
use tessera_storage::CacheClient;

/// Lock name guarding writes to `model` (`db.table`).
pub fn lock_name_for(model: &str) -> String {
    format!("{model}:lock")
}

/// Named mutual exclusion built on [`CacheClient::lock`].
#[derive(Clone)]
pub struct LockCoordinator {
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl std::fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("ttl", &self.ttl)
            .field("poll_interval", &self.poll_interval)
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}

impl LockCoordinator {
    pub fn new(cache: Arc<dyn CacheClient>, config: &ModelConfig) -> Self {
        Self {
            cache,
            ttl: config.lock_ttl,
            poll_interval: config.lock_poll_interval,
            max_wait: config.max_lock_wait,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// One acquisition attempt. `None` means another holder has the lock.
    pub async fn acquire(&self, name: &str) -> TesseraResult<Option<LockLease<Acquired>>> {
        let token = self
            .cache
            .lock(name, self.ttl)
            .await
            .map_err(|e| unavailable(name, e))?;
        Ok(token.map(|token| LockLease::new(name, token, self.ttl)))
    }

    /// Poll until the lock is ours.
    ///
    /// Fails with `LockUnavailable` once `max_lock_wait` elapses, when configured.
    pub async fn acquire_waiting(&self, name: &str) -> TesseraResult<LockLease<Acquired>> {
        let started = tokio::time::Instant::now();
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            if let Some(lease) = self.acquire(name).await? {
                if attempts > 1 {
                    tracing::debug!(lock = %name, attempts, "lock acquired after contention");
                }
                return Ok(lease);
            }
            self.check_deadline(name, started)?;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Give a lease back. Failures are logged, never returned.
    pub async fn release(&self, lease: LockLease<Acquired>) {
        let released = lease.release();
        let name = released.name();
        match self.cache.unlock(name, released.token()).await {
            Ok(true) => tracing::trace!(lock = %name, "lock released"),
            Ok(false) => tracing::warn!(
                lock = %name,
                "lock was no longer held at release; the ttl may have expired mid-operation"
            ),
            Err(e) => tracing::warn!(lock = %name, error = %e, "failed to release lock"),
        }
    }

    /// Whether anyone currently holds `name`.
    pub async fn peek(&self, name: &str) -> TesseraResult<bool> {
        self.cache
            .has_lock(name)
            .await
            .map_err(|e| unavailable(name, e))
    }

    /// Poll until `name` is free, without taking it.
    pub async fn wait_until_free(&self, name: &str) -> TesseraResult<()> {
        let started = tokio::time::Instant::now();
        while self.peek(name).await? {
            self.check_deadline(name, started)?;
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    fn check_deadline(&self, name: &str, started: tokio::time::Instant) -> TesseraResult<()> {
        match self.max_wait {
            Some(max) if started.elapsed() >= max => Err(RecordError::LockUnavailable {
                name: name.to_string(),
                reason: format!("still held after waiting {max:?}"),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

fn unavailable(name: &str, err: TesseraError) -> TesseraError {
    RecordError::LockUnavailable {
        name: name.to_string(),
        reason: err.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_storage::MemoryCache;

    fn coordinator(config: ModelConfig) -> LockCoordinator {
        LockCoordinator::new(Arc::new(MemoryCache::new()), &config)
    }

    #[test]
    fn test_lock_names_are_model_scoped() {
        assert_eq!(lock_name_for("master.posts"), "master.posts:lock");
        assert_ne!(lock_name_for("a.posts"), lock_name_for("b.posts"));
    }

    #[tokio::test]
    async fn test_acquire_reports_contention_as_none() {
        let locks = coordinator(ModelConfig::default());
        let lease = locks.acquire("posts:lock").await.unwrap().unwrap();
        assert!(locks.acquire("posts:lock").await.unwrap().is_none());
        assert!(locks.peek("posts:lock").await.unwrap());

        locks.release(lease).await;
        assert!(!locks.peek("posts:lock").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waiting_polls_until_release() {
        let locks = coordinator(ModelConfig::default());
        let held = locks.acquire("posts:lock").await.unwrap().unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire_waiting("posts:lock").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        locks.release(held).await;
        let lease = waiter.await.unwrap().unwrap();
        assert_eq!(lease.name(), "posts:lock");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waiting_succeeds_once_ttl_expires() {
        let config = ModelConfig::default().with_lock_ttl(Duration::from_millis(200));
        let locks = coordinator(config);
        let _abandoned = locks.acquire("posts:lock").await.unwrap().unwrap();

        let started = tokio::time::Instant::now();
        locks.acquire_waiting("posts:lock").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_lock_wait_gives_up() {
        let config = ModelConfig::default().with_max_lock_wait(Some(Duration::from_millis(100)));
        let locks = coordinator(config);
        let _held = locks.acquire("posts:lock").await.unwrap().unwrap();

        let err = locks.acquire_waiting("posts:lock").await.unwrap_err();
        assert!(err.is_lock_unavailable());

        let err = locks.wait_until_free("posts:lock").await.unwrap_err();
        assert!(err.is_lock_unavailable());
    }

    #[tokio::test]
    async fn test_wait_until_free_returns_immediately_when_unlocked() {
        let locks = coordinator(ModelConfig::default());
        locks.wait_until_free("posts:lock").await.unwrap();
    }
}
