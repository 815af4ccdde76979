//! Per-SKU mutual-exclusion locks backed by a shared key-value store.
//!
//! Each lock is a `SET key token NX PX lease` in Redis: the lease expires
//! automatically so a crashed holder cannot block a SKU forever, and
//! release only deletes the key when the stored token still belongs to
//! the releasing holder. Multi-SKU acquisition always walks the SKUs in
//! canonical sorted order, which rules out circular waits between
//! concurrent multi-item checkouts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

const LOCK_KEY_PREFIX: &str = "stock:lock:";
const MAX_ACQUIRE_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 25;
const BACKOFF_JITTER_MS: u64 = 25;

/// Storage backend for lease locks.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Set-if-absent with TTL. Returns whether the lock was acquired.
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, ServiceError>;

    /// Deletes the key only while it still holds `token`; no-op otherwise.
    async fn release(&self, key: &str, token: &str) -> Result<(), ServiceError>;
}

/// Redis backend used in deployment: locks are visible to every instance.
pub struct RedisLockBackend {
    client: Arc<redis::Client>,
}

impl RedisLockBackend {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, ServiceError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| ServiceError::LockStoreError(e.to_string()))?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::LockStoreError(e.to_string()))?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> Result<(), ServiceError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| ServiceError::LockStoreError(e.to_string()))?;

        // Compare-and-delete so a holder whose lease already expired cannot
        // delete a lock someone else now owns.
        let script = redis::Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        );
        let _: i32 = script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ServiceError::LockStoreError(e.to_string()))?;

        Ok(())
    }
}

/// In-process backend for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryLockBackend {
    locks: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockBackend for InMemoryLockBackend {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, ServiceError> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        match locks.get(key) {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                locks.insert(key.to_string(), (token.to_string(), now + lease));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<(), ServiceError> {
        let mut locks = self.locks.lock().await;
        if let Some((holder, _)) = locks.get(key) {
            if holder == token {
                locks.remove(key);
            }
        }
        Ok(())
    }
}

/// Serializes concurrent stock mutations on the same SKU.
#[derive(Clone)]
pub struct StockLockManager {
    backend: Arc<dyn LockBackend>,
    lease: Duration,
}

impl StockLockManager {
    pub fn new(backend: Arc<dyn LockBackend>, lease: Duration) -> Self {
        Self { backend, lease }
    }

    fn key(sku: &str) -> String {
        format!("{}{}", LOCK_KEY_PREFIX, sku)
    }

    /// Acquires the lock for one SKU, retrying with jittered backoff.
    /// Exhausted retries surface as `StockLockTimeout`; callers must treat
    /// that as a hard failure, never proceed without the lock.
    pub async fn acquire(&self, sku: &str, holder_token: &str) -> Result<(), ServiceError> {
        let key = Self::key(sku);
        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            if self
                .backend
                .try_acquire(&key, holder_token, self.lease)
                .await?
            {
                debug!(%sku, attempt, "stock lock acquired");
                return Ok(());
            }

            if attempt + 1 < MAX_ACQUIRE_ATTEMPTS {
                let backoff = BACKOFF_BASE_MS << attempt;
                let jitter = {
                    use rand::Rng;
                    rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS)
                };
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }
        }

        warn!(%sku, "stock lock contention exhausted retries");
        Err(ServiceError::StockLockTimeout(sku.to_string()))
    }

    /// Releases a single SKU lock; no-op when this token no longer holds it.
    pub async fn release(&self, sku: &str, holder_token: &str) -> Result<(), ServiceError> {
        self.backend.release(&Self::key(sku), holder_token).await
    }

    /// Runs `f` while holding the locks for every SKU in `skus`.
    ///
    /// SKUs are deduplicated and acquired in sorted order; all acquired
    /// locks are released on exit whether `f` succeeds or fails. The lock
    /// lease bounds the critical section: `f` must stay within local
    /// transaction work and never span payment-provider round trips.
    pub async fn with_locks<F, Fut, T>(&self, skus: &[String], f: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let mut ordered: Vec<&str> = skus.iter().map(String::as_str).collect();
        ordered.sort_unstable();
        ordered.dedup();

        let holder_token = Uuid::new_v4().to_string();
        let mut held: Vec<&str> = Vec::with_capacity(ordered.len());

        for sku in &ordered {
            match self.acquire(sku, &holder_token).await {
                Ok(()) => held.push(sku),
                Err(e) => {
                    for held_sku in held.iter().rev() {
                        if let Err(release_err) = self.release(held_sku, &holder_token).await {
                            warn!(sku = %held_sku, "failed to release stock lock: {}", release_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        let result = f().await;

        for sku in held.iter().rev() {
            if let Err(release_err) = self.release(sku, &holder_token).await {
                warn!(%sku, "failed to release stock lock: {}", release_err);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn manager() -> StockLockManager {
        StockLockManager::new(
            Arc::new(InMemoryLockBackend::new()),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn lock_is_mutually_exclusive() {
        let backend = InMemoryLockBackend::new();
        let lease = Duration::from_secs(10);
        assert!(backend.try_acquire("stock:lock:A", "t1", lease).await.unwrap());
        assert!(!backend.try_acquire("stock:lock:A", "t2", lease).await.unwrap());
    }

    #[tokio::test]
    async fn release_requires_matching_token() {
        let backend = InMemoryLockBackend::new();
        let lease = Duration::from_secs(10);
        assert!(backend.try_acquire("stock:lock:A", "t1", lease).await.unwrap());

        // Wrong token: lock must survive.
        backend.release("stock:lock:A", "t2").await.unwrap();
        assert!(!backend.try_acquire("stock:lock:A", "t3", lease).await.unwrap());

        backend.release("stock:lock:A", "t1").await.unwrap();
        assert!(backend.try_acquire("stock:lock:A", "t3", lease).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_reacquired() {
        let backend = InMemoryLockBackend::new();
        assert!(backend
            .try_acquire("stock:lock:A", "t1", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(backend
            .try_acquire("stock:lock:A", "t2", Duration::from_secs(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn with_locks_releases_on_success_and_failure() {
        let mgr = manager();
        let skus = vec!["B".to_string(), "A".to_string(), "B".to_string()];

        mgr.with_locks(&skus, || async { Ok::<_, ServiceError>(()) })
            .await
            .unwrap();

        let err = mgr
            .with_locks(&skus, || async {
                Err::<(), _>(ServiceError::BadRequest("boom".into()))
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::BadRequest(_));

        // Both failures and successes must leave the SKUs lockable.
        mgr.with_locks(&skus, || async { Ok::<_, ServiceError>(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn contended_lock_times_out() {
        let mgr = manager();
        let backend_token = "other-holder";
        mgr.backend
            .try_acquire("stock:lock:HOT", backend_token, Duration::from_secs(60))
            .await
            .unwrap();

        let err = mgr
            .with_locks(&["HOT".to_string()], || async {
                Ok::<_, ServiceError>(())
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::StockLockTimeout(sku) if sku == "HOT");
    }

    #[tokio::test]
    async fn failed_multi_acquire_releases_earlier_locks() {
        let mgr = manager();
        // Hold "B" externally so the multi-lock fails after taking "A".
        mgr.backend
            .try_acquire("stock:lock:B", "external", Duration::from_secs(60))
            .await
            .unwrap();

        let err = mgr
            .with_locks(&["A".to_string(), "B".to_string()], || async {
                Ok::<_, ServiceError>(())
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::StockLockTimeout(_));

        // "A" must have been rolled back.
        assert!(mgr
            .backend
            .try_acquire("stock:lock:A", "fresh-holder", Duration::from_secs(1))
            .await
            .unwrap());
    }
}
