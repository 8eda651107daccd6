use bytes::Bytes;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Failure reported by a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Pluggable cache backend.
///
/// Implement this to swap the default in-memory store for Redis, Memcached, etc.
/// Every operation is fallible so that a failed invalidation can be reported
/// instead of leaving stale entries behind silently.
pub trait CacheStore: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Bytes>>;
    fn set<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> CacheFuture<'a, ()>;
    fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
    fn remove_by_prefix<'a>(&'a self, prefix: &'a str) -> CacheFuture<'a, ()>;
    fn clear(&self) -> CacheFuture<'_, ()>;
}

/// Default in-memory store backed by `DashMap`.
///
/// Each entry stores `(value, inserted_at, ttl)` and is lazily evicted on access.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<DashMap<String, (Bytes, Instant, Duration)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every expired entry.
    pub fn evict_expired(&self) {
        self.inner
            .retain(|_, (_, inserted, ttl)| inserted.elapsed() < *ttl);
    }

    fn get_sync(&self, key: &str) -> Option<Bytes> {
        if let Some(entry) = self.inner.get(key) {
            let (val, inserted, ttl) = entry.value();
            if inserted.elapsed() < *ttl {
                return Some(val.clone());
            }
            // Expired: release the read guard before removing
            drop(entry);
            self.inner.remove(key);
        }
        None
    }
}

impl CacheStore for InMemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Bytes>> {
        Box::pin(async move { Ok(self.get_sync(key)) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.inner
                .insert(key.to_string(), (value, Instant::now(), ttl));
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.inner.remove(key);
            Ok(())
        })
    }

    fn remove_by_prefix<'a>(&'a self, prefix: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.inner.retain(|k, _| !k.starts_with(prefix));
            Ok(())
        })
    }

    fn clear(&self) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            self.inner.clear();
            Ok(())
        })
    }
}
