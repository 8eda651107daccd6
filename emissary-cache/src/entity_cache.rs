use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::store::{CacheError, CacheStore, InMemoryStore};

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Hits over lookups, or `0.0` before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Invalidation generation observed by a reader before it queried the store.
///
/// A fill is only kept if no invalidation touched the same data source while
/// the reader was away; see [`EntityCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochStamp {
    global: u64,
    scope: u64,
}

/// Entity-aware cache in front of a [`CacheStore`].
///
/// Key layout:
///
/// | Entry | Key |
/// |-------|-----|
/// | point lookup | `{ds}:entity:{table}:id:{identity}` |
/// | criteria result | `{ds}:entity:{table}:q:{kind}:{signature}` |
/// | raw query | `{ds}:raw:{signature}` |
///
/// Invalidating a table drops its whole `{ds}:entity:{table}:` namespace plus
/// every raw entry of the data source, since raw SQL may read any table.
pub struct EntityCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    invalidations: AtomicU64,
    global_epoch: AtomicU64,
    epochs: DashMap<String, u64>,
}

impl EntityCache {
    pub fn new(store: impl CacheStore, ttl: Duration) -> Self {
        Self::from_arc(Arc::new(store), ttl)
    }

    pub fn from_arc(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            global_epoch: AtomicU64::new(0),
            epochs: DashMap::new(),
        }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(InMemoryStore::new(), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn point_key(data_source: &str, table: &str, identity: &str) -> String {
        format!("{data_source}:entity:{table}:id:{identity}")
    }

    pub fn query_key(data_source: &str, table: &str, kind: &str, signature: &str) -> String {
        format!("{data_source}:entity:{table}:q:{kind}:{signature}")
    }

    pub fn raw_key(data_source: &str, signature: &str) -> String {
        format!("{data_source}:raw:{signature}")
    }

    fn table_prefix(data_source: &str, table: &str) -> String {
        format!("{data_source}:entity:{table}:")
    }

    fn raw_prefix(data_source: &str) -> String {
        format!("{data_source}:raw:")
    }

    /// Look a key up. Backend failures count as a miss.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "cache hit");
                Some(bytes)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "cache miss");
                None
            }
            Err(err) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    pub fn stamp(&self, data_source: &str) -> EpochStamp {
        EpochStamp {
            global: self.global_epoch.load(Ordering::SeqCst),
            scope: self.epochs.get(data_source).map(|e| *e).unwrap_or(0),
        }
    }

    /// Store a value read from the database under `stamp`.
    ///
    /// The stamp is checked again after the write: if an invalidation ran in
    /// between, the freshly written entry is removed. Invalidations bump the
    /// epoch before removing keys, so either this check or the invalidation's
    /// own removal catches the racing fill. Returns whether the entry was kept.
    pub async fn put(&self, data_source: &str, key: &str, value: Bytes, stamp: EpochStamp) -> bool {
        if self.stamp(data_source) != stamp {
            return false;
        }
        if let Err(err) = self.store.set(key, value, self.ttl).await {
            tracing::warn!(key, error = %err, "cache fill failed");
            return false;
        }
        if self.stamp(data_source) != stamp {
            if let Err(err) = self.store.remove(key).await {
                tracing::warn!(key, error = %err, "could not drop a raced cache fill");
            }
            return false;
        }
        self.puts.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn bump(&self, data_source: &str) {
        *self.epochs.entry(data_source.to_string()).or_insert(0) += 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn invalidate_key(&self, data_source: &str, key: &str) -> Result<(), CacheError> {
        self.bump(data_source);
        self.store.remove(key).await
    }

    /// Drop every entry derived from `table`, plus the data source's raw entries.
    pub async fn invalidate_class(&self, data_source: &str, table: &str) -> Result<(), CacheError> {
        self.bump(data_source);
        self.store
            .remove_by_prefix(&Self::table_prefix(data_source, table))
            .await?;
        self.store
            .remove_by_prefix(&Self::raw_prefix(data_source))
            .await
    }

    pub async fn invalidate_data_source(&self, data_source: &str) -> Result<(), CacheError> {
        self.bump(data_source);
        self.store
            .remove_by_prefix(&format!("{data_source}:"))
            .await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.global_epoch.fetch_add(1, Ordering::SeqCst);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.store.clear().await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
