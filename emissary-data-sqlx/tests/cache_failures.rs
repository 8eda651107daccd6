mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::{account_rules, create_schema, sqlite_url, Account};
use emissary_cache::{CacheError, CacheFuture, CacheStore, InMemoryStore};
use emissary_core::{DataSourceSettings, LogSettings};
use emissary_data::{AndMap, DataError};
use emissary_data_sqlx::Delegator;

/// Serves reads and fills, but refuses removals once `broken` is set.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: InMemoryStore,
    broken: Arc<AtomicBool>,
}

impl FlakyStore {
    fn refuse(&self) -> Result<(), CacheError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection reset".into()));
        }
        Ok(())
    }
}

impl CacheStore for FlakyStore {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Bytes>> {
        self.inner.get(key)
    }

    fn set<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> CacheFuture<'a, ()> {
        self.inner.set(key, value, ttl)
    }

    fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.refuse()?;
            self.inner.remove(key).await
        })
    }

    fn remove_by_prefix<'a>(&'a self, prefix: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.refuse()?;
            self.inner.remove_by_prefix(prefix).await
        })
    }

    fn clear(&self) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            self.refuse()?;
            self.inner.clear().await
        })
    }
}

async fn flaky_delegator(dir: &tempfile::TempDir, store: FlakyStore) -> Delegator {
    emissary_core::init_tracing(&LogSettings::default());
    let mut delegator = Delegator::builder()
        .data_source(DataSourceSettings::new("main", &sqlite_url(dir, "main.db")))
        .validator(account_rules())
        .cache_store(store)
        .build()
        .unwrap();
    create_schema(&mut delegator).await;
    delegator
}

#[tokio::test]
async fn failed_invalidation_keeps_the_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlakyStore::default();
    let mut d = flaky_delegator(&dir, store.clone()).await;
    store.broken.store(true, Ordering::SeqCst);

    let err = d.save(&mut Account::new("alice", 10.0)).await.unwrap_err();
    match err {
        DataError::CacheInconsistency { ref context, .. } => {
            assert_eq!(context, "commit on main");
        }
        other => panic!("expected a cache inconsistency, got {other:?}"),
    }

    assert_eq!(d.count_by_and::<Account>(&AndMap::new()).await.unwrap(), 1);
    assert_eq!(
        d.transaction_status(),
        emissary_data_sqlx::TransactionStatus::Inactive
    );
}

#[tokio::test]
async fn failed_invalidation_after_explicit_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlakyStore::default();
    let mut d = flaky_delegator(&dir, store.clone()).await;
    store.broken.store(true, Ordering::SeqCst);

    d.begin_transaction().await.unwrap();
    d.save(&mut Account::new("alice", 10.0)).await.unwrap();
    d.save(&mut Account::new("bob", 20.0)).await.unwrap();
    assert!(matches!(
        d.commit_transaction().await,
        Err(DataError::CacheInconsistency { .. })
    ));
    d.end_transaction().await;

    store.broken.store(false, Ordering::SeqCst);
    assert_eq!(d.count_by_and::<Account>(&AndMap::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn failed_invalidation_after_raw_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlakyStore::default();
    let mut d = flaky_delegator(&dir, store.clone()).await;
    store.broken.store(true, Ordering::SeqCst);

    let err = d
        .execute_by_raw_sql(
            "INSERT INTO accounts (owner, balance, status) VALUES (?, ?, ?)",
            &["carol".into(), 3.0.into(), "open".into()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::CacheInconsistency { .. }));
    assert_eq!(d.count_by_and::<Account>(&AndMap::new()).await.unwrap(), 1);
}
