//! The [`Delegator`] facade: plumbing, transaction boundaries and mutations.
//!
//! Finders live in `finder.rs` and raw SQL in `raw.rs`; both are further
//! `impl Delegator` blocks over the helpers defined here.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use emissary_cache::{EntityCache, EpochStamp};
use emissary_data::{
    DataError, Dialect, Entity, IdGeneration, Identity, Row, Statement, Validate, ValidateProfile,
    Value,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::any::AnyQueryResult;
use sqlx::pool::PoolConnection;
use sqlx::Any;

use crate::bind;
use crate::datasource::{DataSource, DataSources};
use crate::error::SqlxErrorExt;
use crate::tx::{Invalidation, TransactionStatus, TxContext};

/// Future returned by the closure given to [`Delegator::execute_within_tx`].
pub type TxFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// State shared by every handle built from the same builder.
pub(crate) struct Shared {
    pub(crate) sources: DataSources,
    pub(crate) cache: EntityCache,
    pub(crate) validator: Arc<dyn Validate>,
}

/// Single access point for persisting and querying entities.
///
/// A `Delegator` is bound to one data source and owns one transaction
/// context, which is why every operation takes `&mut self`. Concurrent tasks
/// each take their own handle via [`Delegator::handle`]; handles share pools,
/// cache and validator but never a transaction.
pub struct Delegator {
    pub(crate) shared: Arc<Shared>,
    pub(crate) source: Arc<DataSource>,
    pub(crate) tx: TxContext,
}

/// Result of consulting the cache before a read.
pub(crate) enum Lookup<T> {
    Hit(T),
    /// Not cached; fill with the slot once the store answered.
    Miss(Slot),
    /// Caching disabled for this read.
    Bypass,
}

pub(crate) struct Slot {
    key: String,
    stamp: EpochStamp,
}

impl Delegator {
    pub(crate) fn new(shared: Arc<Shared>, source: Arc<DataSource>) -> Self {
        Self {
            shared,
            source,
            tx: TxContext::new(),
        }
    }

    /// A fresh handle on the same data source with its own transaction context.
    pub fn handle(&self) -> Delegator {
        Delegator::new(self.shared.clone(), self.source.clone())
    }

    /// A fresh handle bound to another registered data source.
    pub fn use_data_source(&self, name: &str) -> Result<Delegator, DataError> {
        let source = self.shared.sources.get(name)?;
        Ok(Delegator::new(self.shared.clone(), source))
    }

    pub fn data_source(&self) -> &str {
        self.source.name()
    }

    pub fn data_source_names(&self) -> Vec<&str> {
        self.shared.sources.names()
    }

    pub fn dialect(&self) -> Dialect {
        self.source.dialect()
    }

    pub fn cache(&self) -> &EntityCache {
        &self.shared.cache
    }

    /// A raw pooled connection, independent of this handle's transaction.
    pub fn get_connection(
        &self,
    ) -> impl Future<Output = Result<PoolConnection<Any>, DataError>> + Send + 'static {
        let source = self.source.clone();
        async move { source.acquire().await }
    }

    /// Close every pool. Handles built from this delegator stop working.
    pub fn close(&self) -> impl Future<Output = ()> + Send + 'static {
        let shared = self.shared.clone();
        async move { shared.sources.close().await }
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.tx.status()
    }

    pub fn transaction_depth(&self) -> u32 {
        self.tx.depth()
    }

    pub async fn begin_transaction(&mut self) -> Result<(), DataError> {
        self.tx.begin(&self.source).await
    }

    /// Commit the outermost scope and flush the invalidations it queued.
    ///
    /// Inner scopes return without doing anything. An invalidation failure
    /// leaves the data committed and reports [`DataError::CacheInconsistency`].
    pub async fn commit_transaction(&mut self) -> Result<(), DataError> {
        match self.tx.commit(self.source.name()).await? {
            Some(pending) => self.flush(pending, "commit").await,
            None => Ok(()),
        }
    }

    pub async fn rollback(&mut self) -> Result<(), DataError> {
        self.tx.rollback(self.source.name()).await
    }

    pub async fn end_transaction(&mut self) {
        self.tx.end(self.source.name()).await
    }

    /// Run `work` inside a transaction scope.
    ///
    /// Commits when `work` succeeds, rolls back and returns the original
    /// error when it fails, and always closes the scope. The closure receives
    /// this delegator and returns a boxed future; values it needs are moved in
    /// and returned through `T`.
    ///
    /// ```ignore
    /// let saved = delegator
    ///     .execute_within_tx(|d| Box::pin(async move {
    ///         let mut account = account;
    ///         d.save(&mut account).await?;
    ///         Ok::<_, DataError>(account)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn execute_within_tx<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Delegator) -> TxFuture<'c, T, E>,
        E: From<DataError>,
    {
        if let Err(err) = self.begin_transaction().await {
            self.end_transaction().await;
            return Err(err.into());
        }
        let outcome = match work(&mut *self).await {
            Ok(value) => self.commit_transaction().await.map(|()| value).map_err(E::from),
            Err(err) => {
                if let Err(rollback) = self.rollback().await {
                    tracing::warn!(
                        data_source = self.source.name(),
                        error = %rollback,
                        "rollback after failed unit of work did not complete"
                    );
                }
                Err(err)
            }
        };
        self.end_transaction().await;
        outcome
    }

    /// Insert, assigning generated ids. See [`Delegator::save_all`].
    pub async fn save<E: Entity>(&mut self, entity: &mut E) -> Result<(), DataError> {
        self.save_all(std::slice::from_mut(entity)).await
    }

    /// Validate every entity, then insert them all in one transaction.
    ///
    /// Any violation fails the whole batch before a single row is written.
    pub async fn save_all<E: Entity>(&mut self, entities: &mut [E]) -> Result<(), DataError> {
        self.tx.ensure_usable()?;
        self.check(entities.iter(), ValidateProfile::Create)?;
        if entities.is_empty() {
            return Ok(());
        }
        let implicit = self.open_implicit().await?;
        let result = self.insert_each(entities).await;
        self.settle(implicit, result).await
    }

    /// Update by identity; zero matched rows is [`DataError::NotFound`].
    pub async fn update<E: Entity>(&mut self, entity: &E) -> Result<(), DataError> {
        self.tx.ensure_usable()?;
        self.check(std::iter::once(entity), ValidateProfile::Update)?;
        let implicit = self.open_implicit().await?;
        let result = self
            .update_each(std::slice::from_ref(entity), true)
            .await
            .map(|_| ());
        self.settle(implicit, result).await
    }

    /// Update a batch atomically, returning the total number of matched rows.
    pub async fn update_all<E: Entity>(&mut self, entities: &[E]) -> Result<u64, DataError> {
        self.tx.ensure_usable()?;
        self.check(entities.iter(), ValidateProfile::Update)?;
        if entities.is_empty() {
            return Ok(0);
        }
        let implicit = self.open_implicit().await?;
        let result = self.update_each(entities, false).await;
        self.settle(implicit, result).await
    }

    /// Delete by identity. Removing a missing row is not an error.
    pub async fn remove<E: Entity>(&mut self, entity: &E) -> Result<u64, DataError> {
        self.remove_ids::<E>(vec![entity.id()]).await
    }

    pub async fn remove_all<E: Entity>(&mut self, entities: &[E]) -> Result<u64, DataError> {
        self.remove_ids::<E>(entities.iter().map(Entity::id).collect())
            .await
    }

    pub async fn remove_by_id<E: Entity>(
        &mut self,
        id: impl Into<Identity>,
    ) -> Result<u64, DataError> {
        self.remove_ids::<E>(vec![id.into()]).await
    }

    async fn insert_each<E: Entity>(&mut self, entities: &mut [E]) -> Result<(), DataError> {
        let context = self.context("insert into", E::table_name());
        for entity in entities.iter_mut() {
            let plan = self.source.translator().insert::<E>(&entity.to_row())?;
            if plan.returns_id {
                let rows = self.fetch_all(&plan.statement, &context).await?;
                let id = rows
                    .first()
                    .and_then(|row| row.iter().next().map(|(_, v)| v.clone()))
                    .ok_or_else(|| {
                        DataError::mapping(E::table_name(), "insert returned no generated id")
                    })?;
                entity.assign_generated_id(id)?;
            } else {
                let done = self.execute(&plan.statement, &context).await?;
                if E::id_generation() == IdGeneration::Generated {
                    let id = done.last_insert_id().ok_or_else(|| {
                        DataError::mapping(E::table_name(), "driver reported no generated id")
                    })?;
                    entity.assign_generated_id(Value::Int(id))?;
                }
            }
        }
        self.tx
            .queue(Invalidation::Class(E::table_name().to_string()));
        Ok(())
    }

    async fn update_each<E: Entity>(
        &mut self,
        entities: &[E],
        require_match: bool,
    ) -> Result<u64, DataError> {
        let context = self.context("update", E::table_name());
        let mut matched = 0;
        for entity in entities {
            let id = entity.id();
            let stmt = self.source.translator().update::<E>(&id, &entity.to_row())?;
            let affected = self.execute(&stmt, &context).await?.rows_affected();
            if affected == 0 && require_match {
                return Err(DataError::not_found(E::table_name(), &id));
            }
            matched += affected;
            self.queue_point::<E>(&id);
        }
        self.tx
            .queue(Invalidation::Class(E::table_name().to_string()));
        Ok(matched)
    }

    async fn remove_ids<E: Entity>(&mut self, ids: Vec<Identity>) -> Result<u64, DataError> {
        self.tx.ensure_usable()?;
        let statements = ids
            .iter()
            .map(|id| self.source.translator().delete_by_id::<E>(id))
            .collect::<Result<Vec<_>, _>>()?;
        if statements.is_empty() {
            return Ok(0);
        }
        let implicit = self.open_implicit().await?;
        let result = self.delete_each::<E>(&ids, &statements).await;
        self.settle(implicit, result).await
    }

    async fn delete_each<E: Entity>(
        &mut self,
        ids: &[Identity],
        statements: &[Statement],
    ) -> Result<u64, DataError> {
        let context = self.context("delete from", E::table_name());
        let mut removed = 0;
        for (id, stmt) in ids.iter().zip(statements) {
            removed += self.execute(stmt, &context).await?.rows_affected();
            self.queue_point::<E>(id);
        }
        self.tx
            .queue(Invalidation::Class(E::table_name().to_string()));
        Ok(removed)
    }

    fn queue_point<E: Entity>(&mut self, id: &Identity) {
        let key = EntityCache::point_key(self.source.name(), E::table_name(), &id.to_string());
        self.tx.queue(Invalidation::Key(key));
    }

    pub(crate) fn queue_invalidation(&mut self, invalidation: Invalidation) {
        self.tx.queue(invalidation);
    }

    fn check<'a, E: Entity>(
        &self,
        entities: impl Iterator<Item = &'a E>,
        profile: ValidateProfile,
    ) -> Result<(), DataError> {
        let mut violations = Vec::new();
        for entity in entities {
            violations.extend(
                self.shared
                    .validator
                    .validate(E::table_name(), &entity.to_row(), profile),
            );
        }
        if violations.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            entity = E::table_name(),
            violations = violations.len(),
            "validation rejected write"
        );
        Err(DataError::Validation {
            entity: E::table_name().to_string(),
            violations,
        })
    }

    /// Begin a transaction if none is open. Returns whether this call opened it.
    pub(crate) async fn open_implicit(&mut self) -> Result<bool, DataError> {
        self.tx.ensure_usable()?;
        if self.tx.is_active() {
            return Ok(false);
        }
        self.begin_transaction().await?;
        Ok(true)
    }

    /// Close a transaction opened by [`Self::open_implicit`]: commit on success,
    /// roll back on failure.
    pub(crate) async fn settle<T>(
        &mut self,
        implicit: bool,
        result: Result<T, DataError>,
    ) -> Result<T, DataError> {
        if !implicit {
            return result;
        }
        let result = match result {
            Ok(value) => self.commit_transaction().await.map(|()| value),
            Err(err) => {
                if let Err(rollback) = self.rollback().await {
                    tracing::warn!(
                        data_source = self.source.name(),
                        error = %rollback,
                        "implicit rollback failed"
                    );
                }
                Err(err)
            }
        };
        self.end_transaction().await;
        result
    }

    async fn flush(
        &mut self,
        pending: Vec<Invalidation>,
        operation: &str,
    ) -> Result<(), DataError> {
        let data_source = self.source.name();
        let cache = &self.shared.cache;
        let mut failure = None;
        for invalidation in &pending {
            let outcome = match invalidation {
                Invalidation::Key(key) => cache.invalidate_key(data_source, key).await,
                Invalidation::Class(table) => cache.invalidate_class(data_source, table).await,
                Invalidation::DataSource => cache.invalidate_data_source(data_source).await,
            };
            if let Err(err) = outcome {
                tracing::error!(
                    data_source,
                    ?invalidation,
                    error = %err,
                    "cache invalidation failed after commit"
                );
                failure.get_or_insert(err);
            }
        }
        match failure {
            Some(source) => Err(DataError::CacheInconsistency {
                context: format!("{operation} on {data_source}"),
                source,
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn context(&self, operation: &str, target: &str) -> String {
        format!("{operation} {target} on {}", self.source.name())
    }

    /// Run a statement on the bound connection, or the pool when no transaction is open.
    pub(crate) async fn fetch_all(
        &mut self,
        stmt: &Statement,
        context: &str,
    ) -> Result<Vec<Row>, DataError> {
        tracing::debug!(
            data_source = self.source.name(),
            sql = %stmt.sql,
            params = stmt.params.len(),
            in_transaction = self.tx.is_active(),
            "query"
        );
        let query = bind::bind_all(&stmt.sql, &stmt.params);
        let rows = match self.tx.connection() {
            Some(conn) => query.fetch_all(conn).await,
            None => query.fetch_all(self.source.pool()).await,
        }
        .map_err(|e| e.into_data_error(context))?;
        bind::decode_rows(&rows).map_err(|e| e.into_data_error(context))
    }

    pub(crate) async fn execute(
        &mut self,
        stmt: &Statement,
        context: &str,
    ) -> Result<AnyQueryResult, DataError> {
        tracing::debug!(
            data_source = self.source.name(),
            sql = %stmt.sql,
            params = stmt.params.len(),
            in_transaction = self.tx.is_active(),
            "execute"
        );
        let query = bind::bind_all(&stmt.sql, &stmt.params);
        match self.tx.connection() {
            Some(conn) => query.execute(conn).await,
            None => query.execute(self.source.pool()).await,
        }
        .map_err(|e| e.into_data_error(context))
    }

    /// Consult the cache. Reads inside an open transaction never touch it.
    pub(crate) async fn lookup<T: DeserializeOwned>(
        &mut self,
        use_cache: bool,
        key: String,
    ) -> Lookup<T> {
        if !use_cache || self.tx.is_active() {
            return Lookup::Bypass;
        }
        let stamp = self.shared.cache.stamp(self.source.name());
        if let Some(bytes) = self.shared.cache.get(&key).await {
            match serde_json::from_slice(&bytes) {
                Ok(value) => return Lookup::Hit(value),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "discarding undecodable cache entry");
                }
            }
        }
        Lookup::Miss(Slot { key, stamp })
    }

    pub(crate) async fn fill<T: Serialize>(&mut self, slot: Option<Slot>, value: &T) {
        let Some(slot) = slot else {
            return;
        };
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.shared
                    .cache
                    .put(self.source.name(), &slot.key, Bytes::from(bytes), slot.stamp)
                    .await;
            }
            Err(err) => {
                tracing::warn!(key = %slot.key, error = %err, "cannot serialise cache entry");
            }
        }
    }
}

impl fmt::Debug for Delegator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegator")
            .field("data_source", &self.source.name())
            .field("dialect", &self.source.dialect())
            .field("tx", &self.tx)
            .finish_non_exhaustive()
    }
}
