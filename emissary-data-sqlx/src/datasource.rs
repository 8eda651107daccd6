//! Named connection pools.

use std::collections::HashMap;
use std::sync::Arc;

use emissary_core::DataSourceSettings;
use emissary_data::{DataError, Dialect, Translator};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use sqlx::pool::PoolConnection;
use sqlx::Any;

use crate::error::{BuildError, SqlxErrorExt};

/// One pool plus the dialect its SQL is rendered in.
#[derive(Debug)]
pub struct DataSource {
    name: String,
    pool: AnyPool,
    translator: Translator,
}

impl DataSource {
    pub fn new(name: &str, pool: AnyPool, dialect: Dialect) -> Self {
        Self {
            name: name.to_string(),
            pool,
            translator: Translator::new(dialect),
        }
    }

    /// Build a lazily connecting pool; no connection is opened until first use.
    pub fn connect_lazy(settings: &DataSourceSettings) -> Result<Self, BuildError> {
        sqlx::any::install_default_drivers();
        let dialect = match settings.dialect.as_deref() {
            Some(name) => name.parse()?,
            None => Dialect::from_url(&settings.url),
        };
        let pool = AnyPoolOptions::new()
            .max_connections(settings.pool_size)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy(&settings.url)
            .map_err(|source| BuildError::Connect {
                name: settings.name.clone(),
                source,
            })?;
        tracing::info!(
            data_source = %settings.name,
            %dialect,
            pool_size = settings.pool_size,
            "registered data source"
        );
        Ok(Self::new(&settings.name, pool, dialect))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.translator.dialect()
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Any>, DataError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| e.into_data_error(format!("acquire connection from {}", self.name)))
    }
}

/// Registry of data sources by name, with one designated primary.
#[derive(Debug)]
pub struct DataSources {
    primary: String,
    sources: HashMap<String, Arc<DataSource>>,
}

impl DataSources {
    pub fn new(primary: &str) -> Self {
        Self {
            primary: primary.to_string(),
            sources: HashMap::new(),
        }
    }

    pub fn insert(&mut self, source: DataSource) {
        self.sources
            .insert(source.name().to_string(), Arc::new(source));
    }

    pub fn get(&self, name: &str) -> Result<Arc<DataSource>, DataError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| DataError::UnknownDataSource(name.to_string()))
    }

    pub fn primary(&self) -> Result<Arc<DataSource>, DataError> {
        self.get(&self.primary)
    }

    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Close every pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        for source in self.sources.values() {
            source.pool.close().await;
        }
    }
}
