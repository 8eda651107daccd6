use std::sync::Arc;
use std::time::Duration;

use emissary_cache::{CacheStore, EntityCache, InMemoryStore};
use emissary_core::config::settings::DEFAULT_CACHE_TTL;
use emissary_core::{DataSourceSettings, DelegatorSettings, EmissaryConfig};
use emissary_data::validation::NoValidation;
use emissary_data::{Dialect, Validate};
use sqlx::AnyPool;

use crate::datasource::{DataSource, DataSources};
use crate::delegator::{Delegator, Shared};
use crate::error::BuildError;

/// Assembles a [`Delegator`] from data sources, a cache store and a validator.
///
/// ```ignore
/// let delegator = Delegator::builder()
///     .data_source(DataSourceSettings::new("main", "sqlite://app.db?mode=rwc"))
///     .cache_ttl(Duration::from_secs(60))
///     .validator(rules)
///     .build()?;
/// ```
pub struct DelegatorBuilder {
    primary: Option<String>,
    settings: Vec<DataSourceSettings>,
    pools: Vec<DataSource>,
    store: Option<Arc<dyn CacheStore>>,
    cache_ttl: Duration,
    validator: Arc<dyn Validate>,
}

impl Default for DelegatorBuilder {
    fn default() -> Self {
        Self {
            primary: None,
            settings: Vec::new(),
            pools: Vec::new(),
            store: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            validator: Arc::new(NoValidation),
        }
    }
}

impl DelegatorBuilder {
    /// Register a data source connected lazily from settings.
    pub fn data_source(mut self, settings: DataSourceSettings) -> Self {
        self.settings.push(settings);
        self
    }

    /// Register an already built pool.
    pub fn pool(mut self, name: &str, pool: AnyPool, dialect: Dialect) -> Self {
        self.pools.push(DataSource::new(name, pool, dialect));
        self
    }

    /// Name of the data source new delegators bind to.
    /// Defaults to the first registered one.
    pub fn primary(mut self, name: &str) -> Self {
        self.primary = Some(name.to_string());
        self
    }

    /// Apply typed settings: every data source, the primary and the cache TTL.
    pub fn settings(mut self, settings: &DelegatorSettings) -> Self {
        self.primary = Some(settings.primary.clone());
        self.settings.extend(settings.data_sources.iter().cloned());
        self.cache_ttl = settings.cache.ttl;
        self
    }

    pub fn cache_store(mut self, store: impl CacheStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn validator(mut self, validator: impl Validate + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn build(self) -> Result<Delegator, BuildError> {
        let primary = self
            .primary
            .or_else(|| self.settings.first().map(|s| s.name.clone()))
            .or_else(|| self.pools.first().map(|p| p.name().to_string()))
            .ok_or(BuildError::NoDataSource)?;

        let mut sources = DataSources::new(&primary);
        for settings in &self.settings {
            sources.insert(DataSource::connect_lazy(settings)?);
        }
        for pool in self.pools {
            sources.insert(pool);
        }
        let source = sources
            .primary()
            .map_err(|_| BuildError::UnknownPrimary(primary.clone()))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()) as Arc<dyn CacheStore>);
        let shared = Shared {
            sources,
            cache: EntityCache::from_arc(store, self.cache_ttl),
            validator: self.validator,
        };
        Ok(Delegator::new(Arc::new(shared), source))
    }
}

impl Delegator {
    pub fn builder() -> DelegatorBuilder {
        DelegatorBuilder::default()
    }

    /// Build from the `emissary.*` keys of a loaded configuration.
    pub fn from_config(config: &EmissaryConfig) -> Result<Self, BuildError> {
        let settings = DelegatorSettings::from_config(config)?;
        Self::builder().settings(&settings).build()
    }
}
