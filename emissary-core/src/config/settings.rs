//! Typed views over [`EmissaryConfig`](super::EmissaryConfig) used to build a delegator.

use std::time::Duration;

use super::{ConfigError, EmissaryConfig};

pub const DEFAULT_PRIMARY: &str = "main";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Settings for one named data source.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceSettings {
    pub name: String,
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
    /// `generic`, `sqlite`, `postgres` or `mysql`. `None` means infer from the URL.
    pub dialect: Option<String>,
}

impl DataSourceSettings {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            dialect: None,
        }
    }

    fn from_config(config: &EmissaryConfig, name: &str) -> Result<Self, ConfigError> {
        let base = format!("emissary.datasources.{name}");
        let settings = Self {
            name: name.to_string(),
            url: config.get(&format!("{base}.url"))?,
            pool_size: config.get_or(&format!("{base}.pool.size"), DEFAULT_POOL_SIZE)?,
            acquire_timeout: config
                .get_or(&format!("{base}.pool.timeout"), DEFAULT_ACQUIRE_TIMEOUT)?,
            dialect: config.get_or(&format!("{base}.dialect"), None)?,
        };
        if settings.pool_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "{base}.pool.size must be at least 1"
            )));
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// An `EnvFilter` directive such as `info,emissary_data_sqlx=debug`.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

impl LogSettings {
    pub fn from_config(config: &EmissaryConfig) -> Result<Self, ConfigError> {
        let format = match config
            .get_or::<String>("emissary.log.format", "pretty".into())?
            .to_ascii_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "emissary.log.format: unknown format '{other}'"
                )))
            }
        };
        Ok(Self {
            format,
            filter: config.get_or("emissary.log.filter", "info".to_string())?,
        })
    }
}

/// Everything needed to construct a delegator: data sources, primary source and cache.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegatorSettings {
    pub primary: String,
    pub data_sources: Vec<DataSourceSettings>,
    pub cache: CacheSettings,
}

impl DelegatorSettings {
    pub fn from_config(config: &EmissaryConfig) -> Result<Self, ConfigError> {
        let primary: String = config.get_or("emissary.primary", DEFAULT_PRIMARY.to_string())?;
        let data_sources = config
            .keys_with_prefix("emissary.datasources")
            .iter()
            .map(|name| DataSourceSettings::from_config(config, name))
            .collect::<Result<Vec<_>, _>>()?;

        let settings = Self {
            primary,
            data_sources,
            cache: CacheSettings {
                ttl: Duration::from_secs(
                    config.get_or("emissary.cache.ttl", DEFAULT_CACHE_TTL.as_secs())?,
                ),
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_sources.is_empty() {
            return Err(ConfigError::Invalid(
                "no data source declared under emissary.datasources".into(),
            ));
        }
        if !self.data_sources.iter().any(|ds| ds.name == self.primary) {
            return Err(ConfigError::Invalid(format!(
                "primary data source '{}' is not declared",
                self.primary
            )));
        }
        Ok(())
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSourceSettings> {
        self.data_sources.iter().find(|ds| ds.name == name)
    }
}
