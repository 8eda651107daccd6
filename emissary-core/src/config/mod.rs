mod loader;
pub mod settings;
pub mod value;

use std::collections::HashMap;
use std::path::Path;

pub use settings::{CacheSettings, DataSourceSettings, DelegatorSettings, LogFormat, LogSettings};
pub use value::{ConfigValue, FromConfigValue};

/// Only environment variables with this prefix are overlaid onto the config.
pub const ENV_PREFIX: &str = "EMISSARY_";

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    #[error("config key not found: {0}")]
    NotFound(String),
    /// The value could not be converted to the requested type.
    #[error("config type mismatch for '{key}': expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    #[error("config load error: {0}")]
    Load(String),
    /// The values parsed fine but do not describe a usable setup.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration loaded from YAML files, `.env` files and environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `emissary.yaml`
/// 2. `emissary-{profile}.yaml`
/// 3. `.env` / `.env.{profile}` (loaded into the process environment)
/// 4. `EMISSARY_*` environment variables (`EMISSARY_CACHE_TTL` -> `emissary.cache.ttl`)
///
/// The profile comes from `EMISSARY_PROFILE`, then the argument, then `"dev"`.
#[derive(Debug, Clone)]
pub struct EmissaryConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl EmissaryConfig {
    /// Load configuration for `profile` from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from_dir(Path::new("."), profile)
    }

    /// Same as [`load`](Self::load) but reads the YAML files from `dir`.
    pub fn load_from_dir(dir: &Path, profile: &str) -> Result<Self, ConfigError> {
        let active_profile = std::env::var("EMISSARY_PROFILE")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| {
                if profile.is_empty() {
                    "dev".to_string()
                } else {
                    profile.to_string()
                }
            });

        let mut values = HashMap::new();
        loader::load_yaml_file(&dir.join("emissary.yaml"), &mut values)?;
        loader::load_yaml_file(
            &dir.join(format!("emissary-{active_profile}.yaml")),
            &mut values,
        )?;

        // .env files never overwrite variables that are already set
        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{active_profile}")));

        loader::overlay_env(std::env::vars(), &mut values);

        tracing::debug!(profile = %active_profile, keys = values.len(), "configuration loaded");
        Ok(EmissaryConfig {
            values,
            profile: active_profile,
        })
    }

    /// Build a config from a YAML string, without touching files or the environment.
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(EmissaryConfig {
            values,
            profile: profile.to_string(),
        })
    }

    pub fn empty() -> Self {
        EmissaryConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Get a typed value for a dot-separated key.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a typed value, falling back to `default` only when the key is absent.
    ///
    /// A present but malformed value is still an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.values.get(key) {
            Some(value) => V::from_config_value(value, key),
            None => Ok(default),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Direct child names under `prefix`, sorted.
    ///
    /// `keys_with_prefix("emissary.datasources")` yields the declared data source names.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let needle = format!("{prefix}.");
        let mut names: Vec<String> = self
            .values
            .keys()
            .filter_map(|k| k.strip_prefix(&needle))
            .filter_map(|rest| rest.split('.').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
emissary:
  primary: main
  datasources:
    main:
      url: "sqlite://main.db"
      pool:
        size: 4
    reporting:
      url: "postgres://localhost/reports"
  cache:
    ttl: 60
"#;

    #[test]
    fn typed_get_and_defaults() {
        let cfg = EmissaryConfig::from_yaml_str(YAML, "test").unwrap();
        assert_eq!(cfg.get::<String>("emissary.primary").unwrap(), "main");
        assert_eq!(cfg.get::<u32>("emissary.datasources.main.pool.size").unwrap(), 4);
        assert_eq!(cfg.get_or::<u32>("emissary.missing", 7).unwrap(), 7);
        assert!(matches!(
            cfg.get::<String>("emissary.nope"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn malformed_value_is_not_masked_by_default() {
        let cfg = EmissaryConfig::from_yaml_str("emissary:\n  cache:\n    ttl: soon\n", "t").unwrap();
        assert!(cfg.get_or::<u64>("emissary.cache.ttl", 5).is_err());
    }

    #[test]
    fn child_names_are_listed_once() {
        let cfg = EmissaryConfig::from_yaml_str(YAML, "test").unwrap();
        assert_eq!(
            cfg.keys_with_prefix("emissary.datasources"),
            vec!["main".to_string(), "reporting".to_string()]
        );
    }
}
