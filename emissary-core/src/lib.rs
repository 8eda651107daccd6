//! # emissary-core
//!
//! Ambient runtime shared by the Emissary crates: layered configuration
//! ([`EmissaryConfig`]), the typed settings a delegator is built from
//! ([`DelegatorSettings`]) and tracing initialisation ([`init_tracing`]).

pub mod config;
pub mod logging;

pub use config::{
    CacheSettings, ConfigError, ConfigValue, DataSourceSettings, DelegatorSettings,
    EmissaryConfig, FromConfigValue, LogFormat, LogSettings,
};
pub use logging::init_tracing;
