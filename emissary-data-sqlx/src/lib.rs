//! # emissary-data-sqlx — SQLx backend for Emissary
//!
//! This crate runs the backend-agnostic model of [`emissary-data`] against
//! real databases through `sqlx::Any`. It owns the connection pools, the
//! per-handle transaction context and the cache glue, all behind one
//! [`Delegator`] façade.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Delegator`] | Mutations, finders, raw SQL and transaction boundaries for one data source |
//! | [`DelegatorBuilder`] | Assembles a delegator from data sources, a cache store and a validator |
//! | [`DataSources`] / [`DataSource`] | Named pools, each with the dialect its SQL is rendered in |
//! | [`TransactionStatus`] | Observable state of a handle's transaction |
//! | [`TxFuture`] | Boxed future returned by [`Delegator::execute_within_tx`] closures |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error(ctx)`) |
//! | [`BuildError`] | Failure while building a delegator |
//!
//! # Feature flags
//!
//! Enable the drivers you connect to:
//!
//! | Feature    | Driver |
//! |------------|--------|
//! | `sqlite`   | SQLite via `sqlx/sqlite` |
//! | `postgres` | PostgreSQL via `sqlx/postgres` |
//! | `mysql`    | MySQL via `sqlx/mysql` |
//!
//! # Quick start
//!
//! ```ignore
//! use emissary_data_sqlx::prelude::*;
//!
//! let mut delegator = Delegator::builder()
//!     .data_source(DataSourceSettings::new("main", "sqlite://app.db?mode=rwc"))
//!     .build()?;
//!
//! let mut account = Account::new("alice", 10.0);
//! delegator.save(&mut account).await?;
//!
//! let open = delegator
//!     .find_page_by_and::<Account>(&AndMap::new().with("status", "open"), PageRequest::new(1, 20))
//!     .await?;
//! ```
//!
//! # Transactions
//!
//! Each handle owns one transaction context. Scopes nest: only the outermost
//! `commit_transaction` commits, and a `rollback` at any depth dooms the
//! whole transaction. Every `begin_transaction` must be paired with an
//! `end_transaction`, or use [`Delegator::execute_within_tx`] which pairs them.
//! Writes outside an explicit transaction run in an implicit one.
//!
//! Concurrent tasks take their own handle with [`Delegator::handle`].
//!
//! # Caching
//!
//! Reads opt in through `FindOptions::use_cache` (or the `use_cache` flag).
//! Writes queue invalidations that are flushed right after the physical
//! commit; reads inside an open transaction never touch the cache.

mod bind;
pub mod builder;
pub mod datasource;
pub mod delegator;
pub mod error;
mod finder;
mod raw;
pub mod tx;

pub use builder::DelegatorBuilder;
pub use datasource::{DataSource, DataSources};
pub use delegator::{Delegator, TxFuture};
pub use error::{BuildError, SqlxErrorExt, SqlxResult};
pub use tx::TransactionStatus;

/// Re-exports of the most commonly used types from `emissary-data` and this crate.
pub mod prelude {
    pub use crate::{Delegator, DelegatorBuilder, SqlxErrorExt, TransactionStatus, TxFuture};
    pub use emissary_core::DataSourceSettings;
    pub use emissary_data::prelude::*;
}
