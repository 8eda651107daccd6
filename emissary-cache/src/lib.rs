//! # emissary-cache
//!
//! The cache capability consumed by the delegator.
//!
//! - [`CacheStore`]: async, fallible key/value backend ([`InMemoryStore`] by default)
//! - [`EntityCache`]: entity key scheme, hit/miss statistics and epoch-guarded fills

mod entity_cache;
mod store;

pub use entity_cache::{CacheStats, EntityCache, EpochStamp};
pub use store::{CacheError, CacheFuture, CacheStore, InMemoryStore};
