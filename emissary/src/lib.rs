//! Emissary, a generic entity delegator.
//!
//! This facade crate re-exports the Emissary sub-crates through a single
//! dependency. Import everything you need with:
//!
//! ```ignore
//! use emissary::prelude::*;
//! ```
//!
//! # Crates
//!
//! | Crate                | Contents |
//! |----------------------|----------|
//! | `emissary-core`      | Layered configuration, delegator settings, tracing setup |
//! | `emissary-cache`     | Cache store capability and the epoch-guarded `EntityCache` |
//! | `emissary-data`      | `Entity`, values, criteria, SQL translation, paging, validation, errors |
//! | `emissary-data-sqlx` | The `Delegator` over `sqlx::Any` |
//!
//! # Feature flags
//!
//! | Feature    | Default | Enables                        |
//! |------------|---------|--------------------------------|
//! | `sqlite`   | no      | `emissary-data-sqlx/sqlite`    |
//! | `postgres` | no      | `emissary-data-sqlx/postgres`  |
//! | `mysql`    | no      | `emissary-data-sqlx/mysql`     |

pub use emissary_cache;
pub use emissary_core;
pub use emissary_data;
pub use emissary_data_sqlx;

pub use emissary_core::{init_tracing, EmissaryConfig};
pub use emissary_data::DataError;
pub use emissary_data_sqlx::{BuildError, Delegator, DelegatorBuilder};

/// Unified prelude: import everything with `use emissary::prelude::*`.
pub mod prelude {
    pub use emissary_cache::{CacheStore, EntityCache, InMemoryStore};
    pub use emissary_core::{DelegatorSettings, EmissaryConfig};
    pub use emissary_data::validation::{
        DecimalMax, DecimalMin, MaxLength, MinLength, NotBlank, NotNull,
    };
    pub use emissary_data::{ValidateProfile, ValidatorRegistry};
    pub use emissary_data_sqlx::prelude::*;
}
