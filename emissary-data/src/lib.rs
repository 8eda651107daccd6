//! # emissary-data
//!
//! Backend-agnostic data model for the delegator: the [`Entity`] mapping
//! trait, dynamic [`Value`]s and [`Row`]s, loose criteria, the SQL
//! [`Translator`], paging, validation and the [`DataError`] taxonomy.

pub mod criteria;
pub mod entity;
pub mod error;
pub mod page;
pub mod query;
pub mod translate;
pub mod validation;
pub mod value;

pub use criteria::{AndMap, Cond, FindOptions, OrderBy};
pub use entity::{Entity, IdGeneration, Identity};
pub use error::DataError;
pub use page::{Page, PageRequest};
pub use query::{Dialect, IdentifierPolicy, QueryBuilder, Statement};
pub use translate::{Criteria, InsertPlan, Translator};
pub use validation::{ConstraintViolation, Validate, ValidateProfile, ValidatorRegistry};
pub use value::{FromValue, Row, Value};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        AndMap, Cond, DataError, Entity, FindOptions, FromValue, IdGeneration, Identity, OrderBy,
        Page, PageRequest, Row, Value,
    };
}
