use emissary_cache::CacheError;

use crate::validation::ConstraintViolation;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// One or more constraints rejected an entity; nothing was written.
    #[error("validation failed for '{entity}': {}", summarize(.violations))]
    Validation {
        entity: String,
        violations: Vec<ConstraintViolation>,
    },

    #[error("{entity} not found for identity {identity}")]
    NotFound { entity: String, identity: String },

    #[error("expected at most one {entity}, found {count}")]
    NonUniqueResult { entity: String, count: u64 },

    /// Transaction call made in a state that does not allow it.
    #[error("illegal transaction state: {0}")]
    TransactionState(String),

    #[error("store error during {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: BoxError,
    },

    /// The store mutation succeeded but its cache invalidation did not.
    #[error("cache inconsistency after {context}: {source}")]
    CacheInconsistency {
        context: String,
        #[source]
        source: CacheError,
    },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("cannot map {entity}: {message}")]
    Mapping { entity: String, message: String },

    #[error("unknown data source '{0}'")]
    UnknownDataSource(String),
}

impl DataError {
    /// Wrap a backend error, naming the operation it happened in.
    pub fn store(
        context: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DataError::Store {
            context: context.into(),
            source: Box::new(err),
        }
    }

    pub fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::Mapping {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, identity: impl ToString) -> Self {
        DataError::NotFound {
            entity: entity.into(),
            identity: identity.to_string(),
        }
    }

    pub fn transaction_state(message: impl Into<String>) -> Self {
        DataError::TransactionState(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound { .. })
    }

    pub fn violations(&self) -> &[ConstraintViolation] {
        match self {
            DataError::Validation { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[ConstraintViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field_name, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}
