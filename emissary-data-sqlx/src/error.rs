use emissary_core::ConfigError;
use emissary_data::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// The orphan rule rules out `From<sqlx::Error> for DataError` here, and a
/// bare conversion would lose which operation failed anyway.
pub trait SqlxErrorExt {
    fn into_data_error(self, context: impl Into<String>) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self, context: impl Into<String>) -> DataError {
        DataError::store(context, self)
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;

/// Failure while assembling a [`Delegator`](crate::Delegator).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot set up data source '{name}': {source}")]
    Connect {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("no data source registered")]
    NoDataSource,

    #[error("no data source registered under '{0}'")]
    UnknownPrimary(String),

    #[error(transparent)]
    Data(#[from] DataError),
}
