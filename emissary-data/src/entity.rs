use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DataError;
use crate::value::{Row, Value};

/// How an entity's identity is produced on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdGeneration {
    /// The caller sets the id before `save`.
    #[default]
    Assigned,
    /// The store generates it; `save` writes it back via [`Entity::assign_generated_id`].
    Generated,
}

/// A persistent type mapped to one table.
///
/// Implemented manually per type. The delegator only talks to entities
/// through this trait and [`Row`], never by inspecting fields.
///
/// # Example
///
/// ```
/// use emissary_data::{DataError, Entity, IdGeneration, Identity, Row, Value};
///
/// #[derive(Default)]
/// struct Account { id: i64, owner: String }
///
/// impl Entity for Account {
///     fn table_name() -> &'static str { "accounts" }
///     fn id_columns() -> &'static [&'static str] { &["id"] }
///     fn columns() -> &'static [&'static str] { &["id", "owner"] }
///     fn id_generation() -> IdGeneration { IdGeneration::Generated }
///     fn id(&self) -> Identity { Identity::from(self.id) }
///     fn assign_generated_id(&mut self, id: Value) -> Result<(), DataError> {
///         self.id = emissary_data::FromValue::from_value(&id)
///             .map_err(|e| DataError::mapping("accounts", e))?;
///         Ok(())
///     }
///     fn to_row(&self) -> Row {
///         Row::new().with("id", self.id).with("owner", self.owner.as_str())
///     }
///     fn from_row(row: &Row) -> Result<Self, DataError> {
///         Ok(Account { id: row.try_get("id")?, owner: row.get_or_default("owner")? })
///     }
/// }
/// ```
pub trait Entity: Send + Sync + Unpin + Sized + 'static {
    fn table_name() -> &'static str;

    /// One entry per identity column, in key order.
    fn id_columns() -> &'static [&'static str];

    /// All mapped columns, identity columns included.
    fn columns() -> &'static [&'static str];

    fn id_generation() -> IdGeneration {
        IdGeneration::Assigned
    }

    fn id(&self) -> Identity;

    /// Called after insert with the store-generated key.
    fn assign_generated_id(&mut self, _id: Value) -> Result<(), DataError> {
        Ok(())
    }

    fn to_row(&self) -> Row;

    /// Build an entity from a row, which may be a projection missing some columns.
    fn from_row(row: &Row) -> Result<Self, DataError>;
}

/// The ordered values of an entity's id columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity(Vec<Value>);

impl Identity {
    pub fn new(values: Vec<Value>) -> Self {
        Identity(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    /// Pair each value with its column, failing when arity does not match `E`.
    pub fn bind_to<E: Entity>(&self) -> Result<Vec<(&'static str, Value)>, DataError> {
        let columns = E::id_columns();
        if columns.len() != self.0.len() {
            return Err(DataError::InvalidQuery(format!(
                "{} has {} id column(s), identity {self} has {}",
                E::table_name(),
                columns.len(),
                self.0.len()
            )));
        }
        if let Some(idx) = self.0.iter().position(Value::is_null) {
            return Err(DataError::InvalidQuery(format!(
                "{} identity column '{}' is null",
                E::table_name(),
                columns[idx]
            )));
        }
        Ok(columns.iter().copied().zip(self.0.iter().cloned()).collect())
    }

    /// Read the identity columns of `E` out of a row.
    pub fn from_row<E: Entity>(row: &Row) -> Result<Self, DataError> {
        E::id_columns()
            .iter()
            .map(|col| {
                row.get(col).cloned().ok_or_else(|| {
                    DataError::mapping(E::table_name(), format!("missing id column '{col}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Identity)
    }
}

/// Canonical form: values joined with `|`. Used as the point cache key.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Value::canonical).collect();
        f.write_str(&parts.join("|"))
    }
}

impl From<Value> for Identity {
    fn from(v: Value) -> Self {
        Identity(vec![v])
    }
}

impl From<Vec<Value>> for Identity {
    fn from(v: Vec<Value>) -> Self {
        Identity(v)
    }
}

impl From<i64> for Identity {
    fn from(v: i64) -> Self {
        Identity(vec![Value::Int(v)])
    }
}

impl From<i32> for Identity {
    fn from(v: i32) -> Self {
        Identity(vec![Value::Int(v.into())])
    }
}

impl From<&str> for Identity {
    fn from(v: &str) -> Self {
        Identity(vec![Value::from(v)])
    }
}

impl From<String> for Identity {
    fn from(v: String) -> Self {
        Identity(vec![Value::Text(v)])
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Identity {
    fn from((a, b): (A, B)) -> Self {
        Identity(vec![a.into(), b.into()])
    }
}
