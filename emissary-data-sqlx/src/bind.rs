//! Mapping between [`Value`]s and the `sqlx::Any` driver.

use emissary_data::{Row, Value};
use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

pub(crate) type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Prepare `sql` with every parameter bound in order.
pub(crate) fn bind_all<'q>(sql: &'q str, params: &[Value]) -> AnyQuery<'q> {
    params
        .iter()
        .cloned()
        .fold(sqlx::query(sql), bind_value)
}

fn bind_value(query: AnyQuery<'_>, value: Value) -> AnyQuery<'_> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Int(i) => query.bind(i),
        Value::Float(f) => query.bind(f),
        Value::Text(s) => query.bind(s),
        Value::Bytes(b) => query.bind(b),
    }
}

pub(crate) fn decode_row(row: &AnyRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal())?;
        out.insert(column.name(), value);
    }
    Ok(out)
}

pub(crate) fn decode_rows(rows: &[AnyRow]) -> Result<Vec<Row>, sqlx::Error> {
    rows.iter().map(decode_row).collect()
}

fn decode_column(row: &AnyRow, idx: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get(idx)?),
        "SMALLINT" => Value::Int(row.try_get::<i16, _>(idx)?.into()),
        "INTEGER" => Value::Int(row.try_get::<i32, _>(idx)?.into()),
        "BIGINT" => Value::Int(row.try_get(idx)?),
        "REAL" => Value::Float(row.try_get::<f32, _>(idx)?.into()),
        "DOUBLE" => Value::Float(row.try_get(idx)?),
        "TEXT" => Value::Text(row.try_get(idx)?),
        "BLOB" => Value::Bytes(row.try_get(idx)?),
        other => {
            return Err(sqlx::Error::ColumnDecode {
                index: idx.to_string(),
                source: format!("unsupported column type {other}").into(),
            })
        }
    };
    Ok(value)
}
