use std::fmt;
use std::str::FromStr;

use crate::error::DataError;
use crate::value::Value;

/// SQL dialect: placeholder style, identifier quoting and `RETURNING` support.
///
/// # Example
///
/// ```
/// use emissary_data::{Dialect, QueryBuilder};
///
/// let stmt = QueryBuilder::new("users")
///     .dialect(Dialect::Postgres)
///     .where_eq("email", "a@b.com")
///     .order_by("id", true)
///     .limit(10)
///     .build_select(&["id", "email"])
///     .unwrap();
/// assert_eq!(stmt.sql, "SELECT id, email FROM users WHERE email = $1 ORDER BY id ASC LIMIT 10");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    #[default]
    Generic,
    Sqlite,
    /// `?` placeholders with backtick quoting.
    MySql,
    /// `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Dialect {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Dialect::Sqlite,
            "postgres" | "postgresql" => Dialect::Postgres,
            "mysql" | "mariadb" => Dialect::MySql,
            _ => Dialect::Generic,
        }
    }

    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    pub fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    /// Whether generated ids are read back with `INSERT ... RETURNING`.
    pub fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }
}

impl FromStr for Dialect {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(Dialect::Generic),
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(DataError::InvalidQuery(format!("unknown SQL dialect '{other}'"))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Generic => "generic",
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierPolicy {
    /// Do not validate or quote identifiers.
    Raw,
    /// Validate identifiers against a conservative pattern.
    #[default]
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    Quote,
}

/// A rendered statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A fluent SQL builder over [`Value`] parameters.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    conditions: Vec<Condition>,
    order: Vec<(String, bool)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
}

#[derive(Debug, Clone)]
enum Condition {
    Compare(String, &'static str, Value),
    IsNull(String),
    /// Free-form fragment with `?` placeholders.
    Raw(String, Vec<Value>),
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            dialect: Dialect::Generic,
            identifier_policy: IdentifierPolicy::Validate,
        }
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    /// Equality; a `Value::Null` renders as `IS NULL`.
    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => self.conditions.push(Condition::IsNull(column.to_string())),
            v => self.conditions.push(Condition::Compare(column.to_string(), "=", v)),
        }
        self
    }

    /// Append a free-form fragment. Blank fragments are ignored.
    pub fn where_raw(mut self, fragment: &str, params: Vec<Value>) -> Self {
        if !fragment.trim().is_empty() {
            self.conditions
                .push(Condition::Raw(fragment.trim().to_string(), params));
        }
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_val = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_val = Some(offset);
        self
    }

    pub fn build_select(&self, columns: &[&str]) -> Result<Statement, DataError> {
        let table = self.identifier(&self.table, false, "table")?;
        let columns = self.column_list(columns, true)?;
        let mut out = Render::new(self.dialect, format!("SELECT {columns} FROM {table}"));
        self.append_where(&mut out)?;
        self.append_order(&mut out.sql)?;
        if let Some(limit) = self.limit_val {
            out.sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset_val {
            out.sql.push_str(&format!(" OFFSET {offset}"));
        }
        Ok(out.finish())
    }

    pub fn build_count(&self) -> Result<Statement, DataError> {
        let table = self.identifier(&self.table, false, "table")?;
        let mut out = Render::new(self.dialect, format!("SELECT COUNT(*) FROM {table}"));
        self.append_where(&mut out)?;
        Ok(out.finish())
    }

    /// `INSERT`; `returning` appends a `RETURNING` clause on dialects that support it.
    pub fn build_insert(
        &self,
        values: &[(&str, Value)],
        returning: &[&str],
    ) -> Result<Statement, DataError> {
        let table = self.identifier(&self.table, false, "table")?;
        let names: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        let mut out = Render::new(self.dialect, String::new());
        let placeholders: Vec<String> = values
            .iter()
            .map(|(_, v)| out.bind(v.clone()))
            .collect();
        out.sql = if values.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                self.column_list(&names, false)?,
                placeholders.join(", ")
            )
        };
        if !returning.is_empty() && self.dialect.supports_returning() {
            out.sql
                .push_str(&format!(" RETURNING {}", self.column_list(returning, false)?));
        }
        Ok(out.finish())
    }

    /// `UPDATE ... SET` restricted by the builder's conditions.
    pub fn build_update(&self, assignments: &[(&str, Value)]) -> Result<Statement, DataError> {
        if assignments.is_empty() {
            return Err(DataError::InvalidQuery(format!(
                "nothing to update on '{}'",
                self.table
            )));
        }
        let table = self.identifier(&self.table, false, "table")?;
        let mut out = Render::new(self.dialect, String::new());
        let mut sets = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            let column = self.identifier(column, false, "column")?;
            sets.push(format!("{column} = {}", out.bind(value.clone())));
        }
        out.sql = format!("UPDATE {table} SET {}", sets.join(", "));
        self.append_where(&mut out)?;
        Ok(out.finish())
    }

    pub fn build_delete(&self) -> Result<Statement, DataError> {
        let table = self.identifier(&self.table, false, "table")?;
        let mut out = Render::new(self.dialect, format!("DELETE FROM {table}"));
        self.append_where(&mut out)?;
        Ok(out.finish())
    }

    fn append_where(&self, out: &mut Render) -> Result<(), DataError> {
        if self.conditions.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for cond in &self.conditions {
            let clause = match cond {
                Condition::Compare(col, op, val) => {
                    let col = self.identifier(col, false, "column")?;
                    format!("{col} {op} {}", out.bind(val.clone()))
                }
                Condition::IsNull(col) => {
                    format!("{} IS NULL", self.identifier(col, false, "column")?)
                }
                Condition::Raw(fragment, params) => {
                    format!("({})", out.bind_fragment(fragment, params)?)
                }
            };
            clauses.push(clause);
        }
        out.sql.push_str(" WHERE ");
        out.sql.push_str(&clauses.join(" AND "));
        Ok(())
    }

    fn append_order(&self, sql: &mut String) -> Result<(), DataError> {
        if self.order.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(self.order.len());
        for (col, asc) in &self.order {
            let col = self.identifier(col, false, "column")?;
            clauses.push(format!("{col} {}", if *asc { "ASC" } else { "DESC" }));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn column_list(&self, columns: &[&str], allow_star: bool) -> Result<String, DataError> {
        let mut out = Vec::with_capacity(columns.len());
        for col in columns {
            out.push(self.identifier(col, allow_star, "column")?);
        }
        Ok(out.join(", "))
    }

    fn identifier(
        &self,
        ident: &str,
        allow_star: bool,
        kind: &'static str,
    ) -> Result<String, DataError> {
        if self.identifier_policy == IdentifierPolicy::Raw {
            return Ok(ident.to_string());
        }
        if !is_valid_identifier(ident, allow_star) {
            return Err(DataError::InvalidQuery(format!(
                "invalid {kind} identifier: {ident}"
            )));
        }
        match self.identifier_policy {
            IdentifierPolicy::Quote => Ok(quote_identifier(ident, self.dialect, allow_star)),
            IdentifierPolicy::Raw | IdentifierPolicy::Validate => Ok(ident.to_string()),
        }
    }
}

/// Accumulates SQL text and parameters, numbering placeholders as it goes.
struct Render {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl Render {
    fn new(dialect: Dialect, sql: String) -> Self {
        Self {
            dialect,
            sql,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    /// Rewrite each `?` outside quoted literals to the dialect placeholder.
    fn bind_fragment(&mut self, fragment: &str, params: &[Value]) -> Result<String, DataError> {
        let mut out = String::with_capacity(fragment.len());
        let mut quote: Option<char> = None;
        let mut used = 0usize;
        for c in fragment.chars() {
            match (quote, c) {
                (Some(q), c) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (Some(_), c) => out.push(c),
                (None, '\'' | '"') => {
                    quote = Some(c);
                    out.push(c);
                }
                (None, '?') => {
                    let value = params.get(used).cloned().ok_or_else(|| {
                        DataError::InvalidQuery(format!(
                            "condition '{fragment}' has more placeholders than parameters ({})",
                            params.len()
                        ))
                    })?;
                    used += 1;
                    out.push_str(&self.bind(value));
                }
                (None, c) => out.push(c),
            }
        }
        if used != params.len() {
            return Err(DataError::InvalidQuery(format!(
                "condition '{fragment}' has {used} placeholders but {} parameters",
                params.len()
            )));
        }
        Ok(out)
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

pub fn is_valid_identifier(ident: &str, allow_star: bool) -> bool {
    if ident.is_empty() {
        return false;
    }
    let parts: Vec<&str> = ident.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if allow_star && *part == "*" {
            return idx + 1 == parts.len();
        }
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
    }
    true
}

fn quote_identifier(ident: &str, dialect: Dialect, allow_star: bool) -> String {
    let quote = dialect.quote_char();
    let parts: Vec<&str> = ident.split('.').collect();
    let last_idx = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, part)| {
            if allow_star && part == "*" && idx == last_idx {
                part.to_string()
            } else {
                format!("{quote}{part}{quote}")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_select() {
        let stmt = QueryBuilder::new("users").build_select(&["*"]).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM users");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_complex_query() {
        let stmt = QueryBuilder::new("users")
            .where_eq("status", "active")
            .where_raw("name LIKE ? AND age > ?", vec!["%alice%".into(), Value::Int(18)])
            .order_by("id", true)
            .limit(10)
            .offset(20)
            .build_select(&["id", "name"])
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, name FROM users WHERE status = ? AND (name LIKE ? AND age > ?) ORDER BY id ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            stmt.params,
            vec![Value::from("active"), Value::from("%alice%"), Value::Int(18)]
        );
    }

    #[test]
    fn test_null_equality_becomes_is_null() {
        let stmt = QueryBuilder::new("users")
            .where_eq("deleted_at", Value::Null)
            .build_count()
            .unwrap();
        assert_eq!(stmt.sql, "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_postgres_placeholders_continue_through_fragments() {
        let stmt = QueryBuilder::new("users")
            .dialect(Dialect::Postgres)
            .where_eq("status", "active")
            .where_raw("age > ? and name <> '?'", vec![Value::Int(30)])
            .where_eq("role", "admin")
            .build_select(&["*"])
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM users WHERE status = $1 AND (age > $2 and name <> '?') AND role = $3"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_fragment_parameter_mismatch() {
        let err = QueryBuilder::new("users")
            .where_raw("a = ? and b = ?", vec![Value::Int(1)])
            .build_select(&["*"])
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidQuery(_)));

        let err = QueryBuilder::new("users")
            .where_raw("a = 1", vec![Value::Int(1)])
            .build_count()
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidQuery(_)));
    }

    #[test]
    fn test_checked_identifiers_and_quoting() {
        let stmt = QueryBuilder::new("users")
            .dialect(Dialect::Postgres)
            .identifier_policy(IdentifierPolicy::Quote)
            .where_eq("users.email", "a@b.com")
            .order_by("users.id", false)
            .build_select(&["users.id", "users.email"])
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".\"id\", \"users\".\"email\" FROM \"users\" WHERE \"users\".\"email\" = $1 ORDER BY \"users\".\"id\" DESC"
        );
    }

    #[test]
    fn test_invalid_identifier() {
        let err = QueryBuilder::new("users;drop")
            .build_select(&["*"])
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidQuery(_)));
    }

    #[test]
    fn test_insert_update_delete() {
        let insert = QueryBuilder::new("accounts")
            .dialect(Dialect::Postgres)
            .build_insert(&[("name", "a".into()), ("balance", 1.5.into())], &["id"])
            .unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO accounts (name, balance) VALUES ($1, $2) RETURNING id"
        );

        let insert = QueryBuilder::new("accounts")
            .dialect(Dialect::Sqlite)
            .build_insert(&[("name", "a".into())], &["id"])
            .unwrap();
        assert_eq!(insert.sql, "INSERT INTO accounts (name) VALUES (?) RETURNING id");

        let insert = QueryBuilder::new("accounts")
            .dialect(Dialect::MySql)
            .build_insert(&[("name", "a".into())], &["id"])
            .unwrap();
        assert_eq!(insert.sql, "INSERT INTO accounts (name) VALUES (?)");

        let update = QueryBuilder::new("accounts")
            .dialect(Dialect::Postgres)
            .where_eq("id", 7)
            .build_update(&[("name", "b".into())])
            .unwrap();
        assert_eq!(update.sql, "UPDATE accounts SET name = $1 WHERE id = $2");
        assert_eq!(update.params, vec![Value::from("b"), Value::Int(7)]);

        let delete = QueryBuilder::new("accounts")
            .where_eq("id", 7)
            .build_delete()
            .unwrap();
        assert_eq!(delete.sql, "DELETE FROM accounts WHERE id = ?");
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!(Dialect::from_url("sqlite://data.db"), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("postgresql://localhost/db"), Dialect::Postgres);
        assert_eq!(Dialect::from_url("mysql://localhost/db"), Dialect::MySql);
        assert_eq!("Postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!("oracle".parse::<Dialect>().is_err());
    }
}
