//! Loose query criteria and their cache signatures.
//!
//! Two criteria that are semantically identical must produce the same
//! signature: maps and selection sets are sorted, order-by keeps its order
//! but is normalised, and free-form fragments are whitespace-collapsed
//! outside quoted literals.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;
use crate::value::Value;

/// Field-to-value equality criteria, combined with `AND`. `Value::Null` means `IS NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AndMap(BTreeMap<String, Value>);

impl AndMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn signature(&self) -> String {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={}", v.canonical()))
            .collect();
        format!("and{{{}}}", parts.join(","))
    }
}

impl<S: Into<String>, V: Into<Value>> FromIterator<(S, V)> for AndMap {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        AndMap(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a AndMap {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A free-form `WHERE` fragment with `?` positional parameters.
///
/// An empty fragment matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cond {
    pub fragment: String,
    pub params: Vec<Value>,
}

impl Cond {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            params: Vec::new(),
        }
    }

    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.trim().is_empty()
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(Value::canonical).collect();
        format!(
            "cond{{{}}}[{}]",
            collapse_whitespace(&self.fragment),
            params.join(",")
        )
    }
}

impl From<&str> for Cond {
    fn from(fragment: &str) -> Self {
        Cond::new(fragment)
    }
}

impl From<String> for Cond {
    fn from(fragment: String) -> Self {
        Cond::new(fragment)
    }
}

/// Trim, and collapse whitespace runs to one space outside `'...'` and `"..."`.
pub fn collapse_whitespace(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for c in fragment.trim().chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

/// Parses `"field"`, `"field asc"` or `"field DESC"`.
impl FromStr for OrderBy {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let field = parts
            .next()
            .ok_or_else(|| DataError::InvalidQuery("empty order-by directive".into()))?;
        let ascending = match parts.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => true,
            Some("DESC") => false,
            Some(other) => {
                return Err(DataError::InvalidQuery(format!(
                    "unknown sort direction '{other}' in '{s}'"
                )))
            }
        };
        if parts.next().is_some() {
            return Err(DataError::InvalidQuery(format!("malformed order-by '{s}'")));
        }
        Ok(Self {
            field: field.to_string(),
            ascending,
        })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.ascending { "ASC" } else { "DESC" };
        write!(f, "{} {dir}", self.field)
    }
}

/// Selection, ordering and caching options for a finder.
///
/// An empty selection means every mapped column. The default does not use the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub fields: BTreeSet<String>,
    pub order_by: Vec<OrderBy>,
    pub use_cache: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached() -> Self {
        Self::default().use_cache(true)
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Parse and append a textual directive such as `"created_at desc"`.
    pub fn order_by_str(mut self, directive: &str) -> Result<Self, DataError> {
        self.order_by.push(directive.parse()?);
        Ok(self)
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Signature of selection and ordering. `use_cache` is not part of it.
    pub fn signature(&self) -> String {
        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        let order: Vec<String> = self.order_by.iter().map(ToString::to_string).collect();
        format!("sel[{}]ord[{}]", fields.join(","), order.join(","))
    }
}
