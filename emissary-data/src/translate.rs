use crate::criteria::{AndMap, Cond, FindOptions};
use crate::entity::{Entity, IdGeneration, Identity};
use crate::error::DataError;
use crate::page::PageRequest;
use crate::query::{Dialect, IdentifierPolicy, QueryBuilder, Statement};
use crate::value::{Row, Value};

/// Where-clause source for a finder.
#[derive(Debug, Clone, Copy)]
pub enum Criteria<'a> {
    All,
    And(&'a AndMap),
    Cond(&'a Cond),
}

impl Criteria<'_> {
    pub fn signature(&self) -> String {
        match self {
            Criteria::All => "all".to_string(),
            Criteria::And(map) => map.signature(),
            Criteria::Cond(cond) => cond.signature(),
        }
    }
}

impl<'a> From<&'a AndMap> for Criteria<'a> {
    fn from(map: &'a AndMap) -> Self {
        Criteria::And(map)
    }
}

impl<'a> From<&'a Cond> for Criteria<'a> {
    fn from(cond: &'a Cond) -> Self {
        Criteria::Cond(cond)
    }
}

/// A planned insert. `returns_id` is set when the statement yields the generated key as a row.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub statement: Statement,
    pub returns_id: bool,
}

/// Maps an entity type plus criteria to SQL for one dialect.
///
/// Field names are checked against [`Entity::columns`] so unknown fields fail
/// before anything reaches the store.
#[derive(Debug, Clone, Copy)]
pub struct Translator {
    dialect: Dialect,
}

impl Translator {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn builder<E: Entity>(&self) -> QueryBuilder {
        QueryBuilder::new(E::table_name())
            .dialect(self.dialect)
            .identifier_policy(IdentifierPolicy::Quote)
    }

    fn filtered<E: Entity>(&self, criteria: Criteria<'_>) -> Result<QueryBuilder, DataError> {
        let mut qb = self.builder::<E>();
        match criteria {
            Criteria::All => {}
            Criteria::And(map) => {
                for (field, value) in map {
                    qb = qb.where_eq(resolve_field::<E>(field)?, value.clone());
                }
            }
            Criteria::Cond(cond) => {
                qb = qb.where_raw(&cond.fragment, cond.params.clone());
            }
        }
        Ok(qb)
    }

    /// `SELECT` of the selection set; with `page`, ordered deterministically and windowed.
    pub fn select<E: Entity>(
        &self,
        criteria: Criteria<'_>,
        opts: &FindOptions,
        page: Option<PageRequest>,
    ) -> Result<Statement, DataError> {
        let columns = selection::<E>(opts)?;
        let mut qb = self.filtered::<E>(criteria)?;
        let mut order = Vec::with_capacity(opts.order_by.len());
        for o in &opts.order_by {
            order.push((resolve_field::<E>(&o.field)?, o.ascending));
        }
        if let Some(page) = page {
            page.validate()?;
            for id in E::id_columns().iter().copied() {
                if !order.iter().any(|(c, _)| *c == id) {
                    order.push((id, true));
                }
            }
            qb = qb.limit(page.page_size).offset(page.offset());
        }
        for (column, ascending) in order {
            qb = qb.order_by(column, ascending);
        }
        qb.build_select(&columns)
    }

    pub fn count<E: Entity>(&self, criteria: Criteria<'_>) -> Result<Statement, DataError> {
        self.filtered::<E>(criteria)?.build_count()
    }

    /// Identity columns of the matching rows, ordered by identity.
    pub fn ids<E: Entity>(&self, criteria: Criteria<'_>) -> Result<Statement, DataError> {
        let mut qb = self.filtered::<E>(criteria)?;
        for id in E::id_columns() {
            qb = qb.order_by(id, true);
        }
        qb.build_select(E::id_columns())
    }

    pub fn select_by_id<E: Entity>(
        &self,
        id: &Identity,
        opts: &FindOptions,
    ) -> Result<Statement, DataError> {
        let columns = selection::<E>(opts)?;
        let mut qb = self.builder::<E>();
        for (column, value) in id.bind_to::<E>()? {
            qb = qb.where_eq(column, value);
        }
        qb.build_select(&columns)
    }

    /// Store-generated id columns are left out of the column list.
    pub fn insert<E: Entity>(&self, row: &Row) -> Result<InsertPlan, DataError> {
        let generated = E::id_generation() == IdGeneration::Generated;
        if generated && E::id_columns().len() != 1 {
            return Err(DataError::InvalidQuery(format!(
                "{} uses a generated id but has {} id columns",
                E::table_name(),
                E::id_columns().len()
            )));
        }
        let values: Vec<(&str, Value)> = E::columns()
            .iter()
            .copied()
            .filter(|c| !(generated && E::id_columns().contains(c)))
            .filter_map(|c| row.get(c).map(|v| (c, v.clone())))
            .collect();
        let returning: &[&str] = if generated { E::id_columns() } else { &[] };
        let statement = self.builder::<E>().build_insert(&values, returning)?;
        Ok(InsertPlan {
            statement,
            returns_id: generated && self.dialect.supports_returning(),
        })
    }

    /// `UPDATE` of every non-id column, keyed by identity.
    pub fn update<E: Entity>(&self, id: &Identity, row: &Row) -> Result<Statement, DataError> {
        let assignments: Vec<(&str, Value)> = E::columns()
            .iter()
            .copied()
            .filter(|c| !E::id_columns().contains(c))
            .filter_map(|c| row.get(c).map(|v| (c, v.clone())))
            .collect();
        let mut qb = self.builder::<E>();
        for (column, value) in id.bind_to::<E>()? {
            qb = qb.where_eq(column, value);
        }
        qb.build_update(&assignments)
    }

    pub fn delete_by_id<E: Entity>(&self, id: &Identity) -> Result<Statement, DataError> {
        let mut qb = self.builder::<E>();
        for (column, value) in id.bind_to::<E>()? {
            qb = qb.where_eq(column, value);
        }
        qb.build_delete()
    }
}

/// Map a caller-supplied field name onto the entity's column, ignoring ASCII case.
pub fn resolve_field<E: Entity>(field: &str) -> Result<&'static str, DataError> {
    E::columns()
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(field.trim()))
        .ok_or_else(|| {
            DataError::InvalidQuery(format!(
                "unknown field '{field}' on entity '{}'",
                E::table_name()
            ))
        })
}

/// Selected columns in mapping order; identity columns are always included.
pub fn selection<E: Entity>(opts: &FindOptions) -> Result<Vec<&'static str>, DataError> {
    if opts.fields.is_empty() {
        return Ok(E::columns().to_vec());
    }
    let mut wanted = Vec::with_capacity(opts.fields.len());
    for field in &opts.fields {
        wanted.push(resolve_field::<E>(field)?);
    }
    Ok(E::columns()
        .iter()
        .copied()
        .filter(|c| E::id_columns().contains(c) || wanted.contains(c))
        .collect())
}
