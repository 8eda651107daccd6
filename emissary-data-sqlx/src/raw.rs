//! Raw SQL, passed to the store as written.

use emissary_cache::EntityCache;
use emissary_data::{Cond, DataError, Row, Statement, Value};

use crate::delegator::{Delegator, Lookup};
use crate::tx::Invalidation;

impl Delegator {
    pub async fn find_list_by_raw_query(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, DataError> {
        self.find_list_by_raw_query_with(sql, params, false).await
    }

    /// Rows of an arbitrary query. Cached entries live under the data
    /// source's raw prefix, which every write to the data source clears.
    pub async fn find_list_by_raw_query_with(
        &mut self,
        sql: &str,
        params: &[Value],
        use_cache: bool,
    ) -> Result<Vec<Row>, DataError> {
        self.tx.ensure_usable()?;
        let stmt = Statement::new(sql, params.to_vec());
        let key = EntityCache::raw_key(self.data_source(), &raw_signature(&stmt));
        let slot = match self.lookup::<Vec<Row>>(use_cache, key).await {
            Lookup::Hit(rows) => return Ok(rows),
            Lookup::Miss(slot) => Some(slot),
            Lookup::Bypass => None,
        };
        let context = self.context("query", "raw sql");
        let rows = self.fetch_all(&stmt, &context).await?;
        self.fill(slot, &rows).await;
        Ok(rows)
    }

    /// Value of `count_alias` in the first row, or 0 when the query yields no rows.
    pub async fn count_by_raw_query(
        &mut self,
        sql: &str,
        count_alias: &str,
        params: &[Value],
    ) -> Result<u64, DataError> {
        self.tx.ensure_usable()?;
        let stmt = Statement::new(sql, params.to_vec());
        let context = self.context("count", "raw sql");
        self.scalar_count(&stmt, Some(count_alias), &context).await
    }

    /// Execute a write and invalidate everything cached for this data source.
    pub async fn execute_by_raw_sql(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<u64, DataError> {
        self.execute_raw(sql, params, vec![Invalidation::DataSource])
            .await
    }

    /// Execute a write that only touches `tables`; only their entries (and the
    /// raw entries) are invalidated.
    pub async fn execute_by_raw_sql_touching(
        &mut self,
        sql: &str,
        params: &[Value],
        tables: &[&str],
    ) -> Result<u64, DataError> {
        let invalidations = tables
            .iter()
            .map(|table| Invalidation::Class(table.to_string()))
            .collect();
        self.execute_raw(sql, params, invalidations).await
    }

    async fn execute_raw(
        &mut self,
        sql: &str,
        params: &[Value],
        invalidations: Vec<Invalidation>,
    ) -> Result<u64, DataError> {
        let stmt = Statement::new(sql, params.to_vec());
        let implicit = self.open_implicit().await?;
        let context = self.context("execute", "raw sql");
        let result = self.execute(&stmt, &context).await.map(|done| {
            for invalidation in invalidations {
                self.queue_invalidation(invalidation);
            }
            done.rows_affected()
        });
        self.settle(implicit, result).await
    }
}

fn raw_signature(stmt: &Statement) -> String {
    Cond {
        fragment: stmt.sql.clone(),
        params: stmt.params.clone(),
    }
    .signature()
}
