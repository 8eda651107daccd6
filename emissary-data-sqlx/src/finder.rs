//! Typed finders over [`Entity`] types.
//!
//! Every finder resolves to one of three reads (rows, page, count) over a
//! [`Criteria`]. The `_with` variants take [`FindOptions`]; the plain ones use
//! the defaults, which select every column and skip the cache.

use emissary_cache::EntityCache;
use emissary_data::{
    AndMap, Cond, Criteria, DataError, Entity, FindOptions, Identity, Page, PageRequest, Row,
    Statement, Value,
};

use crate::delegator::{Delegator, Lookup};

impl Delegator {
    pub async fn find_by_id<E: Entity>(
        &mut self,
        id: impl Into<Identity>,
    ) -> Result<Option<E>, DataError> {
        self.find_by_id_with(id, false).await
    }

    /// Point lookup. A found row is cached under the point key; absence is not.
    pub async fn find_by_id_with<E: Entity>(
        &mut self,
        id: impl Into<Identity>,
        use_cache: bool,
    ) -> Result<Option<E>, DataError> {
        self.tx.ensure_usable()?;
        let id = id.into();
        let key = EntityCache::point_key(self.data_source(), E::table_name(), &id.to_string());
        let slot = match self.lookup::<Row>(use_cache, key).await {
            Lookup::Hit(row) => return E::from_row(&row).map(Some),
            Lookup::Miss(slot) => Some(slot),
            Lookup::Bypass => None,
        };
        let stmt = self
            .source
            .translator()
            .select_by_id::<E>(&id, &FindOptions::default())?;
        let context = self.context("find by id in", E::table_name());
        let Some(row) = self.fetch_all(&stmt, &context).await?.into_iter().next() else {
            return Ok(None);
        };
        self.fill(slot, &row).await;
        E::from_row(&row).map(Some)
    }

    /// Like [`Delegator::find_by_id`], but a missing row is [`DataError::NotFound`].
    pub async fn get_by_id<E: Entity>(&mut self, id: impl Into<Identity>) -> Result<E, DataError> {
        let id = id.into();
        self.find_by_id::<E>(id.clone())
            .await?
            .ok_or_else(|| DataError::not_found(E::table_name(), &id))
    }

    pub async fn find_ids_by_and<E: Entity>(
        &mut self,
        map: &AndMap,
    ) -> Result<Vec<Identity>, DataError> {
        self.id_rows::<E>(Criteria::And(map), false).await
    }

    pub async fn find_ids_by_and_with<E: Entity>(
        &mut self,
        map: &AndMap,
        use_cache: bool,
    ) -> Result<Vec<Identity>, DataError> {
        self.id_rows::<E>(Criteria::And(map), use_cache).await
    }

    pub async fn find_ids_by_cond<E: Entity>(
        &mut self,
        cond: &Cond,
    ) -> Result<Vec<Identity>, DataError> {
        self.id_rows::<E>(Criteria::Cond(cond), false).await
    }

    pub async fn find_ids_by_cond_with<E: Entity>(
        &mut self,
        cond: &Cond,
        use_cache: bool,
    ) -> Result<Vec<Identity>, DataError> {
        self.id_rows::<E>(Criteria::Cond(cond), use_cache).await
    }

    pub async fn find_unique_by_and<E: Entity>(
        &mut self,
        map: &AndMap,
    ) -> Result<Option<E>, DataError> {
        self.find_unique_by_and_with(map, &FindOptions::default())
            .await
    }

    /// At most one match: `None` on zero rows, [`DataError::NonUniqueResult`] on several.
    pub async fn find_unique_by_and_with<E: Entity>(
        &mut self,
        map: &AndMap,
        opts: &FindOptions,
    ) -> Result<Option<E>, DataError> {
        let mut rows = self
            .select_rows::<E>(Criteria::And(map), opts, "unique")
            .await?;
        match rows.len() {
            0 => Ok(None),
            1 => rows.pop().map(|row| E::from_row(&row)).transpose(),
            count => Err(DataError::NonUniqueResult {
                entity: E::table_name().to_string(),
                count: count as u64,
            }),
        }
    }

    pub async fn find_list<E: Entity>(&mut self, cond: &Cond) -> Result<Vec<E>, DataError> {
        self.find_list_with(cond, &FindOptions::default()).await
    }

    pub async fn find_list_with<E: Entity>(
        &mut self,
        cond: &Cond,
        opts: &FindOptions,
    ) -> Result<Vec<E>, DataError> {
        let rows = self
            .select_rows::<E>(Criteria::Cond(cond), opts, "list")
            .await?;
        map_rows(&rows)
    }

    pub async fn find_list_by_and<E: Entity>(&mut self, map: &AndMap) -> Result<Vec<E>, DataError> {
        self.find_list_by_and_with(map, &FindOptions::default())
            .await
    }

    pub async fn find_list_by_and_with<E: Entity>(
        &mut self,
        map: &AndMap,
        opts: &FindOptions,
    ) -> Result<Vec<E>, DataError> {
        let rows = self
            .select_rows::<E>(Criteria::And(map), opts, "list")
            .await?;
        map_rows(&rows)
    }

    pub async fn find_page_by_and<E: Entity>(
        &mut self,
        map: &AndMap,
        request: PageRequest,
    ) -> Result<Page<E>, DataError> {
        self.find_page_by_and_with(map, request, &FindOptions::default())
            .await
    }

    pub async fn find_page_by_and_with<E: Entity>(
        &mut self,
        map: &AndMap,
        request: PageRequest,
        opts: &FindOptions,
    ) -> Result<Page<E>, DataError> {
        self.page_rows::<E>(Criteria::And(map), request, opts).await
    }

    pub async fn find_page_by_cond<E: Entity>(
        &mut self,
        cond: &Cond,
        request: PageRequest,
    ) -> Result<Page<E>, DataError> {
        self.find_page_by_cond_with(cond, request, &FindOptions::default())
            .await
    }

    pub async fn find_page_by_cond_with<E: Entity>(
        &mut self,
        cond: &Cond,
        request: PageRequest,
        opts: &FindOptions,
    ) -> Result<Page<E>, DataError> {
        self.page_rows::<E>(Criteria::Cond(cond), request, opts).await
    }

    pub async fn count_by_and<E: Entity>(&mut self, map: &AndMap) -> Result<u64, DataError> {
        self.count_rows::<E>(Criteria::And(map), false).await
    }

    pub async fn count_by_and_with<E: Entity>(
        &mut self,
        map: &AndMap,
        opts: &FindOptions,
    ) -> Result<u64, DataError> {
        self.count_rows::<E>(Criteria::And(map), opts.use_cache).await
    }

    pub async fn count_by_cond<E: Entity>(&mut self, cond: &Cond) -> Result<u64, DataError> {
        self.count_rows::<E>(Criteria::Cond(cond), false).await
    }

    pub async fn count_by_cond_with<E: Entity>(
        &mut self,
        cond: &Cond,
        opts: &FindOptions,
    ) -> Result<u64, DataError> {
        self.count_rows::<E>(Criteria::Cond(cond), opts.use_cache).await
    }

    fn query_key<E: Entity>(&self, kind: &str, signature: &str) -> String {
        EntityCache::query_key(self.data_source(), E::table_name(), kind, signature)
    }

    async fn select_rows<E: Entity>(
        &mut self,
        criteria: Criteria<'_>,
        opts: &FindOptions,
        kind: &str,
    ) -> Result<Vec<Row>, DataError> {
        self.tx.ensure_usable()?;
        let stmt = self.source.translator().select::<E>(criteria, opts, None)?;
        let signature = format!("{}{}", criteria.signature(), opts.signature());
        let key = self.query_key::<E>(kind, &signature);
        let slot = match self.lookup::<Vec<Row>>(opts.use_cache, key).await {
            Lookup::Hit(rows) => return Ok(rows),
            Lookup::Miss(slot) => Some(slot),
            Lookup::Bypass => None,
        };
        let context = self.context("select from", E::table_name());
        let rows = self.fetch_all(&stmt, &context).await?;
        self.fill(slot, &rows).await;
        Ok(rows)
    }

    async fn id_rows<E: Entity>(
        &mut self,
        criteria: Criteria<'_>,
        use_cache: bool,
    ) -> Result<Vec<Identity>, DataError> {
        self.tx.ensure_usable()?;
        let stmt = self.source.translator().ids::<E>(criteria)?;
        let key = self.query_key::<E>("ids", &criteria.signature());
        let rows = match self.lookup::<Vec<Row>>(use_cache, key).await {
            Lookup::Hit(rows) => rows,
            lookup => {
                let slot = match lookup {
                    Lookup::Miss(slot) => Some(slot),
                    _ => None,
                };
                let context = self.context("select ids from", E::table_name());
                let rows = self.fetch_all(&stmt, &context).await?;
                self.fill(slot, &rows).await;
                rows
            }
        };
        rows.iter().map(Identity::from_row::<E>).collect()
    }

    /// One page plus the full match count.
    async fn page_rows<E: Entity>(
        &mut self,
        criteria: Criteria<'_>,
        request: PageRequest,
        opts: &FindOptions,
    ) -> Result<Page<E>, DataError> {
        self.tx.ensure_usable()?;
        let stmt = self
            .source
            .translator()
            .select::<E>(criteria, opts, Some(request))?;
        let kind = format!("page:{}:{}", request.page_no, request.page_size);
        let signature = format!("{}{}", criteria.signature(), opts.signature());
        let key = self.query_key::<E>(&kind, &signature);
        let (rows, total) = match self.lookup::<(Vec<Row>, u64)>(opts.use_cache, key).await {
            Lookup::Hit(cached) => cached,
            lookup => {
                let slot = match lookup {
                    Lookup::Miss(slot) => Some(slot),
                    _ => None,
                };
                let total = self.count_uncached::<E>(criteria).await?;
                let context = self.context("select page from", E::table_name());
                let rows = self.fetch_all(&stmt, &context).await?;
                let cached = (rows, total);
                self.fill(slot, &cached).await;
                cached
            }
        };
        Ok(Page::new(map_rows(&rows)?, request, total))
    }

    async fn count_rows<E: Entity>(
        &mut self,
        criteria: Criteria<'_>,
        use_cache: bool,
    ) -> Result<u64, DataError> {
        self.tx.ensure_usable()?;
        let key = self.query_key::<E>("count", &criteria.signature());
        let slot = match self.lookup::<u64>(use_cache, key).await {
            Lookup::Hit(count) => return Ok(count),
            Lookup::Miss(slot) => Some(slot),
            Lookup::Bypass => None,
        };
        let count = self.count_uncached::<E>(criteria).await?;
        self.fill(slot, &count).await;
        Ok(count)
    }

    async fn count_uncached<E: Entity>(
        &mut self,
        criteria: Criteria<'_>,
    ) -> Result<u64, DataError> {
        let stmt = self.source.translator().count::<E>(criteria)?;
        let context = self.context("count", E::table_name());
        self.scalar_count(&stmt, None, &context).await
    }

    /// Read a count from the first row: the named column, or the first one.
    /// No rows count as zero.
    pub(crate) async fn scalar_count(
        &mut self,
        stmt: &Statement,
        column: Option<&str>,
        context: &str,
    ) -> Result<u64, DataError> {
        let rows = self.fetch_all(stmt, context).await?;
        let Some(row) = rows.first() else {
            return Ok(0);
        };
        let value = match column {
            Some(alias) => row.get(alias).ok_or_else(|| {
                DataError::mapping(context, format!("no column '{alias}' in count result"))
            })?,
            None => row
                .iter()
                .next()
                .map(|(_, v)| v)
                .ok_or_else(|| DataError::mapping(context, "count returned no columns"))?,
        };
        match value {
            Value::Null => Ok(0),
            Value::Int(n) if *n >= 0 => Ok(*n as u64),
            Value::Float(f) if *f >= 0.0 => Ok(*f as u64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| DataError::mapping(context, format!("'{s}' is not a count"))),
            other => Err(DataError::mapping(
                context,
                format!("{} {other} is not a count", other.type_name()),
            )),
        }
    }
}

fn map_rows<E: Entity>(rows: &[Row]) -> Result<Vec<E>, DataError> {
    rows.iter().map(E::from_row).collect()
}
