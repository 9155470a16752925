//! Execution facade for composed statements.
//!
//! [`Query`] is implemented by [`Select`] (rows as [`Entity`] values) and by
//! [`OneToManyQuery`](crate::one_to_many::OneToManyQuery) (rows folded into trees). Every entry
//! point composes synchronously, then hands the SQL text and binders to a [`GenericClient`].
//!
//! ```ignore
//! let total = select.count(&client).await?;
//! let page = select.execute(&client).await?.map_root::<Person>()?;
//! let one = Select::from(&person).fetch(&client, &[Value::from(7_i64)]).await?;
//! ```

use crate::client::{GenericClient, RecordSet};
use crate::config::SqlConfig;
use crate::error::{OrmError, OrmResult};
use crate::qb::{Filtered, Select, Statement};
use crate::row::{Entity, RowIter};
use crate::sql::ComposedSql;
use crate::value::{Binder, Value};
use std::future::Future;
use std::sync::Arc;

/// Statements that return rows.
pub trait Query: Statement {
    /// One result of a primary-key lookup.
    type Row;
    /// Forward-only result source.
    type Rows;

    /// Execute and return the result source.
    fn execute(
        &self,
        client: &impl GenericClient,
    ) -> impl Future<Output = OrmResult<Self::Rows>> + Send;

    /// Exact primary-key lookup: 0 rows → `None`, 1 → `Some`, more → [`OrmError::NotUnique`].
    fn fetch(
        &self,
        client: &impl GenericClient,
        key: &[Value],
    ) -> impl Future<Output = OrmResult<Option<Self::Row>>> + Send;

    /// The COUNT variant of the filtered statement.
    fn count_sql(&self) -> OrmResult<ComposedSql>;

    /// The statement in aggregate form: exactly the accumulated clauses.
    fn aggregate_sql(&self) -> OrmResult<ComposedSql>;

    /// Execute [`Query::count_sql`].
    fn count(&self, client: &impl GenericClient) -> impl Future<Output = OrmResult<i64>> + Send {
        let composed = self.count_sql();
        let config = self.config().clone();
        async move {
            let composed = composed?;
            config.log_sql("count", &composed);
            let mut records = client.query(composed.sql(), &composed.params_ref()).await?;
            let record = records
                .next_record()?
                .ok_or_else(|| OrmError::not_found("COUNT returned no record"))?;
            let value = record
                .get(0)
                .ok_or_else(|| OrmError::decode("count", "COUNT returned an empty record"))?;
            crate::value::FromValue::from_value(value)
                .map_err(|e| OrmError::decode("count", e.to_string()))
        }
    }

    /// Execute [`Query::aggregate_sql`] and return the raw records.
    fn aggregate(
        &self,
        client: &impl GenericClient,
    ) -> impl Future<Output = OrmResult<RecordSet>> + Send {
        let composed = self.aggregate_sql();
        let config = self.config().clone();
        async move {
            let composed = composed?;
            config.log_sql("aggregate", &composed);
            client.query(composed.sql(), &composed.params_ref()).await
        }
    }
}

/// AND `primary key = key` into `select`.
pub(crate) fn restrict_to_key(select: &mut Select, key: &[Value]) -> OrmResult<()> {
    let table = select.table();
    let columns = table.primary_key();
    if columns.is_empty() {
        return Err(OrmError::illegal_state(format!(
            "table {} has no primary key",
            table.def().name()
        )));
    }
    if columns.len() != key.len() {
        return Err(OrmError::illegal_state(format!(
            "primary key of {} has {} columns, {} values were supplied",
            table.def().name(),
            columns.len(),
            key.len()
        )));
    }
    let key = key.to_vec();
    select.where_(move |w| {
        let mut pairs = columns.into_iter().zip(key);
        let (column, value) = pairs
            .next()
            .ok_or_else(|| OrmError::illegal_state("empty primary key"))?;
        let mut logical = w.col(column).eq(value)?;
        for (column, value) in pairs {
            logical = logical.and().col(column).eq(value)?;
        }
        Ok(logical)
    })?;
    Ok(())
}

impl Query for Select {
    type Row = Entity;
    type Rows = RowIter;

    fn execute(&self, client: &impl GenericClient) -> impl Future<Output = OrmResult<RowIter>> + Send {
        let composed = self
            .require_row_mode("execute")
            .and_then(|()| self.memoized());
        let config = self.config.clone();
        async move {
            let composed = composed?;
            let mapping = composed
                .mapping()
                .cloned()
                .ok_or_else(|| OrmError::illegal_state("row-mode select has no row mapping"))?;
            config.log_sql("execute", &composed);
            let records = client.query(composed.sql(), &composed.params_ref()).await?;
            Ok(RowIter::new(records, mapping))
        }
    }

    fn fetch(
        &self,
        client: &impl GenericClient,
        key: &[Value],
    ) -> impl Future<Output = OrmResult<Option<Entity>>> + Send {
        let composed = self.require_row_mode("fetch").and_then(|()| {
            let mut lookup = self.fork();
            restrict_to_key(&mut lookup, key)?;
            lookup.memoized()
        });
        let config = self.config.clone();
        async move {
            let composed = composed?;
            let mapping = composed
                .mapping()
                .cloned()
                .ok_or_else(|| OrmError::illegal_state("row-mode select has no row mapping"))?;
            config.log_sql("fetch", &composed);
            let records = client.query(composed.sql(), &composed.params_ref()).await?;
            RowIter::new(records, mapping).will_unique()
        }
    }

    fn count_sql(&self) -> OrmResult<ComposedSql> {
        self.compose_count(false)
    }

    fn aggregate_sql(&self) -> OrmResult<ComposedSql> {
        self.aggregate_memoized()
    }
}

/// A composed statement ready to run again, produced by
/// [`Reproducible`](crate::qb::Reproducible).
#[derive(Debug, Clone)]
pub struct Prepared {
    composed: ComposedSql,
    config: SqlConfig,
}

impl Prepared {
    pub(crate) fn new(composed: ComposedSql, config: SqlConfig) -> Self {
        Self { composed, config }
    }

    pub fn composed(&self) -> &ComposedSql {
        &self.composed
    }

    pub fn sql(&self) -> &str {
        self.composed.sql()
    }

    pub fn shared_sql(&self) -> Arc<str> {
        self.composed.shared_sql()
    }

    pub fn binders(&self) -> &[Binder] {
        self.composed.binders()
    }

    /// Rebind again, keeping the SQL text.
    pub fn reproduce(&self, values: Vec<Value>) -> OrmResult<Prepared> {
        Ok(Self::new(self.composed.rebind(values)?, self.config.clone()))
    }

    /// Execute and return the raw records.
    pub async fn query(&self, client: &impl GenericClient) -> OrmResult<RecordSet> {
        self.config.log_sql("query", &self.composed);
        client
            .query(self.composed.sql(), &self.composed.params_ref())
            .await
    }

    /// Execute and map the records back to table rows (row-mode selects only).
    pub async fn rows(&self, client: &impl GenericClient) -> OrmResult<RowIter> {
        let mapping = self.composed.mapping().cloned().ok_or_else(|| {
            OrmError::illegal_state("only row-mode selects can be read as rows")
        })?;
        let records = self.query(client).await?;
        Ok(RowIter::new(records, mapping))
    }

    /// Execute and return the number of affected rows.
    pub async fn execute(&self, client: &impl GenericClient) -> OrmResult<u64> {
        self.config.log_sql("execute", &self.composed);
        client
            .execute(self.composed.sql(), &self.composed.params_ref())
            .await
    }
}
