//! Execution collaborator: the client trait statements run against, and the records it returns.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::sync::Arc;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A trait that unifies database clients and transactions.
///
/// Statements compose their SQL synchronously and hand the text plus binders to a
/// `GenericClient`. Implemented for `tokio_postgres::Client` and `tokio_postgres::Transaction`;
/// tests and other drivers can implement it over [`RecordSet::from_values`].
pub trait GenericClient: Send + Sync {
    /// Execute a query and return its records.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<RecordSet>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<RecordSet> {
        let rows = tokio_postgres::Client::query(self, sql, params).await?;
        Ok(RecordSet::from_rows(rows))
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        Ok(tokio_postgres::Client::execute(self, sql, params).await?)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<RecordSet> {
        let rows = tokio_postgres::Transaction::query(self, sql, params).await?;
        Ok(RecordSet::from_rows(rows))
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        Ok(tokio_postgres::Transaction::execute(self, sql, params).await?)
    }
}

/// One raw result record, indexable by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    fn from_row(row: &Row) -> OrmResult<Self> {
        let mut values = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            let value = row
                .try_get::<_, Value>(idx)
                .map_err(|e| OrmError::decode(column.name(), e.to_string()))?;
            values.push(value);
        }
        Ok(Self { values })
    }
}

enum Source {
    Rows(std::vec::IntoIter<Row>),
    Values(std::vec::IntoIter<Vec<Value>>),
}

/// Forward-only cursor over query results.
///
/// Records are decoded as they are read. Dropping the set (or calling [`RecordSet::close`])
/// releases the remaining rows.
#[must_use]
pub struct RecordSet {
    columns: Arc<[String]>,
    source: Source,
}

impl RecordSet {
    /// Wrap rows returned by `tokio-postgres`.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns: Arc<[String]> = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            columns,
            source: Source::Rows(rows.into_iter()),
        }
    }

    /// Build a record set from already decoded values.
    pub fn from_values(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            source: Source::Values(rows.into_iter()),
        }
    }

    /// An empty record set.
    pub fn empty() -> Self {
        Self::from_values(Vec::new(), Vec::new())
    }

    /// Column names, when the driver reported any.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Read the next record.
    pub fn next_record(&mut self) -> OrmResult<Option<Record>> {
        match &mut self.source {
            Source::Rows(rows) => rows.next().map(|row| Record::from_row(&row)).transpose(),
            Source::Values(rows) => Ok(rows.next().map(Record::new)),
        }
    }

    /// Release the remaining records.
    pub fn close(self) {}
}

impl Iterator for RecordSet {
    type Item = OrmResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl std::fmt::Debug for RecordSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSet")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}
