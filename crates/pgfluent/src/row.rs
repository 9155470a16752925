//! Row materialization: mapping raw records back to table rows.

use crate::client::{Record, RecordSet};
use crate::column::StatementId;
use crate::error::{OrmError, OrmResult};
use crate::meta::TableDef;
use crate::value::{FromValue, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// Where one table's columns sit inside a raw record.
#[derive(Debug, Clone)]
pub(crate) struct TableMapping {
    pub(crate) statement: StatementId,
    pub(crate) table: Arc<TableDef>,
    /// Table column indexes, in record order.
    pub(crate) columns: Arc<[usize]>,
    /// Record positions, pairwise with `columns`.
    pub(crate) positions: Vec<usize>,
}

impl TableMapping {
    pub(crate) fn data_row(&self, record: &Record) -> OrmResult<DataRow> {
        let mut values = Vec::with_capacity(self.positions.len());
        for (&pos, &col) in self.positions.iter().zip(self.columns.iter()) {
            let value = record.get(pos).cloned().ok_or_else(|| {
                OrmError::decode(
                    self.table.columns()[col].name(),
                    format!("record has no value at position {pos}"),
                )
            })?;
            values.push(value);
        }
        Ok(DataRow {
            table: Arc::clone(&self.table),
            columns: Arc::clone(&self.columns),
            values,
        })
    }

    /// Primary-key values of this table in `record`; `None` if any is NULL.
    pub(crate) fn key(&self, record: &Record) -> OrmResult<Option<Vec<Value>>> {
        let mut key = Vec::with_capacity(self.table.primary_key().len());
        for pk in self.table.primary_key() {
            let slot = self.columns.iter().position(|c| c == pk).ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "primary key {}.{} is not projected",
                    self.table.name(),
                    self.table.columns()[*pk].name()
                ))
            })?;
            match record.get(self.positions[slot]) {
                Some(v) if !v.is_null() => key.push(v.clone()),
                _ => return Ok(None),
            }
        }
        Ok(Some(key))
    }
}

/// Record layout of a row-mode select: one entry per table, root first.
#[derive(Debug, Clone, Default)]
pub struct RowMapping {
    tables: Vec<TableMapping>,
    width: usize,
}

impl RowMapping {
    pub(crate) fn push_column(&mut self, statement: StatementId, table: &Arc<TableDef>, column: usize) {
        let pos = self.width;
        self.width += 1;
        match self.tables.iter_mut().find(|t| t.statement == statement) {
            Some(mapping) => {
                let mut columns = mapping.columns.to_vec();
                columns.push(column);
                mapping.columns = columns.into();
                mapping.positions.push(pos);
            }
            None => self.tables.push(TableMapping {
                statement,
                table: Arc::clone(table),
                columns: Arc::from(vec![column]),
                positions: vec![pos],
            }),
        }
    }

    /// Reorder tables to follow `order` (FROM order).
    pub(crate) fn sort_tables(&mut self, order: &[StatementId]) {
        self.tables
            .sort_by_key(|t| order.iter().position(|s| *s == t.statement));
    }

    pub(crate) fn table(&self, statement: StatementId) -> Option<&TableMapping> {
        self.tables.iter().find(|t| t.statement == statement)
    }

    /// Number of record columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of mapped tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub(crate) fn entity(&self, record: &Record) -> OrmResult<Entity> {
        let rows = self
            .tables
            .iter()
            .map(|t| t.data_row(record))
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Entity { rows })
    }
}

/// Values of one table row, as far as the statement projected them.
#[derive(Debug, Clone)]
pub struct DataRow {
    table: Arc<TableDef>,
    columns: Arc<[usize]>,
    values: Vec<Value>,
}

impl DataRow {
    pub fn table(&self) -> &Arc<TableDef> {
        &self.table
    }

    /// The raw value of `column`, if it was projected.
    pub fn value(&self, column: &str) -> Option<&Value> {
        let idx = self.table.column_index(column)?;
        let slot = self.columns.iter().position(|c| *c == idx)?;
        self.values.get(slot)
    }

    /// Read `column` as `T`.
    pub fn get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| OrmError::decode(column, "column is not part of this row"))?;
        T::from_value(value).map_err(|e| OrmError::decode(column, e.to_string()))
    }

    /// Primary-key values, in key order.
    pub fn primary_key(&self) -> Option<Vec<&Value>> {
        self.table
            .primary_key()
            .iter()
            .map(|&pk| {
                let slot = self.columns.iter().position(|c| *c == pk)?;
                self.values.get(slot)
            })
            .collect()
    }

    /// Column names and values, in projection order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|&c| self.table.columns()[c].name())
            .zip(self.values.iter())
    }

    /// Map this row into `T`.
    pub fn to<T: FromDataRow>(&self) -> OrmResult<T> {
        T::from_data_row(self)
    }
}

impl Serialize for DataRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Types that can be built from a [`DataRow`].
///
/// ```ignore
/// struct Person { id: i64, name: String }
///
/// impl FromDataRow for Person {
///     fn from_data_row(row: &DataRow) -> OrmResult<Self> {
///         Ok(Self { id: row.get("id")?, name: row.get("name")? })
///     }
/// }
/// ```
pub trait FromDataRow: Sized {
    fn from_data_row(row: &DataRow) -> OrmResult<Self>;
}

/// One raw record of a row-mode select, split into the rows of its tables.
#[derive(Debug, Clone)]
pub struct Entity {
    rows: Vec<DataRow>,
}

impl Entity {
    /// The row of the statement's own table.
    pub fn root(&self) -> &DataRow {
        &self.rows[0]
    }

    /// Rows of every table, in FROM order.
    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    /// The first row belonging to `table`.
    pub fn table(&self, table: &str) -> Option<&DataRow> {
        self.rows.iter().find(|r| r.table.name() == table)
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }
}

/// Forward-only iterator of [`Entity`] values.
///
/// Dropping the iterator (or calling [`RowIter::close`]) releases the remaining records.
#[derive(Debug)]
#[must_use]
pub struct RowIter {
    records: RecordSet,
    mapping: Arc<RowMapping>,
}

impl RowIter {
    pub(crate) fn new(records: RecordSet, mapping: Arc<RowMapping>) -> Self {
        Self { records, mapping }
    }

    /// Expect at most one row: 0 rows → `None`, 1 → `Some`, more → [`OrmError::NotUnique`].
    pub fn will_unique(mut self) -> OrmResult<Option<Entity>> {
        let Some(first) = self.next().transpose()? else {
            return Ok(None);
        };
        if self.records.next_record()?.is_some() {
            return Err(OrmError::not_unique(format!(
                "expected at most one {} row, found more",
                first.root().table().name()
            )));
        }
        Ok(Some(first))
    }

    /// Map every root row into `T`.
    pub fn map_root<T: FromDataRow>(self) -> OrmResult<Vec<T>> {
        self.map(|entity| entity.and_then(|e| e.root().to()))
            .collect()
    }

    pub fn close(self) {}
}

impl Iterator for RowIter {
    type Item = OrmResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next_record() {
            Ok(Some(record)) => Some(self.mapping.entity(&record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
