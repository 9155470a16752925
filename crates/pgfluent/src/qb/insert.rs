//! INSERT statement builder.

use super::dml::{frozen, render_returning, target_index};
use super::select::Select;
use super::traits::{Mutation, Statement};
use crate::column::{Column, StatementId, TableRef};
use crate::config::SqlConfig;
use crate::error::{OrmError, OrmResult};
use crate::meta::TableDef;
use crate::sql::{ComposedSql, Composer};
use crate::value::Value;
use std::cell::OnceCell;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Source {
    Values(Vec<Vec<Value>>),
    Select(Box<Select>),
}

/// INSERT statement builder.
///
/// ```ignore
/// let mut insert = Insert::into(&person);
/// let p = insert.table();
/// insert
///     .columns([p.col("id"), p.col("name")])?
///     .values([Value::from(1_i64), Value::from("ann")])?
///     .values([Value::from(2_i64), Value::from("bob")])?;
/// insert.execute(&client).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Insert {
    id: StatementId,
    table: Arc<TableDef>,
    config: SqlConfig,
    columns: Option<Vec<usize>>,
    source: Option<Source>,
    returning: Vec<Column>,
    composed: OnceCell<ComposedSql>,
}

impl Insert {
    /// Create an INSERT into `table`.
    pub fn into(table: &Arc<TableDef>) -> Self {
        Self {
            id: StatementId::next(),
            table: Arc::clone(table),
            config: SqlConfig::default(),
            columns: None,
            source: None,
            returning: Vec::new(),
            composed: OnceCell::new(),
        }
    }

    pub fn with_config(mut self, config: SqlConfig) -> OrmResult<Self> {
        self.ensure_mutable()?;
        self.config = config;
        Ok(self)
    }

    pub fn id(&self) -> StatementId {
        self.id
    }

    pub fn table(&self) -> TableRef {
        TableRef::new(Arc::clone(&self.table), self.id)
    }

    fn ensure_mutable(&self) -> OrmResult<()> {
        match self.composed.get() {
            Some(_) => Err(frozen("insert", self.id)),
            None => Ok(()),
        }
    }

    /// Set the target columns. Must precede `values`/`select`; can be set once.
    pub fn columns(&mut self, columns: impl IntoIterator<Item = Column>) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        if self.columns.is_some() {
            return Err(OrmError::illegal_state("INSERT columns were already set"));
        }
        if self.source.is_some() {
            return Err(OrmError::illegal_state(
                "INSERT columns must be set before values or select",
            ));
        }
        let columns = columns
            .into_iter()
            .map(|column| target_index(self.id, &self.table, &column, "INSERT"))
            .collect::<OrmResult<Vec<_>>>()?;
        self.columns = Some(columns);
        Ok(self)
    }

    fn arity(&self) -> usize {
        match &self.columns {
            Some(columns) => columns.len(),
            None => self.table.columns().len(),
        }
    }

    /// Add one row of values, matching the target columns one to one.
    ///
    /// Without registered columns, values follow every table column in metadata order.
    pub fn values<V: Into<Value>>(
        &mut self,
        values: impl IntoIterator<Item = V>,
    ) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        let row: Vec<Value> = values.into_iter().map(Into::into).collect();
        let expected = self.arity();
        if row.len() != expected {
            return Err(OrmError::illegal_state(format!(
                "INSERT into {} expects {expected} values per row, got {}",
                self.table.name(),
                row.len()
            )));
        }
        match &mut self.source {
            None => self.source = Some(Source::Values(vec![row])),
            Some(Source::Values(rows)) => rows.push(row),
            Some(Source::Select(_)) => {
                return Err(OrmError::illegal_state(
                    "INSERT already takes its rows from a select",
                ));
            }
        }
        Ok(self)
    }

    /// Take the inserted rows from `source` (`INSERT INTO t (...) SELECT ...`).
    pub fn select(&mut self, source: Select) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        match self.source {
            None => {
                self.source = Some(Source::Select(Box::new(source)));
                Ok(self)
            }
            Some(Source::Values(_)) => Err(OrmError::illegal_state(
                "INSERT already has VALUES rows and cannot also take a select",
            )),
            Some(Source::Select(_)) => {
                Err(OrmError::illegal_state("INSERT select source was already set"))
            }
        }
    }

    /// Set RETURNING columns. They are written unqualified and must belong to the target table.
    pub fn returning(&mut self, columns: impl IntoIterator<Item = Column>) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        let columns: Vec<Column> = columns.into_iter().collect();
        for column in &columns {
            if let Some(foreign) = column
                .table_columns()
                .into_iter()
                .find(|tc| tc.statement() != self.id)
            {
                return Err(OrmError::illegal_state(format!(
                    "RETURNING column {}.{} is not a column of the inserted {}",
                    foreign.table().name(),
                    foreign.name(),
                    self.table.name()
                )));
            }
        }
        self.returning.extend(columns);
        Ok(self)
    }

    /// Drop columns, rows, source and RETURNING list.
    pub fn reset(&mut self) -> &mut Self {
        self.columns = None;
        self.source = None;
        self.returning.clear();
        self.composed = OnceCell::new();
        self
    }

    fn render(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        let source = self.source.as_ref().ok_or_else(|| {
            OrmError::illegal_state(format!(
                "INSERT into {} has neither VALUES nor a select",
                self.table.name()
            ))
        })?;
        c.push("INSERT INTO ").ident(self.table.ident()).push(" (");
        let all: Vec<usize>;
        let columns = match &self.columns {
            Some(columns) => columns,
            None => {
                all = (0..self.table.columns().len()).collect();
                &all
            }
        };
        for (i, &index) in columns.iter().enumerate() {
            if i > 0 {
                c.push(", ");
            }
            c.ident(self.table.columns()[index].ident());
        }
        c.push(")");
        match source {
            Source::Values(rows) => {
                c.push(" VALUES ");
                for (r, row) in rows.iter().enumerate() {
                    if r > 0 {
                        c.push(", ");
                    }
                    c.push("(");
                    for (i, value) in row.iter().enumerate() {
                        if i > 0 {
                            c.push(", ");
                        }
                        c.bind(value.clone());
                    }
                    c.push(")");
                }
            }
            Source::Select(select) => {
                c.push(" ");
                select.render_subquery(c)?;
            }
        }
        c.unqualified(|c| render_returning(c, &self.returning))
    }
}

impl Statement for Insert {
    fn compose(&self) -> OrmResult<ComposedSql> {
        if let Some(composed) = self.composed.get() {
            return Ok(composed.clone());
        }
        let mut c = Composer::new(&self.config);
        self.render(&mut c)?;
        let (sql, binders) = c.finish();
        let composed = ComposedSql::new(sql, binders);
        Ok(self.composed.get_or_init(|| composed).clone())
    }

    fn config(&self) -> &SqlConfig {
        &self.config
    }
}

impl Mutation for Insert {
    fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qb::tests::{person, team};
    use crate::qb::traits::Filtered;

    #[test]
    fn insert_listed_columns() {
        let mut insert = Insert::into(&person());
        let p = insert.table();
        insert
            .columns([p.col("id"), p.col("name")])
            .unwrap()
            .values([Value::from(1_i64), Value::from("ann")])
            .unwrap();
        let composed = insert.compose().unwrap();
        assert_eq!(composed.sql(), "INSERT INTO person (id, name) VALUES ($1, $2)");
        assert_eq!(composed.binders().len(), 2);
    }

    #[test]
    fn insert_defaults_to_every_column() {
        let mut insert = Insert::into(&team());
        insert
            .values([Value::from(1_i64), Value::from("red")])
            .unwrap()
            .values([Value::from(2_i64), Value::from("blue")])
            .unwrap();
        assert_eq!(
            insert.sql().unwrap(),
            "INSERT INTO team (id, name) VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn insert_arity_mismatch_fails() {
        let mut insert = Insert::into(&person());
        let p = insert.table();
        insert.columns([p.col("id"), p.col("name")]).unwrap();
        let err = insert.values([Value::from(1_i64)]).unwrap_err();
        assert!(err.is_illegal_state());

        let mut all = Insert::into(&team());
        assert!(all.values([Value::from(1_i64)]).unwrap_err().is_illegal_state());
    }

    #[test]
    fn insert_from_select() {
        let archive = team();
        let mut source = Select::from(&archive);
        let t = source.table();
        source
            .select(|s| {
                s.col(t.col("id")).col(t.col("name"));
            })
            .unwrap()
            .where_(|w| w.col(t.col("name")).ne("old"))
            .unwrap();

        let mut insert = Insert::into(&team());
        insert.select(source).unwrap();
        assert_eq!(
            insert.sql().unwrap(),
            "INSERT INTO team (id, name) SELECT t0.id, t0.name FROM team t0 WHERE t0.name <> $1"
        );
    }

    #[test]
    fn insert_cannot_mix_values_and_select() {
        let mut insert = Insert::into(&team());
        insert
            .values([Value::from(1_i64), Value::from("red")])
            .unwrap();
        let source = Select::from(&team());
        assert!(insert.select(source).unwrap_err().is_illegal_state());
    }

    #[test]
    fn insert_columns_after_values_fails() {
        let mut insert = Insert::into(&team());
        let t = insert.table();
        insert
            .values([Value::from(1_i64), Value::from("red")])
            .unwrap();
        assert!(insert.columns([t.col("id")]).unwrap_err().is_illegal_state());
    }

    #[test]
    fn insert_foreign_column_fails() {
        let other = Select::from(&team());
        let mut insert = Insert::into(&team());
        let err = insert.columns([other.table().col("id")]).unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn insert_returning_is_unqualified() {
        let mut insert = Insert::into(&team());
        let t = insert.table();
        insert
            .values([Value::from(1_i64), Value::from("red")])
            .unwrap()
            .returning([t.col("id")])
            .unwrap();
        assert!(insert.has_returning());
        assert_eq!(
            insert.sql().unwrap(),
            "INSERT INTO team (id, name) VALUES ($1, $2) RETURNING id"
        );
    }

    #[test]
    fn insert_returning_rejects_foreign_columns() {
        let other = Select::from(&team());
        let o = other.table();
        let mut insert = Insert::into(&team());
        let t = insert.table();
        insert
            .values([Value::from(1_i64), Value::from("red")])
            .unwrap();
        let err = insert.returning([o.col("id")]).unwrap_err();
        assert!(err.is_illegal_state());
        let err = insert
            .returning([t.col("name").coalesce(o.col("name"))])
            .unwrap_err();
        assert!(err.is_illegal_state());
        assert!(!insert.has_returning());

        insert.returning([t.col("name").upper()]).unwrap();
        assert_eq!(
            insert.sql().unwrap(),
            "INSERT INTO team (id, name) VALUES ($1, $2) RETURNING UPPER(name)"
        );
    }

    #[test]
    fn insert_without_rows_fails() {
        let insert = Insert::into(&team());
        assert!(insert.compose().unwrap_err().is_illegal_state());
    }
}
