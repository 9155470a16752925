//! UPDATE statement builder.

use super::dml::{frozen, render_returning, render_where, target_index};
use super::select::Select;
use super::traits::{Filtered, Mutation, Statement};
use crate::column::{Column, StatementId, TableRef};
use crate::config::SqlConfig;
use crate::criteria::Criteria;
use crate::error::{OrmError, OrmResult};
use crate::meta::TableDef;
use crate::sql::{ComposedSql, Composer};
use crate::value::Value;
use std::cell::OnceCell;
use std::sync::Arc;

/// One assignment of the SET clause.
#[derive(Debug, Clone)]
enum SetElement {
    Value { column: usize, value: Value },
    Expr { column: usize, expr: Column },
    Select { columns: Vec<usize>, source: Box<Select> },
}

/// UPDATE statement builder.
///
/// Without WHERE conditions the statement renders `WHERE 1=0` unless
/// [`Update::allow_all`] was called.
#[derive(Debug, Clone)]
pub struct Update {
    id: StatementId,
    table: Arc<TableDef>,
    config: SqlConfig,
    sets: Vec<SetElement>,
    where_: Criteria,
    allow_all: bool,
    returning: Vec<Column>,
    composed: OnceCell<ComposedSql>,
}

impl Update {
    /// Create an UPDATE of `table`.
    pub fn table(table: &Arc<TableDef>) -> Self {
        Self {
            id: StatementId::next(),
            table: Arc::clone(table),
            config: SqlConfig::default(),
            sets: Vec::new(),
            where_: Criteria::new(),
            allow_all: false,
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

    /// Handle to the updated table, for building columns.
    pub fn target(&self) -> TableRef {
        TableRef::new(Arc::clone(&self.table), self.id)
    }

    fn ensure_mutable(&self) -> OrmResult<()> {
        match self.composed.get() {
            Some(_) => Err(frozen("update", self.id)),
            None => Ok(()),
        }
    }

    fn target_index(&self, column: &Column) -> OrmResult<usize> {
        target_index(self.id, &self.table, column, "SET")
    }

    // ==================== SET ====================

    /// `SET column = value`
    pub fn set(&mut self, column: Column, value: impl Into<Value>) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        let column = self.target_index(&column)?;
        self.sets.push(SetElement::Value {
            column,
            value: value.into(),
        });
        Ok(self)
    }

    /// `SET column = expression`, for example `age + 1`.
    pub fn set_expr(&mut self, column: Column, expr: Column) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        if expr.is_aggregate() {
            return Err(OrmError::illegal_state(format!(
                "aggregate expression {expr} is not allowed in SET"
            )));
        }
        let column = self.target_index(&column)?;
        self.sets.push(SetElement::Expr { column, expr });
        Ok(self)
    }

    /// `SET (a, b) = (SELECT ...)`
    pub fn set_select(
        &mut self,
        columns: impl IntoIterator<Item = Column>,
        source: Select,
    ) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        let columns = columns
            .into_iter()
            .map(|column| self.target_index(&column))
            .collect::<OrmResult<Vec<_>>>()?;
        if columns.is_empty() {
            return Err(OrmError::illegal_state("SET from a select needs target columns"));
        }
        self.sets.push(SetElement::Select {
            columns,
            source: Box::new(source),
        });
        Ok(self)
    }

    /// Allow the statement to run without WHERE conditions.
    pub fn allow_all(&mut self) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        self.allow_all = true;
        Ok(self)
    }

    /// Set RETURNING columns.
    pub fn returning(&mut self, columns: impl IntoIterator<Item = Column>) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        self.returning.extend(columns);
        Ok(self)
    }

    /// Drop assignments, conditions and RETURNING list.
    pub fn reset(&mut self) -> &mut Self {
        self.sets.clear();
        self.where_ = Criteria::new();
        self.allow_all = false;
        self.returning.clear();
        self.composed = OnceCell::new();
        self
    }

    fn render(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        if self.sets.is_empty() {
            return Err(OrmError::illegal_state(format!(
                "UPDATE of {} has no SET assignments",
                self.table.name()
            )));
        }
        c.scoped([self.id], |c| {
            c.push("UPDATE ");
            c.table(&self.table, self.id)?;
            c.push(" SET ");
            for (i, set) in self.sets.iter().enumerate() {
                if i > 0 {
                    c.push(", ");
                }
                match set {
                    SetElement::Value { column, value } => {
                        c.ident(self.table.columns()[*column].ident()).push(" = ");
                        c.bind(value.clone());
                    }
                    SetElement::Expr { column, expr } => {
                        c.ident(self.table.columns()[*column].ident()).push(" = ");
                        expr.render(c)?;
                    }
                    SetElement::Select { columns, source } => {
                        if let [column] = columns.as_slice() {
                            c.ident(self.table.columns()[*column].ident());
                        } else {
                            c.push("(");
                            for (j, column) in columns.iter().enumerate() {
                                if j > 0 {
                                    c.push(", ");
                                }
                                c.ident(self.table.columns()[*column].ident());
                            }
                            c.push(")");
                        }
                        c.push(" = (");
                        source.render_subquery(c)?;
                        c.push(")");
                    }
                }
            }
            render_where(c, &self.where_, self.allow_all)?;
            render_returning(c, &self.returning)
        })
    }
}

impl Filtered for Update {
    fn where_criteria(&mut self) -> OrmResult<&mut Criteria> {
        self.ensure_mutable()?;
        Ok(&mut self.where_)
    }
}

impl Statement for Update {
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

impl Mutation for Update {
    fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }
}
