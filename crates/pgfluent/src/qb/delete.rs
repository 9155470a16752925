//! DELETE statement builder.

use super::dml::{frozen, render_returning, render_where};
use super::traits::{Filtered, Mutation, Statement};
use crate::column::{Column, StatementId, TableRef};
use crate::config::SqlConfig;
use crate::criteria::Criteria;
use crate::error::OrmResult;
use crate::meta::TableDef;
use crate::sql::{ComposedSql, Composer};
use std::cell::OnceCell;
use std::sync::Arc;

/// DELETE statement builder.
///
/// # Safety
/// By default, DELETE without WHERE conditions generates `WHERE 1=0` (no-op).
/// Use [`Delete::allow_all`] to delete every row.
#[derive(Debug, Clone)]
pub struct Delete {
    id: StatementId,
    table: Arc<TableDef>,
    config: SqlConfig,
    where_: Criteria,
    allow_all: bool,
    returning: Vec<Column>,
    composed: OnceCell<ComposedSql>,
}

impl Delete {
    /// Create a DELETE from `table`.
    pub fn from(table: &Arc<TableDef>) -> Self {
        Self {
            id: StatementId::next(),
            table: Arc::clone(table),
            config: SqlConfig::default(),
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

    pub fn table(&self) -> TableRef {
        TableRef::new(Arc::clone(&self.table), self.id)
    }

    fn ensure_mutable(&self) -> OrmResult<()> {
        match self.composed.get() {
            Some(_) => Err(frozen("delete", self.id)),
            None => Ok(()),
        }
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

    pub fn reset(&mut self) -> &mut Self {
        self.where_ = Criteria::new();
        self.allow_all = false;
        self.returning.clear();
        self.composed = OnceCell::new();
        self
    }
}

impl Filtered for Delete {
    fn where_criteria(&mut self) -> OrmResult<&mut Criteria> {
        self.ensure_mutable()?;
        Ok(&mut self.where_)
    }
}

impl Statement for Delete {
    fn compose(&self) -> OrmResult<ComposedSql> {
        if let Some(composed) = self.composed.get() {
            return Ok(composed.clone());
        }
        let mut c = Composer::new(&self.config);
        c.scoped([self.id], |c| {
            c.push("DELETE FROM ");
            c.table(&self.table, self.id)?;
            render_where(c, &self.where_, self.allow_all)?;
            render_returning(c, &self.returning)
        })?;
        let (sql, binders) = c.finish();
        let composed = ComposedSql::new(sql, binders);
        Ok(self.composed.get_or_init(|| composed).clone())
    }

    fn config(&self) -> &SqlConfig {
        &self.config
    }
}

impl Mutation for Delete {
    fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }
}
