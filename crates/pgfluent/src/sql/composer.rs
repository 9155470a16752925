use super::writer::SqlWriter;
use crate::column::{StatementId, TableColumn};
use crate::config::SqlConfig;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::meta::TableDef;
use crate::value::{Binder, Value};

/// Rendering state shared by every clause of one composition.
///
/// Tables receive aliases (`t0`, `t1`, ...) when their statement's scope is opened. Scopes
/// nest: a subquery sees its own tables first, then those of every enclosing statement.
pub(crate) struct Composer<'c> {
    config: &'c SqlConfig,
    out: SqlWriter,
    scopes: Vec<Vec<(StatementId, usize)>>,
    next_alias: usize,
    qualify: bool,
}

impl<'c> Composer<'c> {
    pub(crate) fn new(config: &'c SqlConfig) -> Self {
        Self {
            config,
            out: SqlWriter::new(),
            scopes: Vec::new(),
            next_alias: 0,
            qualify: true,
        }
    }

    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.out.push(sql);
        self
    }

    pub(crate) fn bind(&mut self, value: Value) -> &mut Self {
        self.out.push_bind(value);
        self
    }

    pub(crate) fn ident(&mut self, ident: &Ident) -> &mut Self {
        self.out.push_ident(ident, self.config.quote_identifiers);
        self
    }

    /// Open a scope assigning the next aliases to `statements`, in order.
    pub(crate) fn open_scope(
        &mut self,
        statements: impl IntoIterator<Item = StatementId>,
    ) -> OrmResult<()> {
        let mut scope: Vec<(StatementId, usize)> = Vec::new();
        for id in statements {
            if scope.iter().any(|(s, _)| *s == id) || self.alias(id).is_some() {
                return Err(OrmError::illegal_state(format!(
                    "statement #{} appears more than once in the same query",
                    id.get()
                )));
            }
            scope.push((id, self.next_alias));
            self.next_alias += 1;
        }
        self.scopes.push(scope);
        Ok(())
    }

    pub(crate) fn close_scope(&mut self) {
        self.scopes.pop();
    }

    /// Run `f` with `statements` in scope.
    pub(crate) fn scoped<T>(
        &mut self,
        statements: impl IntoIterator<Item = StatementId>,
        f: impl FnOnce(&mut Self) -> OrmResult<T>,
    ) -> OrmResult<T> {
        self.open_scope(statements)?;
        let result = f(self);
        self.close_scope();
        result
    }

    fn alias(&self, id: StatementId) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(s, _)| *s == id)
            .map(|(_, alias)| *alias)
    }

    fn push_alias(&mut self, alias: usize) {
        let config = self.config;
        self.out.push(&config.alias_prefix);
        self.out.push(&alias.to_string());
    }

    /// Write `table alias` for a FROM or JOIN item.
    pub(crate) fn table(&mut self, table: &TableDef, statement: StatementId) -> OrmResult<()> {
        let alias = self.alias(statement).ok_or_else(|| {
            OrmError::illegal_state(format!(
                "table {} of statement #{} has no alias in this query",
                table.name(),
                statement.get()
            ))
        })?;
        self.ident(table.ident());
        self.out.push(" ");
        self.push_alias(alias);
        Ok(())
    }

    /// Write a table column, qualified by its table alias unless inside [`Composer::unqualified`].
    pub(crate) fn column(&mut self, column: &TableColumn) -> OrmResult<()> {
        let def = column.def()?;
        if self.qualify {
            let alias = self.alias(column.statement()).ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "column {}.{} does not belong to this statement, a joined statement or an enclosing statement",
                    column.table().name(),
                    column.name()
                ))
            })?;
            self.push_alias(alias);
            self.out.push(".");
        }
        self.out.push_ident(def.ident(), self.config.quote_identifiers);
        Ok(())
    }

    /// Render with bare column names (INSERT targets, ORDER BY over set operations).
    pub(crate) fn unqualified<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> OrmResult<T>,
    ) -> OrmResult<T> {
        self.with_qualify(false, f)
    }

    /// Render with alias-qualified columns again (subqueries inside an unqualified section).
    pub(crate) fn qualified<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> OrmResult<T>,
    ) -> OrmResult<T> {
        self.with_qualify(true, f)
    }

    fn with_qualify<T>(
        &mut self,
        qualify: bool,
        f: impl FnOnce(&mut Self) -> OrmResult<T>,
    ) -> OrmResult<T> {
        let saved = std::mem::replace(&mut self.qualify, qualify);
        let result = f(self);
        self.qualify = saved;
        result
    }

    pub(crate) fn finish(self) -> (String, Vec<Binder>) {
        self.out.finish()
    }
}
