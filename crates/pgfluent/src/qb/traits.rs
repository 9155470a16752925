//! Trait definitions for statements.

use crate::client::{GenericClient, RecordSet};
use crate::condition::{self, Logical, Where, WhereClause};
use crate::config::SqlConfig;
use crate::criteria::Criteria;
use crate::error::{OrmError, OrmResult};
use crate::query::Prepared;
use crate::sql::ComposedSql;
use crate::value::{Binder, Value};

/// Base trait for every statement.
pub trait Statement {
    /// Compose the statement. Idempotent: repeated calls return the same SQL and binders.
    fn compose(&self) -> OrmResult<ComposedSql>;

    /// Rendering and logging configuration.
    fn config(&self) -> &SqlConfig;

    /// Debug helper to get the SQL string.
    fn sql(&self) -> OrmResult<String> {
        Ok(self.compose()?.sql().to_string())
    }

    fn binders(&self) -> OrmResult<Vec<Binder>> {
        Ok(self.compose()?.binders().to_vec())
    }
}

/// Re-execution with new parameter values, without rebuilding the SQL text.
pub trait Reproducible: Statement {
    /// A prepared copy with `values` re-extracted through the original binder kinds.
    fn reproduce(&self, values: Vec<Value>) -> OrmResult<Prepared> {
        let composed = self.compose()?.rebind(values)?;
        Ok(Prepared::new(composed, self.config().clone()))
    }

    /// A prepared copy with the original values.
    fn reproduce_same(&self) -> OrmResult<Prepared> {
        Ok(Prepared::new(self.compose()?, self.config().clone()))
    }
}

impl<T: Statement + ?Sized> Reproducible for T {}

/// Statements with a WHERE clause.
pub trait Filtered {
    /// The WHERE accumulator; fails if the statement can no longer change.
    fn where_criteria(&mut self) -> OrmResult<&mut Criteria>;

    /// AND a WHERE condition group into the statement.
    ///
    /// Every call builds its conditions in a fresh accumulator, so
    /// `where_(a OR b)` followed by `where_(c)` yields `(a OR b) AND c`.
    fn where_<F>(&mut self, f: F) -> OrmResult<&mut Self>
    where
        Self: Sized,
        F: for<'w> FnOnce(Where<'w>) -> OrmResult<Logical<'w, WhereClause>>,
    {
        let target = self.where_criteria()?;
        let criteria = condition::collect(f)?;
        target.and_group(criteria)?;
        Ok(self)
    }
}

/// INSERT, UPDATE and DELETE.
pub trait Mutation: Statement {
    /// Whether a RETURNING list was set.
    fn has_returning(&self) -> bool;

    /// Execute and return the number of affected rows.
    fn execute(
        &self,
        client: &impl GenericClient,
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send {
        let composed = self.compose();
        let config = self.config().clone();
        async move {
            let composed = composed?;
            config.log_sql("execute", &composed);
            client.execute(composed.sql(), &composed.params_ref()).await
        }
    }

    /// Execute and return the RETURNING records.
    fn fetch_returning(
        &self,
        client: &impl GenericClient,
    ) -> impl std::future::Future<Output = OrmResult<RecordSet>> + Send {
        let composed = if self.has_returning() {
            self.compose()
        } else {
            Err(OrmError::illegal_state(
                "fetch_returning() needs a RETURNING list",
            ))
        };
        let config = self.config().clone();
        async move {
            let composed = composed?;
            config.log_sql("fetch_returning", &composed);
            client.query(composed.sql(), &composed.params_ref()).await
        }
    }
}
