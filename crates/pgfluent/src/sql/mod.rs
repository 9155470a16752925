//! Composition output: SQL text with `$n` placeholders plus the ordered binders.

mod composer;
mod writer;

pub(crate) use composer::Composer;

use crate::error::{OrmError, OrmResult};
use crate::row::RowMapping;
use crate::value::{Binder, Value};
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A composed statement: shared SQL text, ordered binders and, for row-mode selects, the
/// mapping from record positions back to table columns.
#[derive(Debug, Clone)]
pub struct ComposedSql {
    sql: Arc<str>,
    binders: Vec<Binder>,
    mapping: Option<Arc<RowMapping>>,
}

impl ComposedSql {
    pub(crate) fn new(sql: String, binders: Vec<Binder>) -> Self {
        Self {
            sql: sql.into(),
            binders,
            mapping: None,
        }
    }

    pub(crate) fn with_mapping(mut self, mapping: RowMapping) -> Self {
        self.mapping = Some(Arc::new(mapping));
        self
    }

    pub(crate) fn map_sql(self, f: impl FnOnce(String) -> String) -> Self {
        Self {
            sql: f(self.sql.to_string()).into(),
            ..self
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The SQL text, shared with every reproduction of this statement.
    pub fn shared_sql(&self) -> Arc<str> {
        Arc::clone(&self.sql)
    }

    pub fn binders(&self) -> &[Binder] {
        &self.binders
    }

    pub fn mapping(&self) -> Option<&Arc<RowMapping>> {
        self.mapping.as_ref()
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.binders
            .iter()
            .map(|b| b as &(dyn ToSql + Sync))
            .collect()
    }

    /// Same SQL text, binders re-extracted from `values` through the original binder kinds.
    pub(crate) fn rebind(&self, values: Vec<Value>) -> OrmResult<ComposedSql> {
        if values.len() != self.binders.len() {
            return Err(OrmError::illegal_state(format!(
                "statement takes {} parameters, {} values were supplied",
                self.binders.len(),
                values.len()
            )));
        }
        let binders = self
            .binders
            .iter()
            .zip(values)
            .enumerate()
            .map(|(i, (binder, value))| binder.rebind(i + 1, value))
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(ComposedSql {
            sql: Arc::clone(&self.sql),
            binders,
            mapping: self.mapping.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebind_keeps_text_and_checks_count() {
        let composed = ComposedSql::new(
            "SELECT 1 WHERE $1 = $2".to_string(),
            vec![Binder::new(Value::Int8(1)), Binder::new(Value::Text("a".into()))],
        );
        let again = composed
            .rebind(vec![Value::Int4(2), Value::Text("b".into())])
            .unwrap();
        assert!(Arc::ptr_eq(&composed.shared_sql(), &again.shared_sql()));
        assert_eq!(again.binders()[0].value(), &Value::Int8(2));

        let err = composed.rebind(vec![Value::Int8(1)]).unwrap_err();
        assert!(err.is_illegal_state());
    }
}
