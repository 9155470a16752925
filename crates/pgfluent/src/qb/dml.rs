//! Pieces shared by INSERT, UPDATE and DELETE.

use crate::column::{Column, StatementId};
use crate::criteria::Criteria;
use crate::error::{OrmError, OrmResult};
use crate::meta::TableDef;
use crate::sql::Composer;

/// Metadata index of a target column; it must come from the statement's own table.
pub(crate) fn target_index(
    id: StatementId,
    table: &TableDef,
    column: &Column,
    clause: &str,
) -> OrmResult<usize> {
    let target = column
        .table_column()
        .filter(|tc| tc.statement() == id)
        .ok_or_else(|| {
            OrmError::illegal_state(format!(
                "{clause} target {column} is not a column of {}",
                table.name()
            ))
        })?;
    target.index().ok_or_else(|| {
        OrmError::illegal_state(format!("unknown column {}.{}", table.name(), target.name()))
    })
}

pub(crate) fn frozen(statement: &str, id: StatementId) -> OrmError {
    OrmError::illegal_state(format!(
        "{statement} #{} was already composed; call reset() before changing it",
        id.get()
    ))
}

/// WHERE of a DML statement; without conditions it matches nothing unless `allow_all`.
pub(crate) fn render_where(
    c: &mut Composer<'_>,
    criteria: &Criteria,
    allow_all: bool,
) -> OrmResult<()> {
    match criteria.root() {
        Some(root) => {
            c.push(" WHERE ");
            root.render(c)
        }
        None if allow_all => Ok(()),
        None => {
            c.push(" WHERE 1=0");
            Ok(())
        }
    }
}

pub(crate) fn render_returning(c: &mut Composer<'_>, returning: &[Column]) -> OrmResult<()> {
    if returning.is_empty() {
        return Ok(());
    }
    c.push(" RETURNING ");
    for (i, column) in returning.iter().enumerate() {
        if i > 0 {
            c.push(", ");
        }
        column.render(c)?;
    }
    Ok(())
}
