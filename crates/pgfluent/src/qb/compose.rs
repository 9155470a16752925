//! Rendering of SELECT statements.
//!
//! A statement renders together with every statement joined into it: their tables share one
//! alias scope, their SELECT/GROUP BY/ORDER BY lists are merged by ordinal and their WHERE and
//! HAVING conditions are ANDed. Set operation operands render in their own scope.

use super::select::{Join, JoinKind, ProjectionKind, Select};
use crate::column::{StatementId, TableColumn};
use crate::criteria::{Condition, Criteria, render_conjunction};
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::offer::{OrderItem, merge_ordered};
use crate::row::RowMapping;
use crate::sql::{ComposedSql, Composer};

/// Rendering mode of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Whole table rows, with a [`RowMapping`] back to the tables.
    Row,
    /// Exactly the accumulated clauses.
    Aggregate,
}

/// A statement taking part in one FROM clause.
pub(crate) struct Participant<'s> {
    pub(crate) select: &'s Select,
    join: Option<&'s Join>,
}

impl Select {
    /// This statement followed by its joined statements, depth first (FROM order).
    pub(crate) fn participants(&self) -> Vec<Participant<'_>> {
        let mut out = vec![Participant {
            select: self,
            join: None,
        }];
        self.collect_joined(&mut out);
        out
    }

    fn collect_joined<'s>(&'s self, out: &mut Vec<Participant<'s>>) {
        for join in &self.joins {
            out.push(Participant {
                select: &join.right,
                join: Some(join),
            });
            join.right.collect_joined(out);
        }
    }

    pub(crate) fn mode(&self) -> Mode {
        if self.is_row_mode() {
            Mode::Row
        } else {
            Mode::Aggregate
        }
    }

    /// The memoized composition in the statement's own mode, decorators applied.
    pub(crate) fn memoized(&self) -> OrmResult<ComposedSql> {
        if let Some(composed) = self.composed.get() {
            return Ok(composed.clone());
        }
        let composed = self.decorate(self.compose_with(self.mode(), None)?);
        Ok(self.composed.get_or_init(|| composed).clone())
    }

    /// The memoized aggregate-form composition, decorators applied.
    pub(crate) fn aggregate_memoized(&self) -> OrmResult<ComposedSql> {
        if let Some(composed) = self.aggregate.get() {
            return Ok(composed.clone());
        }
        let composed = self.decorate(self.compose_with(Mode::Aggregate, None)?);
        Ok(self.aggregate.get_or_init(|| composed).clone())
    }

    /// Compose without memoizing or decorating. `order` replaces the merged ORDER BY list.
    pub(crate) fn compose_with(
        &self,
        mode: Mode,
        order: Option<&[OrderItem]>,
    ) -> OrmResult<ComposedSql> {
        let mut c = Composer::new(&self.config);
        let mapping = self.render(&mut c, mode, order)?;
        let (sql, binders) = c.finish();
        tracing::debug!(
            target: "pgfluent.compose",
            statement = self.id.get(),
            mode = ?mode,
            binders = binders.len(),
            "composed select"
        );
        let composed = ComposedSql::new(sql, binders);
        Ok(match mapping {
            Some(mapping) => composed.with_mapping(mapping),
            None => composed,
        })
    }

    pub(crate) fn decorate(&self, composed: ComposedSql) -> ComposedSql {
        if self.decorators.is_empty() {
            return composed;
        }
        composed.map_sql(|sql| {
            self.decorators
                .iter()
                .fold(sql, |sql, decorator| decorator.decorate(sql))
        })
    }

    /// Render as a nested statement: aggregate form, `*` for an empty SELECT list.
    pub(crate) fn render_subquery(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        c.qualified(|c| self.render(c, Mode::Aggregate, None).map(|_| ()))
    }

    fn render(
        &self,
        c: &mut Composer<'_>,
        mode: Mode,
        order: Option<&[OrderItem]>,
    ) -> OrmResult<Option<RowMapping>> {
        let parts = self.participants();
        let ids: Vec<StatementId> = parts.iter().map(|p| p.select.id).collect();
        let mapping = c.scoped(ids.iter().copied(), |c| {
            let mapping = match mode {
                Mode::Row => Some(self.render_row_projection(c, &parts, &ids)?),
                Mode::Aggregate => {
                    self.render_projection(c, &parts)?;
                    None
                }
            };
            c.push(" FROM ");
            self.render_from(c, &parts)?;
            render_where(c, &parts)?;
            render_group_by(c, &parts)?;
            render_having(c, &parts)?;
            if self.set_ops.is_empty() {
                self.render_tail(c, order, &parts)?;
            }
            Ok(mapping)
        })?;
        if !self.set_ops.is_empty() {
            self.render_set_operations(c)?;
            c.unqualified(|c| self.render_tail(c, order, &parts))?;
        }
        Ok(mapping)
    }

    fn render_projection(&self, c: &mut Composer<'_>, parts: &[Participant<'_>]) -> OrmResult<()> {
        c.push("SELECT ");
        let distinct = parts.iter().any(|p| {
            p.select
                .projection
                .as_ref()
                .is_some_and(|pr| pr.kind == ProjectionKind::Distinct)
        });
        if distinct {
            c.push("DISTINCT ");
        }
        let items = merge_ordered(
            parts
                .iter()
                .filter_map(|p| p.select.projection.as_ref().map(|pr| &pr.list)),
        );
        if items.is_empty() {
            c.push("*");
            return Ok(());
        }
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                c.push(", ");
            }
            item.column.render(c)?;
            if let Some(alias) = &item.alias {
                let alias = Ident::parse_name(alias)?;
                c.push(" AS ").ident(&alias);
            }
        }
        Ok(())
    }

    /// Entity projection: explicit bare columns in ordinal order, then every column of tables
    /// without an explicit projection, then missing primary-key columns.
    fn render_row_projection(
        &self,
        c: &mut Composer<'_>,
        parts: &[Participant<'_>],
        ids: &[StatementId],
    ) -> OrmResult<RowMapping> {
        fn pick(picked: &mut Vec<TableColumn>, column: TableColumn) {
            if !picked.iter().any(|p| p.same_as(&column)) {
                picked.push(column);
            }
        }

        let explicit = merge_ordered(
            parts
                .iter()
                .filter_map(|p| p.select.projection.as_ref().map(|pr| &pr.list)),
        );
        let mut picked: Vec<TableColumn> = Vec::new();
        for item in explicit {
            let column = item.column.table_column().ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "row-mode projection of select #{} holds the expression {}",
                    self.id.get(),
                    item.column
                ))
            })?;
            if column.index().is_none() {
                column.def()?;
            }
            pick(&mut picked, column.clone());
        }
        for p in parts {
            if picked.iter().all(|col| col.statement() != p.select.id) {
                let table = p.select.table();
                for index in 0..p.select.table.columns().len() {
                    pick(&mut picked, table.column_at(index));
                }
            }
        }
        for p in parts {
            let table = p.select.table();
            for &index in p.select.table.primary_key() {
                pick(&mut picked, table.column_at(index));
            }
        }

        c.push("SELECT ");
        let mut mapping = RowMapping::default();
        for (i, column) in picked.iter().enumerate() {
            if i > 0 {
                c.push(", ");
            }
            c.column(column)?;
            let index = column.index().ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "unknown column {}.{}",
                    column.table().name(),
                    column.name()
                ))
            })?;
            mapping.push_column(column.statement(), column.table(), index);
        }
        mapping.sort_tables(ids);
        Ok(mapping)
    }

    fn render_from(&self, c: &mut Composer<'_>, parts: &[Participant<'_>]) -> OrmResult<()> {
        c.table(&self.table, self.id)?;
        for p in parts {
            let Some(join) = p.join else {
                continue;
            };
            c.push(" ").push(join.kind.keyword()).push(" ");
            c.table(&p.select.table, p.select.id)?;
            if join.kind == JoinKind::Cross {
                continue;
            }
            match join.on.as_ref().and_then(Criteria::root) {
                Some(on) => {
                    c.push(" ON ");
                    on.render(c)?;
                }
                None => {
                    return Err(OrmError::illegal_state(format!(
                        "{} of {} (select #{}) has no ON criteria",
                        join.kind.keyword(),
                        p.select.table.name(),
                        p.select.id.get()
                    )));
                }
            }
        }
        Ok(())
    }

    fn render_set_operations(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        for op in &self.set_ops {
            let right = &op.right;
            let wrap = right.order_by.is_some()
                || right.limit.is_some()
                || right.offset.is_some()
                || !right.set_ops.is_empty();
            c.push(" ").push(op.operator.keyword()).push(" ");
            if wrap {
                c.push("(");
            }
            c.qualified(|c| right.render(c, Mode::Aggregate, None))?;
            if wrap {
                c.push(")");
            }
        }
        Ok(())
    }

    /// ORDER BY, LIMIT and OFFSET.
    fn render_tail(
        &self,
        c: &mut Composer<'_>,
        order: Option<&[OrderItem]>,
        parts: &[Participant<'_>],
    ) -> OrmResult<()> {
        let items: Vec<&OrderItem> = match order {
            Some(order) => order.iter().collect(),
            None => merge_ordered(parts.iter().filter_map(|p| p.select.order_by.as_ref())),
        };
        if !items.is_empty() {
            c.push(" ORDER BY ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    c.push(", ");
                }
                item.column.render(c)?;
                c.push(item.suffix());
            }
        }
        if let Some(limit) = self.limit {
            c.push(" LIMIT ").push(&limit.to_string());
        }
        if let Some(offset) = self.offset {
            c.push(" OFFSET ").push(&offset.to_string());
        }
        Ok(())
    }

    // ==================== COUNT ====================

    /// Whether COUNT can replace the projection directly instead of wrapping the statement.
    fn counts_directly(&self, parts: &[Participant<'_>]) -> bool {
        self.set_ops.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
            && parts.iter().all(|p| {
                p.select.group_by.as_ref().is_none_or(|g| g.is_empty())
                    && p.select.having.is_empty()
                    && p.select
                        .projection
                        .as_ref()
                        .is_none_or(|pr| pr.kind != ProjectionKind::Distinct)
            })
    }

    /// The COUNT variant of the filtered statement.
    ///
    /// With `distinct_root`, counts distinct primary keys of the root table (one-to-many).
    pub(crate) fn compose_count(&self, distinct_root: bool) -> OrmResult<ComposedSql> {
        let parts = self.participants();
        let mut c = Composer::new(&self.config);
        if self.counts_directly(&parts) {
            let ids = parts.iter().map(|p| p.select.id);
            c.scoped(ids, |c| {
                c.push("SELECT ");
                if distinct_root && self.table.has_primary_key() {
                    self.render_distinct_key_count(c)?;
                } else {
                    c.push("COUNT(*)");
                }
                c.push(" FROM ");
                self.render_from(c, &parts)?;
                render_where(c, &parts)
            })?;
        } else {
            c.push("SELECT COUNT(*) FROM (");
            self.render(&mut c, Mode::Aggregate, None)?;
            c.push(") AS q");
        }
        let (sql, binders) = c.finish();
        Ok(ComposedSql::new(sql, binders))
    }

    fn render_distinct_key_count(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        let table = self.table();
        let key = self.table.primary_key();
        c.push("COUNT(DISTINCT ");
        if key.len() > 1 {
            c.push("(");
        }
        for (i, &index) in key.iter().enumerate() {
            if i > 0 {
                c.push(", ");
            }
            c.column(&table.column_at(index))?;
        }
        if key.len() > 1 {
            c.push(")");
        }
        c.push(")");
        Ok(())
    }
}

fn conditions<'s>(
    parts: &'s [Participant<'_>],
    criteria: impl Fn(&'s Select) -> &'s Criteria,
) -> Vec<&'s Condition> {
    parts
        .iter()
        .filter_map(|p| criteria(p.select).root())
        .collect()
}

fn render_where(c: &mut Composer<'_>, parts: &[Participant<'_>]) -> OrmResult<()> {
    let conds = conditions(parts, |s| &s.where_);
    if !conds.is_empty() {
        c.push(" WHERE ");
        render_conjunction(&conds, c)?;
    }
    Ok(())
}

fn render_having(c: &mut Composer<'_>, parts: &[Participant<'_>]) -> OrmResult<()> {
    let conds = conditions(parts, |s| &s.having);
    if !conds.is_empty() {
        c.push(" HAVING ");
        render_conjunction(&conds, c)?;
    }
    Ok(())
}

fn render_group_by(c: &mut Composer<'_>, parts: &[Participant<'_>]) -> OrmResult<()> {
    let items = merge_ordered(parts.iter().filter_map(|p| p.select.group_by.as_ref()));
    if !items.is_empty() {
        c.push(" GROUP BY ");
        for (i, column) in items.iter().enumerate() {
            if i > 0 {
                c.push(", ");
            }
            column.render(c)?;
        }
    }
    Ok(())
}
