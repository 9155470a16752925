//! SELECT statement builder.
//!
//! A [`Select`] accumulates its clauses through `&mut self` calls and composes them into one
//! statement on demand. Composition is memoized; once composed the statement refuses further
//! changes until [`Select::reset`] is called.
//!
//! ```ignore
//! let mut select = Select::from(&person);
//! let p = select.table();
//! select
//!     .where_(|w| w.col(p.col("age")).ge(18))?
//!     .order_by(|o| {
//!         o.desc(p.col("age"));
//!     })?
//!     .limit(20)?;
//! let composed = select.compose()?;
//! ```

use super::traits::{Filtered, Statement};
use crate::column::{Column, StatementId, TableRef, count_all};
use crate::condition::{self, ConditionBuilder, HavingClause, Logical, OnClause};
use crate::config::SqlConfig;
use crate::criteria::Criteria;
use crate::decorator::SqlDecorator;
use crate::error::{OrmError, OrmResult};
use crate::meta::{MetadataProvider, TableDef};
use crate::offer::{ClauseList, GroupByOffer, OrderByOffer, OrderItem, SelectItem, SelectOffer};
use crate::sql::ComposedSql;
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProjectionKind {
    Plain,
    Distinct,
    Count,
}

#[derive(Debug, Clone)]
pub(crate) struct Projection {
    pub(crate) kind: ProjectionKind,
    pub(crate) list: ClauseList<SelectItem>,
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
}

impl JoinKind {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Join {
    pub(crate) kind: JoinKind,
    pub(crate) right: Select,
    pub(crate) on: Option<Criteria>,
}

/// Set operation combining two statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOperator {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::IntersectAll => "INTERSECT ALL",
            SetOperator::Except => "EXCEPT",
            SetOperator::ExceptAll => "EXCEPT ALL",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SetOperation {
    pub(crate) operator: SetOperator,
    pub(crate) right: Select,
}

/// Why a statement left row mode.
///
/// A statement starts in row mode: every record maps back to whole table rows. The first
/// clause that makes this impossible switches the statement to aggregate mode for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowModeTrigger {
    Distinct,
    Count,
    GroupBy,
    Having,
    SetOperation,
    /// A projected expression that is not a bare column, or an aliased column.
    Projection,
    /// An ORDER BY expression that is not a bare column.
    Ordering,
    /// A joined statement is itself in aggregate mode.
    JoinedAggregate,
}

impl RowModeTrigger {
    pub(crate) fn detect(select: &Select) -> Option<Self> {
        if let Some(projection) = &select.projection {
            match projection.kind {
                ProjectionKind::Distinct => return Some(Self::Distinct),
                ProjectionKind::Count => return Some(Self::Count),
                ProjectionKind::Plain => {}
            }
            if projection.list.items().any(|item| !item.is_bare()) {
                return Some(Self::Projection);
            }
        }
        if select.group_by.as_ref().is_some_and(|g| !g.is_empty()) {
            return Some(Self::GroupBy);
        }
        if !select.having.is_empty() {
            return Some(Self::Having);
        }
        if !select.set_ops.is_empty() {
            return Some(Self::SetOperation);
        }
        if select
            .order_by
            .as_ref()
            .is_some_and(|o| o.items().any(|item| !item.column.is_bare()))
        {
            return Some(Self::Ordering);
        }
        if select.joins.iter().any(|j| !j.right.is_row_mode()) {
            return Some(Self::JoinedAggregate);
        }
        None
    }
}

impl fmt::Display for RowModeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RowModeTrigger::Distinct => "SELECT DISTINCT",
            RowModeTrigger::Count => "SELECT COUNT(*)",
            RowModeTrigger::GroupBy => "GROUP BY",
            RowModeTrigger::Having => "HAVING",
            RowModeTrigger::SetOperation => "a set operation",
            RowModeTrigger::Projection => "a projected expression",
            RowModeTrigger::Ordering => "an ORDER BY expression",
            RowModeTrigger::JoinedAggregate => "a joined aggregate statement",
        })
    }
}

/// A SELECT statement over one table, plus everything joined into it.
#[derive(Clone)]
pub struct Select {
    pub(crate) id: StatementId,
    pub(crate) table: Arc<TableDef>,
    pub(crate) config: SqlConfig,
    pub(crate) projection: Option<Projection>,
    pub(crate) where_: Criteria,
    pub(crate) group_by: Option<ClauseList<Column>>,
    pub(crate) having: Criteria,
    pub(crate) order_by: Option<ClauseList<OrderItem>>,
    pub(crate) joins: Vec<Join>,
    pub(crate) set_ops: Vec<SetOperation>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) decorators: Vec<Arc<dyn SqlDecorator>>,
    pub(crate) row_mode_exit: Option<RowModeTrigger>,
    pub(crate) composed: OnceCell<ComposedSql>,
    pub(crate) aggregate: OnceCell<ComposedSql>,
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("id", &self.id)
            .field("table", &self.table.name())
            .field("projection", &self.projection)
            .field("where_", &self.where_)
            .field("group_by", &self.group_by)
            .field("having", &self.having)
            .field("order_by", &self.order_by)
            .field("joins", &self.joins)
            .field("set_ops", &self.set_ops)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("decorators", &self.decorators.len())
            .field("row_mode_exit", &self.row_mode_exit)
            .finish_non_exhaustive()
    }
}

impl Select {
    /// Create a SELECT over `table`.
    pub fn from(table: &Arc<TableDef>) -> Self {
        Self::blank(StatementId::next(), Arc::clone(table), SqlConfig::default())
    }

    fn blank(id: StatementId, table: Arc<TableDef>, config: SqlConfig) -> Self {
        Self {
            id,
            table,
            config,
            projection: None,
            where_: Criteria::new(),
            group_by: None,
            having: Criteria::new(),
            order_by: None,
            joins: Vec::new(),
            set_ops: Vec::new(),
            limit: None,
            offset: None,
            decorators: Vec::new(),
            row_mode_exit: None,
            composed: OnceCell::new(),
            aggregate: OnceCell::new(),
        }
    }

    /// Replace the rendering and logging configuration.
    ///
    /// Like every other change, this fails once the statement has been composed.
    pub fn with_config(mut self, config: SqlConfig) -> OrmResult<Self> {
        self.ensure_mutable()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &SqlConfig {
        &self.config
    }

    pub fn id(&self) -> StatementId {
        self.id
    }

    /// Handle to this statement's table, for building columns.
    pub fn table(&self) -> TableRef {
        TableRef::new(Arc::clone(&self.table), self.id)
    }

    pub fn table_def(&self) -> &Arc<TableDef> {
        &self.table
    }

    pub fn is_row_mode(&self) -> bool {
        self.row_mode_exit.is_none()
    }

    /// The clause that switched the statement to aggregate mode, if any.
    pub fn row_mode_exit(&self) -> Option<RowModeTrigger> {
        self.row_mode_exit
    }

    /// Whether the statement has been composed (and is therefore frozen).
    pub fn is_composed(&self) -> bool {
        self.composed.get().is_some() || self.aggregate.get().is_some()
    }

    pub(crate) fn ensure_mutable(&self) -> OrmResult<()> {
        if self.is_composed() {
            return Err(OrmError::illegal_state(format!(
                "select #{} on {} was already composed; call reset() before changing it",
                self.id.get(),
                self.table.name()
            )));
        }
        Ok(())
    }

    pub(crate) fn require_row_mode(&self, operation: &str) -> OrmResult<()> {
        match self.row_mode_exit {
            None => Ok(()),
            Some(trigger) => Err(OrmError::illegal_state(format!(
                "{operation} needs a row-mode statement, but select #{} left row mode because of {trigger}",
                self.id.get()
            ))),
        }
    }

    fn leave_row_mode(&mut self, trigger: RowModeTrigger) {
        if self.row_mode_exit.is_none() {
            tracing::trace!(
                target: "pgfluent.compose",
                statement = self.id.get(),
                %trigger,
                "select left row mode"
            );
            self.row_mode_exit = Some(trigger);
        }
    }

    /// Re-evaluate row mode after a clause changed.
    fn changed(&mut self) {
        if self.row_mode_exit.is_none() {
            if let Some(trigger) = RowModeTrigger::detect(self) {
                self.leave_row_mode(trigger);
            }
        }
    }

    // ==================== SELECT list ====================

    fn set_projection(&mut self, kind: ProjectionKind, list: ClauseList<SelectItem>) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        if self.projection.is_some() {
            return Err(OrmError::illegal_state(format!(
                "the SELECT list of select #{} was already set",
                self.id.get()
            )));
        }
        self.projection = Some(Projection { kind, list });
        self.changed();
        Ok(self)
    }

    /// Set the SELECT list.
    ///
    /// Left empty, the statement projects `*` in aggregate mode and every column of its tables
    /// in row mode.
    pub fn select(&mut self, f: impl FnOnce(&mut SelectOffer)) -> OrmResult<&mut Self> {
        let mut offer = SelectOffer::default();
        f(&mut offer);
        self.set_projection(ProjectionKind::Plain, offer.list)
    }

    /// Set a `SELECT DISTINCT` list.
    pub fn select_distinct(&mut self, f: impl FnOnce(&mut SelectOffer)) -> OrmResult<&mut Self> {
        let mut offer = SelectOffer::default();
        f(&mut offer);
        self.set_projection(ProjectionKind::Distinct, offer.list)
    }

    /// Project `COUNT(*)`.
    pub fn select_count(&mut self) -> OrmResult<&mut Self> {
        let mut offer = SelectOffer::default();
        offer.col(count_all());
        self.set_projection(ProjectionKind::Count, offer.list)
    }

    // ==================== GROUP BY / HAVING / ORDER BY ====================

    pub fn group_by(&mut self, f: impl FnOnce(&mut GroupByOffer)) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        if self.group_by.is_some() {
            return Err(OrmError::illegal_state(format!(
                "the GROUP BY list of select #{} was already set",
                self.id.get()
            )));
        }
        let mut offer = GroupByOffer::default();
        f(&mut offer);
        self.group_by = Some(offer.list);
        self.changed();
        Ok(self)
    }

    /// AND a HAVING condition group into the statement.
    pub fn having<F>(&mut self, f: F) -> OrmResult<&mut Self>
    where
        F: for<'h> FnOnce(
            ConditionBuilder<'h, HavingClause>,
        ) -> OrmResult<Logical<'h, HavingClause>>,
    {
        self.ensure_mutable()?;
        let criteria = condition::collect(f)?;
        self.having.and_group(criteria)?;
        self.changed();
        Ok(self)
    }

    pub fn order_by(&mut self, f: impl FnOnce(&mut OrderByOffer)) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        if self.order_by.is_some() {
            return Err(OrmError::illegal_state(format!(
                "the ORDER BY list of select #{} was already set",
                self.id.get()
            )));
        }
        let mut offer = OrderByOffer::default();
        f(&mut offer);
        self.order_by = Some(offer.list);
        self.changed();
        Ok(self)
    }

    // ==================== JOIN ====================

    /// Ids of this statement and every statement joined into it.
    pub(crate) fn statement_ids(&self) -> Vec<StatementId> {
        let mut ids = vec![self.id];
        for join in &self.joins {
            ids.extend(join.right.statement_ids());
        }
        ids
    }

    fn join(&mut self, kind: JoinKind, right: Select) -> OrmResult<usize> {
        self.ensure_mutable()?;
        if !right.set_ops.is_empty() || right.limit.is_some() || right.offset.is_some() {
            return Err(OrmError::illegal_state(format!(
                "select #{} on {} has set operations, LIMIT or OFFSET and cannot be joined",
                right.id.get(),
                right.table.name()
            )));
        }
        let ids = self.statement_ids();
        if right.statement_ids().iter().any(|id| ids.contains(id)) {
            return Err(OrmError::illegal_state(format!(
                "select #{} is already part of this statement",
                right.id.get()
            )));
        }
        let on = (kind == JoinKind::Cross).then(Criteria::null);
        self.joins.push(Join { kind, right, on });
        self.changed();
        Ok(self.joins.len() - 1)
    }

    pub fn inner_join(&mut self, right: Select) -> OrmResult<JoinOn<'_>> {
        let index = self.join(JoinKind::Inner, right)?;
        Ok(JoinOn { select: self, index })
    }

    pub fn left_outer_join(&mut self, right: Select) -> OrmResult<JoinOn<'_>> {
        let index = self.join(JoinKind::LeftOuter, right)?;
        Ok(JoinOn { select: self, index })
    }

    pub fn right_outer_join(&mut self, right: Select) -> OrmResult<JoinOn<'_>> {
        let index = self.join(JoinKind::RightOuter, right)?;
        Ok(JoinOn { select: self, index })
    }

    pub fn full_outer_join(&mut self, right: Select) -> OrmResult<JoinOn<'_>> {
        let index = self.join(JoinKind::FullOuter, right)?;
        Ok(JoinOn { select: self, index })
    }

    /// `CROSS JOIN right`. The join has no ON criteria and refuses conditions.
    pub fn cross_join(&mut self, right: Select) -> OrmResult<&mut Self> {
        self.join(JoinKind::Cross, right)?;
        Ok(self)
    }

    // ==================== Set operations ====================

    fn set_operation(&mut self, operator: SetOperator, mut right: Select) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        right.leave_row_mode(RowModeTrigger::SetOperation);
        self.set_ops.push(SetOperation { operator, right });
        self.changed();
        Ok(self)
    }

    pub fn union(&mut self, right: Select) -> OrmResult<&mut Self> {
        self.set_operation(SetOperator::Union, right)
    }

    pub fn union_all(&mut self, right: Select) -> OrmResult<&mut Self> {
        self.set_operation(SetOperator::UnionAll, right)
    }

    pub fn intersect(&mut self, right: Select) -> OrmResult<&mut Self> {
        self.set_operation(SetOperator::Intersect, right)
    }

    pub fn intersect_all(&mut self, right: Select) -> OrmResult<&mut Self> {
        self.set_operation(SetOperator::IntersectAll, right)
    }

    pub fn except(&mut self, right: Select) -> OrmResult<&mut Self> {
        self.set_operation(SetOperator::Except, right)
    }

    pub fn except_all(&mut self, right: Select) -> OrmResult<&mut Self> {
        self.set_operation(SetOperator::ExceptAll, right)
    }

    // ==================== Pagination ====================

    pub fn limit(&mut self, n: u64) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        self.limit = Some(n);
        Ok(self)
    }

    pub fn offset(&mut self, n: u64) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        self.offset = Some(n);
        Ok(self)
    }

    /// Pagination helper.
    ///
    /// `page` is 1-based (clamped to >= 1).
    /// `per_page` is clamped to >= 1.
    pub fn paginate(&mut self, page: u64, per_page: u64) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        let size = per_page.max(1);
        self.limit = Some(size);
        self.offset = Some((page.max(1) - 1) * size);
        Ok(self)
    }

    // ==================== Decorators / lifecycle ====================

    /// Register a decorator, applied once to the composed SQL text.
    pub fn apply(&mut self, decorator: impl SqlDecorator + 'static) -> OrmResult<&mut Self> {
        self.ensure_mutable()?;
        self.decorators.push(Arc::new(decorator));
        Ok(self)
    }

    /// Drop every clause, join, set operation and decorator, and the memoized composition.
    ///
    /// The statement keeps its id, so columns obtained from [`Select::table`] stay valid.
    pub fn reset(&mut self) -> &mut Self {
        let table = Arc::clone(&self.table);
        let config = self.config.clone();
        *self = Self::blank(self.id, table, config);
        self
    }

    /// An uncomposed copy with the same id and clauses.
    pub(crate) fn fork(&self) -> Select {
        let mut fork = self.clone();
        fork.composed = OnceCell::new();
        fork.aggregate = OnceCell::new();
        fork
    }
}

impl Statement for Select {
    /// The memoized composition, in row or aggregate mode depending on the clauses.
    fn compose(&self) -> OrmResult<ComposedSql> {
        self.memoized()
    }

    fn config(&self) -> &SqlConfig {
        &self.config
    }
}

impl Filtered for Select {
    fn where_criteria(&mut self) -> OrmResult<&mut Criteria> {
        self.ensure_mutable()?;
        Ok(&mut self.where_)
    }
}

/// Pending join, waiting for its ON criteria.
#[must_use = "a join without ON criteria fails when the statement is composed"]
pub struct JoinOn<'s> {
    select: &'s mut Select,
    index: usize,
}

impl<'s> JoinOn<'s> {
    /// The outer statement's table.
    pub fn left(&self) -> TableRef {
        self.select.table()
    }

    /// The joined statement's table.
    pub fn right(&self) -> TableRef {
        self.select.joins[self.index].right.table()
    }

    /// Build the ON criteria. `f` receives the builder and the left and right tables.
    pub fn on<F>(self, f: F) -> OrmResult<&'s mut Select>
    where
        F: for<'o> FnOnce(
            ConditionBuilder<'o, OnClause>,
            TableRef,
            TableRef,
        ) -> OrmResult<Logical<'o, OnClause>>,
    {
        let (left, right) = (self.left(), self.right());
        let criteria = condition::collect(|on| f(on, left, right))?;
        let join = &mut self.select.joins[self.index];
        match &mut join.on {
            Some(existing) => existing.and_group(criteria)?,
            None => join.on = Some(criteria),
        }
        Ok(self.select)
    }

    /// Join on the foreign key linking the two tables, in either direction.
    pub fn on_relationship(self, provider: &impl MetadataProvider) -> OrmResult<&'s mut Select> {
        let (left, right) = (self.left(), self.right());
        let (relationship, forward) = provider
            .relationship(left.def().name(), right.def().name())
            .ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "no relationship between {} and {}",
                    left.def().name(),
                    right.def().name()
                ))
            })?;
        self.on(move |on, left, right| {
            let (from, to) = if forward { (left, right) } else { (right, left) };
            let mut pairs = relationship
                .from_columns
                .iter()
                .zip(&relationship.to_columns);
            let (first_from, first_to) = pairs.next().ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "relationship {} has no columns",
                    relationship.name
                ))
            })?;
            let mut logical = on.col(from.col(first_from)).eq_col(to.col(first_to))?;
            for (f, t) in pairs {
                logical = logical.and().col(from.col(f)).eq_col(to.col(t))?;
            }
            Ok(logical)
        })
    }
}
