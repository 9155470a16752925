//! Columns: bare table columns and templated SQL fragments.
//!
//! Every statement gets a process-unique [`StatementId`]. A [`TableRef`] obtained from a
//! statement stamps that id onto the columns it hands out, so composition can tell which table
//! occurrence a column refers to (self-joins, correlated subqueries) and reject columns that do
//! not belong to the statement at all.
//!
//! ```ignore
//! let p = select.table();
//! let total = Column::template("{0} * {1}", vec![p.col("price").into(), Value::from(2).into()]);
//! let oldest = p.col("age").max();
//! ```

use crate::error::{OrmError, OrmResult};
use crate::meta::{ColumnDef, TableDef};
use crate::qb::Select;
use crate::sql::Composer;
use crate::value::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STATEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one statement builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(u64);

impl StatementId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STATEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A table as it occurs in one statement.
#[derive(Debug, Clone)]
pub struct TableRef {
    table: Arc<TableDef>,
    statement: StatementId,
}

impl TableRef {
    pub(crate) fn new(table: Arc<TableDef>, statement: StatementId) -> Self {
        Self { table, statement }
    }

    pub fn def(&self) -> &Arc<TableDef> {
        &self.table
    }

    pub fn statement(&self) -> StatementId {
        self.statement
    }

    /// A column of this table occurrence.
    ///
    /// Unknown names are reported when the statement is composed.
    pub fn col(&self, name: &str) -> Column {
        Column::from_table(TableColumn {
            table: Arc::clone(&self.table),
            statement: self.statement,
            index: self.table.column_index(name),
            name: name.into(),
        })
    }

    /// Every column, in metadata order.
    pub fn columns(&self) -> Vec<Column> {
        (0..self.table.columns().len())
            .map(|i| self.col_at(i))
            .collect()
    }

    /// The primary-key columns, in key order.
    pub fn primary_key(&self) -> Vec<Column> {
        self.table
            .primary_key()
            .iter()
            .map(|&i| self.col_at(i))
            .collect()
    }

    pub(crate) fn col_at(&self, index: usize) -> Column {
        Column::from_table(self.column_at(index))
    }

    pub(crate) fn column_at(&self, index: usize) -> TableColumn {
        TableColumn {
            table: Arc::clone(&self.table),
            statement: self.statement,
            index: Some(index),
            name: self.table.columns()[index].name().into(),
        }
    }
}

/// A column of a table occurrence.
#[derive(Debug, Clone)]
pub struct TableColumn {
    table: Arc<TableDef>,
    statement: StatementId,
    index: Option<usize>,
    name: Arc<str>,
}

impl TableColumn {
    pub fn table(&self) -> &Arc<TableDef> {
        &self.table
    }

    pub fn statement(&self) -> StatementId {
        self.statement
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the column in its table's metadata, `None` for unknown names.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) fn def(&self) -> OrmResult<&ColumnDef> {
        self.index
            .and_then(|i| self.table.columns().get(i))
            .ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "unknown column {}.{}",
                    self.table.name(),
                    self.name
                ))
            })
    }

    pub(crate) fn same_as(&self, other: &TableColumn) -> bool {
        self.statement == other.statement && self.index.is_some() && self.index == other.index
    }
}

/// Right-hand operand of a comparison or an argument of a template.
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    Column(Column),
    Subquery(Box<Select>),
}

impl Operand {
    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Value(value.into())
    }

    pub(crate) fn is_aggregate(&self) -> bool {
        matches!(self, Operand::Column(c) if c.is_aggregate())
    }

    pub(crate) fn render(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        match self {
            Operand::Value(v) => {
                c.bind(v.clone());
                Ok(())
            }
            Operand::Column(col) => col.render(c),
            Operand::Subquery(select) => {
                c.push("(");
                select.render_subquery(c)?;
                c.push(")");
                Ok(())
            }
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<Column> for Operand {
    fn from(column: Column) -> Self {
        Operand::Column(column)
    }
}

impl From<Select> for Operand {
    fn from(select: Select) -> Self {
        Operand::Subquery(Box::new(select))
    }
}

#[derive(Debug, Clone)]
enum Repr {
    Table(TableColumn),
    Template {
        template: Arc<str>,
        args: Vec<Operand>,
        aggregate: bool,
    },
}

/// A table column or a templated SQL fragment.
///
/// Templates reference their arguments with `{0}`, `{1}`, ...; the number of distinct
/// placeholders must equal the number of arguments, which is checked at composition.
#[derive(Debug, Clone)]
pub struct Column {
    repr: Repr,
}

impl Column {
    fn from_table(column: TableColumn) -> Self {
        Self {
            repr: Repr::Table(column),
        }
    }

    /// A templated expression.
    pub fn template(template: &str, args: Vec<Operand>) -> Self {
        Self {
            repr: Repr::Template {
                template: template.into(),
                args,
                aggregate: false,
            },
        }
    }

    /// A templated aggregate expression, such as `percentile_cont(0.5) WITHIN GROUP (ORDER BY {0})`.
    pub fn aggregate_template(template: &str, args: Vec<Operand>) -> Self {
        Self {
            repr: Repr::Template {
                template: template.into(),
                args,
                aggregate: true,
            },
        }
    }

    fn wrap(self, template: &'static str, aggregate: bool) -> Self {
        Self {
            repr: Repr::Template {
                template: template.into(),
                args: vec![Operand::Column(self)],
                aggregate,
            },
        }
    }

    pub fn count(self) -> Self {
        self.wrap("COUNT({0})", true)
    }

    pub fn count_distinct(self) -> Self {
        self.wrap("COUNT(DISTINCT {0})", true)
    }

    pub fn sum(self) -> Self {
        self.wrap("SUM({0})", true)
    }

    pub fn avg(self) -> Self {
        self.wrap("AVG({0})", true)
    }

    pub fn min(self) -> Self {
        self.wrap("MIN({0})", true)
    }

    pub fn max(self) -> Self {
        self.wrap("MAX({0})", true)
    }

    pub fn lower(self) -> Self {
        self.wrap("LOWER({0})", false)
    }

    pub fn upper(self) -> Self {
        self.wrap("UPPER({0})", false)
    }

    /// `COALESCE(self, fallback)`.
    pub fn coalesce(self, fallback: impl Into<Operand>) -> Self {
        coalesce(vec![Operand::Column(self), fallback.into()])
    }

    /// The underlying table column, if this is a bare column.
    pub fn table_column(&self) -> Option<&TableColumn> {
        match &self.repr {
            Repr::Table(c) => Some(c),
            Repr::Template { .. } => None,
        }
    }

    /// Table columns referenced by this expression, subqueries excluded.
    pub(crate) fn table_columns(&self) -> Vec<&TableColumn> {
        match &self.repr {
            Repr::Table(c) => vec![c],
            Repr::Template { args, .. } => args
                .iter()
                .filter_map(|arg| match arg {
                    Operand::Column(col) => Some(col.table_columns()),
                    _ => None,
                })
                .flatten()
                .collect(),
        }
    }

    pub fn is_bare(&self) -> bool {
        matches!(self.repr, Repr::Table(_))
    }

    /// Whether this expression aggregates rows, directly or through an argument.
    pub fn is_aggregate(&self) -> bool {
        match &self.repr {
            Repr::Table(_) => false,
            Repr::Template {
                args, aggregate, ..
            } => *aggregate || args.iter().any(Operand::is_aggregate),
        }
    }

    pub(crate) fn render(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        match &self.repr {
            Repr::Table(col) => c.column(col),
            Repr::Template { template, args, .. } => render_template(template, args, c),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Table(col) => write!(f, "{}.{}", col.table.name(), col.name),
            Repr::Template { template, .. } => f.write_str(template),
        }
    }
}

/// `COUNT(*)`.
pub fn count_all() -> Column {
    Column::aggregate_template("COUNT(*)", Vec::new())
}

/// `COALESCE(a, b, ...)`.
pub fn coalesce(args: Vec<Operand>) -> Column {
    let placeholders: Vec<String> = (0..args.len()).map(|i| format!("{{{i}}}")).collect();
    let template = format!("COALESCE({})", placeholders.join(", "));
    Column::template(&template, args)
}

enum Piece<'a> {
    Text(&'a str),
    Arg(usize),
}

fn parse_template(template: &str) -> Vec<Piece<'_>> {
    let bytes = template.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 && j < bytes.len() && bytes[j] == b'}' {
                if let Ok(n) = template[i + 1..j].parse::<usize>() {
                    if start < i {
                        pieces.push(Piece::Text(&template[start..i]));
                    }
                    pieces.push(Piece::Arg(n));
                    i = j + 1;
                    start = i;
                    continue;
                }
            }
        }
        i += 1;
    }
    if start < template.len() {
        pieces.push(Piece::Text(&template[start..]));
    }
    pieces
}

/// Check that the placeholders of `template` are exactly `{0}..{n-1}` for `n` arguments.
pub(crate) fn check_arity(template: &str, args: usize) -> OrmResult<()> {
    let distinct: BTreeSet<usize> = parse_template(template)
        .into_iter()
        .filter_map(|p| match p {
            Piece::Arg(n) => Some(n),
            Piece::Text(_) => None,
        })
        .collect();
    let in_range = distinct.iter().all(|&n| n < args);
    if distinct.len() != args || !in_range {
        return Err(OrmError::illegal_state(format!(
            "template '{template}' has {} distinct placeholders but {args} arguments",
            distinct.len()
        )));
    }
    Ok(())
}

pub(crate) fn render_template(
    template: &str,
    args: &[Operand],
    c: &mut Composer<'_>,
) -> OrmResult<()> {
    check_arity(template, args.len())?;
    for piece in parse_template(template) {
        match piece {
            Piece::Text(text) => {
                c.push(text);
            }
            Piece::Arg(n) => args[n].render(c)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn people() -> TableRef {
        let table = TableDef::builder("person")
            .column("id", ValueKind::Int8)
            .column("age", ValueKind::Int4)
            .primary_key(&["id"])
            .build()
            .unwrap();
        TableRef::new(table, StatementId::next())
    }

    #[test]
    fn statement_ids_are_unique() {
        assert_ne!(StatementId::next(), StatementId::next());
    }

    #[test]
    fn template_arity_counts_distinct_placeholders() {
        assert!(check_arity("{0} + {1}", 2).is_ok());
        assert!(check_arity("{0} * {0}", 1).is_ok());
        assert!(check_arity("{0} + {1}", 1).is_err());
        assert!(check_arity("{0} + {2}", 2).is_err());
        assert!(check_arity("now()", 0).is_ok());
        assert!(check_arity("'{x}' || {0}", 1).is_ok());
    }

    #[test]
    fn aggregate_flag_propagates_through_templates() {
        let p = people();
        assert!(!p.col("age").is_aggregate());
        assert!(p.col("age").max().is_aggregate());
        assert!(p.col("age").max().coalesce(Value::Int4(0)).is_aggregate());
        assert!(!p.col("age").coalesce(Value::Int4(0)).is_aggregate());
        assert!(count_all().is_aggregate());
    }

    #[test]
    fn table_ref_lists_columns_and_primary_key() {
        let p = people();
        assert_eq!(p.columns().len(), 2);
        let pk = p.primary_key();
        assert_eq!(pk.len(), 1);
        assert_eq!(pk[0].table_column().unwrap().name(), "id");
        assert!(p.col("missing").table_column().unwrap().index().is_none());
    }
}
