//! Comparison builders for WHERE, HAVING and ON clauses.
//!
//! One generic [`ConditionBuilder`] serves every clause; the [`ClauseKind`] parameter decides
//! what the clause accepts. Each comparison adds one condition to the clause's accumulator and
//! returns a [`Logical`] handle for chaining:
//!
//! ```ignore
//! select.where_(|w| {
//!     w.col(p.col("age")).ge(18)?
//!         .and()
//!         .paren(|g| g.col(p.col("name")).like("a", MatchType::Prefix)?.or().col(p.col("vip")).eq(true))
//! })?;
//! ```

use crate::column::{Column, Operand};
use crate::criteria::{Condition, Criteria, Junction, Predicate};
use crate::error::{OrmError, OrmResult};
use crate::qb::Select;
use crate::value::Value;
use std::marker::PhantomData;

/// The clause a builder adds conditions to.
pub trait ClauseKind {
    /// Clause keyword, used in error messages.
    const NAME: &'static str;
    /// Whether aggregate expressions may appear in the clause.
    const ALLOWS_AGGREGATES: bool;
}

/// WHERE clause of SELECT, UPDATE and DELETE.
#[derive(Debug)]
pub enum WhereClause {}

/// HAVING clause.
#[derive(Debug)]
pub enum HavingClause {}

/// ON clause of a join.
#[derive(Debug)]
pub enum OnClause {}

impl ClauseKind for WhereClause {
    const NAME: &'static str = "WHERE";
    const ALLOWS_AGGREGATES: bool = false;
}

impl ClauseKind for HavingClause {
    const NAME: &'static str = "HAVING";
    const ALLOWS_AGGREGATES: bool = true;
}

impl ClauseKind for OnClause {
    const NAME: &'static str = "ON";
    const ALLOWS_AGGREGATES: bool = false;
}

pub type Where<'a> = ConditionBuilder<'a, WhereClause>;
pub type Having<'a> = ConditionBuilder<'a, HavingClause>;
pub type On<'a> = ConditionBuilder<'a, OnClause>;

/// How a LIKE pattern is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Use the pattern as given, wildcards included.
    Exact,
    /// `pattern%`
    Prefix,
    /// `%pattern`
    Suffix,
    /// `%pattern%`
    Contains,
}

impl MatchType {
    /// Build the LIKE pattern. Anchored types escape `%`, `_` and `\` in `text`.
    pub fn pattern(self, text: &str) -> String {
        if self == MatchType::Exact {
            return text.to_string();
        }
        let mut escaped = String::with_capacity(text.len() + 2);
        if matches!(self, MatchType::Suffix | MatchType::Contains) {
            escaped.push('%');
        }
        for ch in text.chars() {
            if matches!(ch, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(ch);
        }
        if matches!(self, MatchType::Prefix | MatchType::Contains) {
            escaped.push('%');
        }
        escaped
    }
}

/// Comparison operator for `ANY` / `ALL` subquery tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Adds one condition to a clause, joined to what is already there by AND or OR.
#[must_use]
pub struct ConditionBuilder<'a, K: ClauseKind> {
    criteria: &'a mut Criteria,
    junction: Junction,
    _kind: PhantomData<K>,
}

impl<'a, K: ClauseKind> ConditionBuilder<'a, K> {
    pub(crate) fn new(criteria: &'a mut Criteria) -> Self {
        Self {
            criteria,
            junction: Junction::And,
            _kind: PhantomData,
        }
    }

    /// Start a comparison on `column`.
    pub fn col(self, column: Column) -> Comparison<'a, K> {
        Comparison {
            builder: self,
            column,
        }
    }

    /// Build a parenthesized group in a fresh accumulator.
    ///
    /// The group joins this clause as one unit, and only if `f` succeeds.
    pub fn paren<F>(self, f: F) -> OrmResult<Logical<'a, K>>
    where
        F: for<'p> FnOnce(ConditionBuilder<'p, K>) -> OrmResult<Logical<'p, K>>,
    {
        if self.criteria.is_null() {
            return Err(refused::<K>());
        }
        let mut inner = Criteria::new();
        let _ = f(ConditionBuilder::new(&mut inner))?;
        if let Some(cond) = inner.take() {
            self.criteria
                .add(self.junction, Condition::Group(Box::new(cond)))?;
        }
        Ok(Logical {
            criteria: self.criteria,
            _kind: PhantomData,
        })
    }

    /// `EXISTS (subquery)`.
    pub fn exists(self, subquery: Select) -> OrmResult<Logical<'a, K>> {
        self.push(Predicate::Exists {
            subquery: Box::new(subquery),
            negated: false,
        })
    }

    /// `NOT EXISTS (subquery)`.
    pub fn not_exists(self, subquery: Select) -> OrmResult<Logical<'a, K>> {
        self.push(Predicate::Exists {
            subquery: Box::new(subquery),
            negated: true,
        })
    }

    /// A raw condition template such as `{0} @> {1}`.
    pub fn add(self, template: &str, args: Vec<Operand>) -> OrmResult<Logical<'a, K>> {
        for arg in &args {
            if let Operand::Column(column) = arg {
                check_aggregate::<K>(column)?;
            }
        }
        self.push(Predicate::Template {
            template: template.into(),
            args,
        })
    }

    fn push(self, predicate: Predicate) -> OrmResult<Logical<'a, K>> {
        self.criteria
            .add(self.junction, Condition::Predicate(predicate))?;
        Ok(Logical {
            criteria: self.criteria,
            _kind: PhantomData,
        })
    }
}

fn refused<K: ClauseKind>() -> OrmError {
    OrmError::illegal_state(format!(
        "this {} clause does not accept conditions",
        K::NAME
    ))
}

fn check_aggregate<K: ClauseKind>(column: &Column) -> OrmResult<()> {
    if !K::ALLOWS_AGGREGATES && column.is_aggregate() {
        return Err(OrmError::illegal_state(format!(
            "aggregate expression {column} is not allowed in {}",
            K::NAME
        )));
    }
    Ok(())
}

/// Handle returned by every comparison, for chaining the next condition.
#[must_use]
pub struct Logical<'a, K: ClauseKind> {
    criteria: &'a mut Criteria,
    _kind: PhantomData<K>,
}

impl<'a, K: ClauseKind> Logical<'a, K> {
    /// The next condition is ANDed to everything accumulated so far.
    pub fn and(self) -> ConditionBuilder<'a, K> {
        ConditionBuilder {
            criteria: self.criteria,
            junction: Junction::And,
            _kind: PhantomData,
        }
    }

    /// The next condition is ORed to everything accumulated so far.
    pub fn or(self) -> ConditionBuilder<'a, K> {
        ConditionBuilder {
            criteria: self.criteria,
            junction: Junction::Or,
            _kind: PhantomData,
        }
    }
}

/// A comparison waiting for its operator and right-hand side.
#[must_use]
pub struct Comparison<'a, K: ClauseKind> {
    builder: ConditionBuilder<'a, K>,
    column: Column,
}

macro_rules! comparisons {
    ($ret:ty; $($op:literal => $value:ident, $col:ident, $sub:ident;)*) => {
        $(
            #[doc = concat!("`column ", $op, " value`")]
            pub fn $value(self, value: impl Into<Value>) -> $ret {
                self.compare($op, Operand::Value(value.into()))
            }

            #[doc = concat!("`column ", $op, " other`")]
            pub fn $col(self, other: Column) -> $ret {
                self.compare($op, Operand::Column(other))
            }

            #[doc = concat!("`column ", $op, " (subquery)`")]
            pub fn $sub(self, subquery: Select) -> $ret {
                self.compare($op, Operand::Subquery(Box::new(subquery)))
            }
        )*
    };
}

impl<'a, K: ClauseKind> Comparison<'a, K> {
    fn finish(self, build: impl FnOnce(Column) -> Predicate) -> OrmResult<Logical<'a, K>> {
        check_aggregate::<K>(&self.column)?;
        self.builder.push(build(self.column))
    }

    fn compare(self, op: &'static str, right: Operand) -> OrmResult<Logical<'a, K>> {
        if let Operand::Column(other) = &right {
            check_aggregate::<K>(other)?;
        }
        self.finish(|left| Predicate::Compare { left, op, right })
    }

    comparisons! {
        OrmResult<Logical<'a, K>>;
        "=" => eq, eq_col, eq_subquery;
        "<>" => ne, ne_col, ne_subquery;
        "<" => lt, lt_col, lt_subquery;
        "<=" => le, le_col, le_subquery;
        ">" => gt, gt_col, gt_subquery;
        ">=" => ge, ge_col, ge_subquery;
    }

    fn like_pattern(
        self,
        text: &str,
        match_type: MatchType,
        negated: bool,
        case_insensitive: bool,
    ) -> OrmResult<Logical<'a, K>> {
        let pattern = Value::Text(match_type.pattern(text));
        self.finish(|column| Predicate::Like {
            column,
            pattern,
            negated,
            case_insensitive,
        })
    }

    /// `column LIKE pattern`
    pub fn like(self, text: &str, match_type: MatchType) -> OrmResult<Logical<'a, K>> {
        self.like_pattern(text, match_type, false, false)
    }

    /// `column NOT LIKE pattern`
    pub fn not_like(self, text: &str, match_type: MatchType) -> OrmResult<Logical<'a, K>> {
        self.like_pattern(text, match_type, true, false)
    }

    /// `column ILIKE pattern` (case-insensitive)
    pub fn ilike(self, text: &str, match_type: MatchType) -> OrmResult<Logical<'a, K>> {
        self.like_pattern(text, match_type, false, true)
    }

    /// `column NOT ILIKE pattern`
    pub fn not_ilike(self, text: &str, match_type: MatchType) -> OrmResult<Logical<'a, K>> {
        self.like_pattern(text, match_type, true, true)
    }

    /// `column IN (...)`. An empty list matches nothing.
    pub fn in_list<V: Into<Value>>(
        self,
        values: impl IntoIterator<Item = V>,
    ) -> OrmResult<Logical<'a, K>> {
        let values = values.into_iter().map(Into::into).collect();
        self.finish(|column| Predicate::InList {
            column,
            values,
            negated: false,
        })
    }

    /// `column NOT IN (...)`. An empty list matches everything.
    pub fn not_in<V: Into<Value>>(
        self,
        values: impl IntoIterator<Item = V>,
    ) -> OrmResult<Logical<'a, K>> {
        let values = values.into_iter().map(Into::into).collect();
        self.finish(|column| Predicate::InList {
            column,
            values,
            negated: true,
        })
    }

    /// `column IN (subquery)`
    pub fn in_subquery(self, subquery: Select) -> OrmResult<Logical<'a, K>> {
        self.finish(|column| Predicate::InSubquery {
            column,
            subquery: Box::new(subquery),
            negated: false,
        })
    }

    /// `column NOT IN (subquery)`
    pub fn not_in_subquery(self, subquery: Select) -> OrmResult<Logical<'a, K>> {
        self.finish(|column| Predicate::InSubquery {
            column,
            subquery: Box::new(subquery),
            negated: true,
        })
    }

    /// `column BETWEEN low AND high`
    pub fn between(
        self,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> OrmResult<Logical<'a, K>> {
        self.between_operands(Operand::Value(low.into()), Operand::Value(high.into()))
    }

    /// `column NOT BETWEEN low AND high`
    pub fn not_between(
        self,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> OrmResult<Logical<'a, K>> {
        let (low, high) = (Operand::Value(low.into()), Operand::Value(high.into()));
        self.finish(|column| Predicate::Between {
            column,
            low,
            high,
            negated: true,
        })
    }

    /// `column BETWEEN low AND high` with column or subquery bounds.
    pub fn between_operands(self, low: Operand, high: Operand) -> OrmResult<Logical<'a, K>> {
        self.finish(|column| Predicate::Between {
            column,
            low,
            high,
            negated: false,
        })
    }

    /// `column IS NULL`
    pub fn is_null(self) -> OrmResult<Logical<'a, K>> {
        self.finish(|column| Predicate::IsNull {
            column,
            negated: false,
        })
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(self) -> OrmResult<Logical<'a, K>> {
        self.finish(|column| Predicate::IsNull {
            column,
            negated: true,
        })
    }

    /// `column op ANY (subquery)`
    pub fn any(self, op: CompareOp, subquery: Select) -> OrmResult<Logical<'a, K>> {
        self.finish(|column| Predicate::Quantified {
            column,
            op: op.as_sql(),
            quantifier: "ANY",
            subquery: Box::new(subquery),
        })
    }

    /// `column op ALL (subquery)`
    pub fn all(self, op: CompareOp, subquery: Select) -> OrmResult<Logical<'a, K>> {
        self.finish(|column| Predicate::Quantified {
            column,
            op: op.as_sql(),
            quantifier: "ALL",
            subquery: Box::new(subquery),
        })
    }
}

/// Run a clause callback against a fresh accumulator.
pub(crate) fn collect<K, F>(f: F) -> OrmResult<Criteria>
where
    K: ClauseKind,
    F: for<'w> FnOnce(ConditionBuilder<'w, K>) -> OrmResult<Logical<'w, K>>,
{
    let mut criteria = Criteria::new();
    let _ = f(ConditionBuilder::new(&mut criteria))?;
    Ok(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_type_patterns() {
        assert_eq!(MatchType::Exact.pattern("a%b"), "a%b");
        assert_eq!(MatchType::Prefix.pattern("ab"), "ab%");
        assert_eq!(MatchType::Suffix.pattern("ab"), "%ab");
        assert_eq!(MatchType::Contains.pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn compare_op_sql() {
        assert_eq!(CompareOp::Ne.as_sql(), "<>");
        assert_eq!(CompareOp::Ge.as_sql(), ">=");
    }
}
